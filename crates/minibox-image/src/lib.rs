//! # minibox-image
//!
//! Image archives and per-container layered storage for the minibox runtime.
//!
//! Handles:
//! - **Layers**: extracting `<image>.tar` archives and packing a container
//!   root back into one.
//! - **Storage**: the shared read-only lower layer per image and the
//!   per-container upper/work/merged overlay workspace.
//! - **Volumes**: `host:container` bind mount specifications.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod layer;
pub mod storage;
pub mod volume;
