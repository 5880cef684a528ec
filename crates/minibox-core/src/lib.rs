//! # minibox-core
//!
//! Low-level Linux isolation primitives for the minibox runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: clone flags for new containers, `setns(2)` to join
//!   running ones, and a scoped network-namespace guard.
//! - **Cgroups v1**: cpuset, memory and CPU quota backends behind one manager.
//! - **Filesystem**: `OverlayFS`, bind and pseudo-filesystem mounts, and
//!   `pivot_root`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod filesystem;
pub mod namespace;
