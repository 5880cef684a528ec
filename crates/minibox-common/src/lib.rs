//! # minibox-common
//!
//! Shared types, error definitions, configuration and path constants used
//! across the minibox workspace.
//!
//! This crate sits at the bottom of the dependency graph and depends on no
//! other internal crate.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
