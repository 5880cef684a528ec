//! Container lifecycle management for the minibox runtime.
//!
//! The [`engine::Engine`] creates containers from images, runs their init
//! process in fresh namespaces, records them on disk and tears them down.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod engine;
pub mod exec;
pub mod init;
pub mod logs;
pub mod process;
pub mod state;
