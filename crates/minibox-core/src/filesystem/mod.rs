//! Filesystem management for container isolation.
//!
//! `OverlayFS` assembly for the container root, bind and pseudo-filesystem
//! mounts, and the `pivot_root` sequence run by the container bootstrap.

pub mod mount;
pub mod mountinfo;
pub mod overlayfs;
pub mod pivot_root;
