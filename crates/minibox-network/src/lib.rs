//! # minibox-network
//!
//! Bridge networking for minibox containers.
//!
//! - **IPAM**: a persisted first-fit bitmap per subnet.
//! - **Model**: networks stored one JSON file each, and transient endpoints.
//! - **Bridge driver**: Linux bridge devices, veth pairs and masquerading,
//!   driven through `ip` and `iptables`.
//! - **Registry**: the set of drivers plus the stores they share, built once
//!   per invocation.
//! - **Attach**: wiring a running container into a network, including the
//!   in-namespace address setup and port forwarding.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod attach;
pub mod bridge;
pub mod command;
pub mod driver;
pub mod ipam;
pub mod model;
