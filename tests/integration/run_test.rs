//! Integration tests for container runtime operations.
//!
//! These tests are implemented in:
//! `crates/minibox-runtime/tests/e2e_test.rs`
//!
//! Covered scenarios:
//! - `pipeline_record_lifecycle_under_one_root`: Save, load and delete a container record
//! - `pipeline_detached_log_lives_with_its_record`: Log file is read back and removed with the container
//! - `pipeline_list_orders_by_creation`: Records are listed oldest first
//! - `pipeline_committed_root_becomes_a_new_image`: A committed root unpacks as a fresh lower layer
//! - `pipeline_network_definition_and_addresses`: Network persistence, endpoint naming and address reuse
//! - `pipeline_removing_a_container_without_network_skips_release`: No address table is touched
//! - `pipeline_unknown_network_driver_is_rejected`: Only the bridge driver exists
//! - `pipeline_runtime_root_comes_from_config_file`: `config.json` overrides the cgroup name
//!
//! Running containers needs root, a kernel with overlayfs and cgroup
//! support, and an image archive under `<root>/image/`:
//!
//! ```text
//! sudo minibox network create --driver bridge --subnet 192.168.10.0/24 testbr
//! sudo minibox run -d --name web -p 8080:80 --net testbr busybox top
//! sudo minibox exec <id> ps
//! sudo minibox stop <id> && sudo minibox rm <id>
//! ```
