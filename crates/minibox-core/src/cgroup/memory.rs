//! Memory ceiling through the v1 `memory` controller.

use std::path::Path;

use minibox_common::error::{MiniboxError, Result};

/// Sets the hard memory limit of a cgroup.
///
/// Accepts plain byte counts and `k`/`m`/`g` suffixes (case-insensitive,
/// with an optional trailing `b` or `ib`).
///
/// # Errors
///
/// Returns an error if the limit cannot be parsed or `memory.limit_in_bytes`
/// cannot be written.
pub fn set_limit(cgroup_path: &Path, limit: &str) -> Result<()> {
    let bytes = parse_memory(limit).ok_or_else(|| MiniboxError::Config {
        message: format!("invalid memory limit: {limit}"),
    })?;
    super::write_control(cgroup_path, "memory.limit_in_bytes", &bytes.to_string())?;
    tracing::debug!(limit, bytes, "memory limit set");
    Ok(())
}

/// Parses a human memory size into bytes.
pub fn parse_memory(s: &str) -> Option<u64> {
    let lowered = s.trim().to_ascii_lowercase();
    let unit_stripped = lowered
        .strip_suffix("ib")
        .or_else(|| lowered.strip_suffix('b'))
        .unwrap_or(&lowered);
    let (digits, multiplier) = match unit_stripped.chars().last() {
        Some('k') => (&unit_stripped[..unit_stripped.len() - 1], 1024),
        Some('m') => (&unit_stripped[..unit_stripped.len() - 1], 1024 * 1024),
        Some('g') => (&unit_stripped[..unit_stripped.len() - 1], 1024 * 1024 * 1024),
        _ => (unit_stripped, 1),
    };
    digits.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_memory_suffixes() {
        assert_eq!(parse_memory("100m"), Some(100 * 1024 * 1024));
        assert_eq!(parse_memory("50M"), Some(50 * 1024 * 1024));
        assert_eq!(parse_memory("128MiB"), Some(128 * 1024 * 1024));
        assert_eq!(parse_memory("1g"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_memory("512kb"), Some(512 * 1024));
    }

    #[test]
    fn parse_memory_plain_bytes() {
        assert_eq!(parse_memory("1048576"), Some(1_048_576));
    }

    #[test]
    fn parse_memory_invalid() {
        assert_eq!(parse_memory("abc"), None);
        assert_eq!(parse_memory("m"), None);
        assert_eq!(parse_memory(""), None);
    }

    #[test]
    fn set_limit_writes_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        set_limit(dir.path(), "50m").expect("set");
        let written =
            std::fs::read_to_string(dir.path().join("memory.limit_in_bytes")).expect("read");
        assert_eq!(written, "52428800");
    }

    #[test]
    fn set_limit_rejects_garbage() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(set_limit(dir.path(), "lots").is_err());
        assert!(!dir.path().join("memory.limit_in_bytes").exists());
    }
}
