//! `host:container` volume specifications.

use std::path::{Path, PathBuf};

use minibox_common::error::{MiniboxError, Result};

/// A host directory bind-mounted into the container root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    /// Directory on the host; created if absent.
    pub host: PathBuf,
    /// Mount point inside the container.
    pub container: PathBuf,
}

impl VolumeSpec {
    /// Parses a `host:container` specification.
    ///
    /// # Errors
    ///
    /// Returns `MiniboxError::InvalidVolume` unless the spec has exactly two
    /// non-empty sides.
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = || MiniboxError::InvalidVolume {
            spec: spec.to_string(),
        };
        let mut parts = spec.split(':');
        let (Some(host), Some(container), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if host.is_empty() || container.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: PathBuf::from(host),
            container: PathBuf::from(container),
        })
    }

    /// Parses an optional specification; an empty string means no volume.
    ///
    /// # Errors
    ///
    /// Returns `MiniboxError::InvalidVolume` if a non-empty spec is malformed.
    pub fn parse_optional(spec: &str) -> Result<Option<Self>> {
        if spec.is_empty() {
            Ok(None)
        } else {
            Self::parse(spec).map(Some)
        }
    }

    /// Where the container side lands under the merged root on the host.
    #[must_use]
    pub fn target_in(&self, merged: &Path) -> PathBuf {
        let relative = self
            .container
            .strip_prefix("/")
            .unwrap_or(&self.container);
        merged.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_container() {
        let spec = VolumeSpec::parse("/data:/var/data").unwrap();
        assert_eq!(spec.host, PathBuf::from("/data"));
        assert_eq!(spec.container, PathBuf::from("/var/data"));
    }

    #[test]
    fn rejects_wrong_segment_count() {
        for spec in ["/data", "/a:/b:/c", "::"] {
            assert!(
                matches!(VolumeSpec::parse(spec), Err(MiniboxError::InvalidVolume { .. })),
                "{spec} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_empty_side() {
        assert!(VolumeSpec::parse(":/b").is_err());
        assert!(VolumeSpec::parse("/a:").is_err());
    }

    #[test]
    fn empty_spec_is_no_volume() {
        assert_eq!(VolumeSpec::parse_optional("").unwrap(), None);
        assert!(VolumeSpec::parse_optional("nope").is_err());
    }

    #[test]
    fn target_stays_under_merged() {
        let spec = VolumeSpec::parse("/host:/in/box").unwrap();
        assert_eq!(
            spec.target_in(Path::new("/o/1/merged")),
            PathBuf::from("/o/1/merged/in/box")
        );
    }
}
