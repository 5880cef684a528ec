//! Unified error type for the minibox workspace.
//!
//! Library crates return [`MiniboxError`]; the CLI wraps it in `anyhow` at the
//! command boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum MiniboxError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value or argument is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A privileged system call was refused or failed.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// An external program (`ip`, `iptables`) failed.
    #[error("{program} failed: {message}")]
    Command {
        /// Program that was invoked.
        program: String,
        /// Arguments and stderr of the failed invocation.
        message: String,
    },

    /// A volume specification is not of the form `host:container`.
    #[error("invalid volume spec {spec:?}: expected host:container")]
    InvalidVolume {
        /// The rejected specification.
        spec: String,
    },

    /// Every address of a subnet is already allocated.
    #[error("address space exhausted for subnet {subnet}")]
    AddressExhausted {
        /// The full subnet.
        subnet: String,
    },

    /// An operation is not allowed in the container's current status.
    #[error("container {id}: {message}")]
    InvalidState {
        /// Container identifier.
        id: String,
        /// Why the operation was refused.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl MiniboxError {
    /// Builds an [`MiniboxError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, MiniboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_path() {
        let err = MiniboxError::io(
            "/var/lib/minibox/x",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(err.to_string().contains("/var/lib/minibox/x"));
    }

    #[test]
    fn exhausted_error_names_the_subnet() {
        let err = MiniboxError::AddressExhausted {
            subnet: "10.0.0.0/30".into(),
        };
        assert_eq!(
            err.to_string(),
            "address space exhausted for subnet 10.0.0.0/30"
        );
    }

    #[test]
    fn serde_errors_convert() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("nope");
        let err: MiniboxError = parse.unwrap_err().into();
        assert!(matches!(err, MiniboxError::Serialization { .. }));
    }
}
