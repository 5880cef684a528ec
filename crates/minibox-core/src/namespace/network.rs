//! Temporary entry into a container's network namespace.
//!
//! Namespace membership is a per-thread attribute. Work that must run inside
//! a container's network stack is executed on a dedicated OS thread holding a
//! [`NetnsGuard`], which switches back to the original namespace on drop.

use std::fs::File;

use minibox_common::error::{MiniboxError, Result};

use super::{NamespaceKind, join_namespace, open_namespace};

/// Network namespace of the calling thread.
const THREAD_SELF_NET: &str = "/proc/thread-self/ns/net";

/// Keeps the calling thread inside another network namespace until dropped.
#[derive(Debug)]
pub struct NetnsGuard {
    original: File,
    target_pid: i32,
}

impl NetnsGuard {
    /// Switches the calling thread into the network namespace of `target_pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if either namespace file cannot be opened or `setns(2)` fails.
    pub fn enter(target_pid: i32) -> Result<Self> {
        let original = File::open(THREAD_SELF_NET).map_err(|e| MiniboxError::io(THREAD_SELF_NET, e))?;
        let target = open_namespace(target_pid, NamespaceKind::Net)?;
        join_namespace(&target, NamespaceKind::Net)?;
        tracing::debug!(pid = target_pid, "entered container network namespace");
        Ok(Self {
            original,
            target_pid,
        })
    }
}

impl Drop for NetnsGuard {
    fn drop(&mut self) {
        match join_namespace(&self.original, NamespaceKind::Net) {
            Ok(()) => tracing::debug!(pid = self.target_pid, "restored network namespace"),
            Err(e) => tracing::error!(error = %e, "failed to restore network namespace"),
        }
    }
}

/// Runs `work` inside the network namespace of `target_pid`.
///
/// The work runs on a scoped OS thread that holds a [`NetnsGuard`] for its
/// whole duration, so no other code ever executes on a thread that is inside
/// the container's namespace.
///
/// # Errors
///
/// Returns the error of entering the namespace or of `work` itself.
pub fn run_in_netns<T, F>(target_pid: i32, work: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    std::thread::scope(|scope| {
        scope
            .spawn(|| {
                let _guard = NetnsGuard::enter(target_pid)?;
                work()
            })
            .join()
            .map_err(|_| MiniboxError::Config {
                message: format!("network namespace worker for pid {target_pid} panicked"),
            })?
    })
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn missing_process_is_an_error() {
        let result = run_in_netns(i32::MAX, || Ok(()));
        assert!(result.is_err());
    }
}
