//! `minibox init`: bootstrap run as PID 1 of a new container.

use std::process::ExitCode;

use minibox_runtime::init;

/// Executes the `init` verb. Returns only if the user command could not be
/// started.
///
/// # Errors
///
/// Returns an error if any bootstrap step fails.
pub fn execute() -> anyhow::Result<ExitCode> {
    match init::run() {
        Ok(never) => match never {},
        Err(e) => Err(anyhow::anyhow!("container init failed: {e}")),
    }
}
