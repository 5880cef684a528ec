//! `minibox logs`: print a detached container's output.

use clap::Args;
use minibox_runtime::engine::Engine;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Container ID.
    pub container: String,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if the container is unknown or has no log.
pub fn execute(engine: &Engine, args: &LogsArgs) -> anyhow::Result<()> {
    let logs = engine.logs(&args.container)?;
    print!("{logs}");
    Ok(())
}
