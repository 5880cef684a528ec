//! `minibox stop`: stop a running container.

use clap::Args;
use minibox_runtime::engine::Engine;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container ID.
    pub container: String,
}

/// Executes the `stop` command.
///
/// # Errors
///
/// Returns an error if the container is unknown, not running, or cannot be
/// signalled.
pub fn execute(engine: &Engine, args: &StopArgs) -> anyhow::Result<()> {
    engine.stop(&args.container)?;
    println!("{}", args.container);
    Ok(())
}
