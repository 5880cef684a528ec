//! `minibox rm`: remove a container.

use clap::Args;
use minibox_runtime::engine::Engine;

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Stop the container first if it is running.
    #[arg(short, long)]
    pub force: bool,

    /// Container ID.
    pub container: String,
}

/// Executes the `rm` command.
///
/// # Errors
///
/// Returns an error if the container is unknown, or running without
/// `--force`.
pub fn execute(engine: &Engine, args: &RmArgs) -> anyhow::Result<()> {
    engine.remove(&args.container, args.force)?;
    println!("{}", args.container);
    Ok(())
}
