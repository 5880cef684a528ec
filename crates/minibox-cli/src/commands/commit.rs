//! `minibox commit`: save a container's root filesystem as an image.

use anyhow::Context;
use clap::Args;
use minibox_runtime::engine::Engine;

/// Arguments for the `commit` command.
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Container ID.
    pub container: String,

    /// Name of the new image.
    pub image: String,
}

/// Executes the `commit` command.
///
/// # Errors
///
/// Returns an error if the container root is missing or the image already
/// exists.
pub fn execute(engine: &Engine, args: &CommitArgs) -> anyhow::Result<()> {
    let archive = engine
        .commit(&args.container, &args.image)
        .with_context(|| format!("committing {} as {}", args.container, args.image))?;
    println!("{}", archive.display());
    Ok(())
}
