//! `minibox exec`: run a command inside a running container.

use std::process::ExitCode;

use clap::Args;
use minibox_runtime::engine::Engine;

use crate::output;

/// Arguments for the `exec` command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Container ID.
    pub container: String,

    /// Command to execute.
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `exec` command.
///
/// Joins the target container's namespaces and runs the command with the
/// caller's stdio; exits with the command's status.
///
/// # Errors
///
/// Returns an error if the container is not running or the helper fails.
pub fn execute(engine: &Engine, args: &ExecArgs) -> anyhow::Result<ExitCode> {
    let code = engine.exec(&args.container, &args.command)?;
    Ok(output::exit_code(code))
}
