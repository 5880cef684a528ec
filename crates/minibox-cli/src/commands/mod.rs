//! CLI command definitions and dispatch.

pub mod commit;
pub mod exec;
pub mod init;
pub mod logs;
pub mod network;
pub mod ps;
pub mod rm;
pub mod run;
pub mod stop;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use minibox_common::config::RuntimeConfig;
use minibox_common::constants::{DEFAULT_ROOT, ROOT_ENV};
use minibox_runtime::engine::Engine;

/// minibox: a minimal container runtime.
#[derive(Parser, Debug)]
#[command(name = "minibox", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding all runtime state.
    #[arg(long, global = true, env = ROOT_ENV, default_value = DEFAULT_ROOT)]
    pub root: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Container bootstrap; started by `run`, never by hand.
    #[command(hide = true)]
    Init,
    /// Create and start a container.
    Run(run::RunArgs),
    /// List containers.
    Ps,
    /// Print the log of a detached container.
    Logs(logs::LogsArgs),
    /// Run a command inside a running container.
    Exec(exec::ExecArgs),
    /// Stop a running container.
    Stop(stop::StopArgs),
    /// Remove a container.
    Rm(rm::RmArgs),
    /// Save a container's root filesystem as an image.
    Commit(commit::CommitArgs),
    /// Manage container networks.
    #[command(subcommand)]
    Network(network::NetworkCommand),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the command
/// fails.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    if matches!(cli.command, Command::Init) {
        return init::execute();
    }

    let config = RuntimeConfig::load(&cli.root)
        .with_context(|| format!("loading configuration from {}", cli.root.display()))?;
    tracing::debug!(root = %config.root().display(), cgroup = %config.cgroup_name, "runtime configured");
    let engine = Engine::new(config);

    match cli.command {
        Command::Init => init::execute(),
        Command::Run(args) => run::execute(&engine, args),
        Command::Ps => ps::execute(&engine).map(|()| ExitCode::SUCCESS),
        Command::Logs(args) => logs::execute(&engine, &args).map(|()| ExitCode::SUCCESS),
        Command::Exec(args) => exec::execute(&engine, &args),
        Command::Stop(args) => stop::execute(&engine, &args).map(|()| ExitCode::SUCCESS),
        Command::Rm(args) => rm::execute(&engine, &args).map(|()| ExitCode::SUCCESS),
        Command::Commit(args) => commit::execute(&engine, &args).map(|()| ExitCode::SUCCESS),
        Command::Network(command) => {
            network::execute(&engine, command).map(|()| ExitCode::SUCCESS)
        }
    }
}
