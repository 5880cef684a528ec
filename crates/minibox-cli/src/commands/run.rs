//! `minibox run`: create and start a container.

use std::process::ExitCode;

use clap::Args;
use minibox_common::types::ResourceConfig;
use minibox_runtime::engine::{Engine, RunOptions, RunOutcome};

use crate::output;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Keep stdin attached.
    #[arg(short = 'i', long, conflicts_with = "detach")]
    pub interactive: bool,

    /// Allocate a terminal for the container.
    #[arg(short = 't', long, conflicts_with = "detach")]
    pub tty: bool,

    /// Run in the background; output goes to the container log.
    #[arg(short, long)]
    pub detach: bool,

    /// Container name.
    #[arg(long, default_value = "")]
    pub name: String,

    /// Memory limit, e.g. `100m`.
    #[arg(short, long, default_value = "")]
    pub memory: String,

    /// CPU quota as a percentage of one core.
    #[arg(long, default_value_t = 0)]
    pub cpu: u32,

    /// CPUs the container may run on, e.g. `0-1`.
    #[arg(long, default_value = "")]
    pub cpuset: String,

    /// Bind mount `host:container`.
    #[arg(short, long, default_value = "")]
    pub volume: String,

    /// Publish `hostPort:containerPort`; repeatable.
    #[arg(short, long = "publish")]
    pub publish: Vec<String>,

    /// Network to connect to.
    #[arg(long)]
    pub net: Option<String>,

    /// Image to create the root filesystem from.
    pub image: String,

    /// Command and arguments.
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    fn options(self) -> RunOptions {
        RunOptions {
            detach: self.detach,
            name: self.name,
            image: self.image,
            command: self.command,
            resources: ResourceConfig {
                memory_limit: self.memory,
                cpu_set: self.cpuset,
                cpu_cfs_quota: self.cpu,
            },
            volume: self.volume,
            port_mapping: self.publish,
            network: self.net,
        }
    }
}

/// Executes the `run` command.
///
/// Interactive runs exit with the container's exit code; detached runs
/// print the container id.
///
/// # Errors
///
/// Returns an error if the container cannot be created.
pub fn execute(engine: &Engine, args: RunArgs) -> anyhow::Result<ExitCode> {
    match engine.run(&args.options())? {
        RunOutcome::Detached { id, .. } => {
            println!("{id}");
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Exited { code, .. } => Ok(output::exit_code(code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Command};
    use clap::Parser;

    fn parse(args: &[&str]) -> Result<RunArgs, clap::Error> {
        let cli = Cli::try_parse_from(std::iter::once("minibox").chain(args.iter().copied()))?;
        match cli.command {
            Command::Run(args) => Ok(args),
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn full_flag_set_maps_to_options() {
        let args = parse(&[
            "run", "-d", "--name", "web", "-m", "100m", "--cpu", "50", "--cpuset", "0-1", "-v",
            "/data:/srv", "-p", "8080:80", "-p", "8443:443", "--net", "testbr", "busybox", "top",
            "-b",
        ])
        .unwrap();
        let options = args.options();
        assert!(options.detach);
        assert_eq!(options.name, "web");
        assert_eq!(options.image, "busybox");
        assert_eq!(options.command, ["top", "-b"]);
        assert_eq!(options.resources.memory_limit, "100m");
        assert_eq!(options.resources.cpu_cfs_quota, 50);
        assert_eq!(options.resources.cpu_set, "0-1");
        assert_eq!(options.volume, "/data:/srv");
        assert_eq!(options.port_mapping, ["8080:80", "8443:443"]);
        assert_eq!(options.network.as_deref(), Some("testbr"));
    }

    #[test]
    fn interactive_and_detach_conflict() {
        assert!(parse(&["run", "-it", "-d", "busybox", "sh"]).is_err());
    }

    #[test]
    fn combined_it_flags_parse() {
        let args = parse(&["run", "-it", "busybox", "sh"]).unwrap();
        assert!(args.interactive && args.tty && !args.detach);
    }

    #[test]
    fn command_is_required() {
        assert!(parse(&["run", "busybox"]).is_err());
    }
}
