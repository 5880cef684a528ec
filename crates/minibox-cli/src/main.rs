//! # minibox
//!
//! A minimal container runtime: namespaces, cgroups, overlay root
//! filesystems and bridge networking in a single binary.

#![allow(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use minibox_runtime::exec::ExecRequest;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() -> anyhow::Result<ExitCode> {
    // The exec helper must join namespaces before anything else runs.
    if let Some(request) = ExecRequest::from_env() {
        return Ok(match request.run() {
            Ok(code) => output::exit_code(code),
            Err(e) => {
                eprintln!("minibox exec: {e}");
                ExitCode::FAILURE
            }
        });
    }

    let cli = Cli::parse();
    init_tracing(cli.log_json);
    commands::execute(cli)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
