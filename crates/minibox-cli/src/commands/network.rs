//! `minibox network`: manage container networks.

use clap::{Args, Subcommand};
use minibox_network::driver::Driver;
use minibox_runtime::engine::Engine;

use crate::output::format_table;

/// Network subcommands.
#[derive(Subcommand, Debug)]
pub enum NetworkCommand {
    /// Create a network.
    Create(CreateArgs),
    /// List networks.
    #[command(alias = "ls")]
    List,
    /// Remove a network.
    #[command(alias = "rm")]
    Remove(RemoveArgs),
}

/// Arguments for `network create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Network driver.
    #[arg(long, default_value = "bridge")]
    pub driver: Driver,

    /// Subnet in CIDR form, e.g. `192.168.10.0/24`.
    #[arg(long)]
    pub subnet: String,

    /// Network name; also the bridge device name.
    pub name: String,
}

/// Arguments for `network remove`.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Network name.
    pub name: String,
}

/// Executes a `network` subcommand.
///
/// # Errors
///
/// Returns an error if the driver, address allocator or store fails.
pub fn execute(engine: &Engine, command: NetworkCommand) -> anyhow::Result<()> {
    let networks = engine.networks();
    match command {
        NetworkCommand::Create(args) => {
            let network = networks.create_network(args.driver, &args.subnet, &args.name)?;
            println!("{}", network.name);
        }
        NetworkCommand::List => {
            let rows: Vec<[String; 3]> = networks
                .list_networks()?
                .into_iter()
                .map(|n| [n.name, n.ip_range.to_string(), n.driver.to_string()])
                .collect();
            print!("{}", format_table(["NAME", "IpRange", "Driver"], &rows));
        }
        NetworkCommand::Remove(args) => {
            networks.remove_network(&args.name)?;
            println!("{}", args.name);
        }
    }
    Ok(())
}
