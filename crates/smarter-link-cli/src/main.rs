//! Smarter-Link CLI - discover, inspect and control Smarter coffee appliances.
//!
//! `run` starts the full bridge; the other commands talk to one appliance
//! directly, which is handy for scripting and for checking a machine is reachable.

mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use smarter_link_core::BridgeConfig;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use error::{exit_codes, CliError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let result = run(cli).await;

    match result {
        Ok(()) => std::process::exit(exit_codes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

/// Log to stderr. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "smarter_link_core=debug,smarter_link=debug"
    } else {
        "smarter_link_core=info,smarter_link=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = BridgeConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Discover(args) => commands::run_discover(args, config, cli.json).await,
        Commands::Status(args) => commands::run_status(args, config, cli.timeout, cli.json).await,
        Commands::Cmd(args) => commands::run_cmd(args, config, cli.timeout, cli.json).await,
        Commands::Run(args) => commands::run_bridge(args, config, cli.json).await,
    }
}
