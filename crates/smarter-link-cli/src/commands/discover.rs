//! Discover command implementation.

use smarter_link_core::{ArpTableResolver, BridgeConfig, Scanner};

use crate::cli::DiscoverArgs;
use crate::error::CliError;
use crate::output::get_formatter;

/// Run the discover command
pub async fn run_discover(
    args: DiscoverArgs,
    config: BridgeConfig,
    json: bool,
) -> Result<(), CliError> {
    let formatter = get_formatter(json);

    if args.duration == 0 {
        return Err(CliError::InvalidArgument(
            "duration must be at least 1 second".to_string(),
        ));
    }

    let config = BridgeConfig {
        discovery_window_secs: args.duration,
        ..config
    };

    if !json {
        eprintln!("Discovering appliances for {} seconds...", args.duration);
    }

    let scanner = Scanner::new(&config, ArpTableResolver::new());
    let mut appliances = scanner.scan().await?;
    appliances.sort_by_key(|a| a.network_address);

    println!("{}", formatter.format_discovered(&appliances));

    if appliances.is_empty() {
        return Err(CliError::NoDevicesFound);
    }

    Ok(())
}
