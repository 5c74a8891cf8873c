//! Run the bridge in the foreground.

use std::time::Duration;

use smarter_link_core::api::list_devices;
use smarter_link_core::{ArpTableResolver, Bridge, BridgeConfig};
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::get_formatter;

/// Start discovery and sessions, report the device table until Ctrl+C.
pub async fn run_bridge(args: RunArgs, config: BridgeConfig, json: bool) -> Result<(), CliError> {
    if args.report_interval == 0 {
        return Err(CliError::InvalidArgument(
            "report interval must be at least 1 second".to_string(),
        ));
    }

    let formatter = get_formatter(json);
    let bridge = Bridge::start(config, ArpTableResolver::new())?;

    let mut report = interval(Duration::from_secs(args.report_interval));
    report.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately, before discovery has had a chance to answer
    report.tick().await;

    let result = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break signal.map_err(CliError::from);
            }
            _ = report.tick() => {
                let devices: Vec<_> = list_devices(bridge.registry()).await.into_values().collect();
                println!("{}", formatter.format_devices(&devices));
            }
        }
    };

    bridge.shutdown().await;
    result
}
