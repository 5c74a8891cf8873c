//! Status command implementation.

use std::time::Duration;

use smarter_link_core::BridgeConfig;

use crate::cli::StatusArgs;
use crate::error::CliError;
use crate::output::get_formatter;

use super::{first_status, open_session};

/// Run the status command
pub async fn run_status(
    args: StatusArgs,
    config: BridgeConfig,
    timeout: u64,
    json: bool,
) -> Result<(), CliError> {
    let formatter = get_formatter(json);

    let session = open_session(&args.ip, &config, timeout).await?;
    let result = first_status(&session, Duration::from_secs(args.wait)).await;
    session.disconnect().await;

    println!("{}", formatter.format_status(&args.ip, &result?));
    Ok(())
}
