//! Single command execution.

use std::time::Duration;

use smarter_link_core::{BridgeConfig, DeviceCommand};

use crate::cli::{CmdAction, CmdArgs};
use crate::error::CliError;
use crate::output::get_formatter;

use super::{first_status, open_session};

/// Run the cmd command
pub async fn run_cmd(
    args: CmdArgs,
    config: BridgeConfig,
    timeout: u64,
    json: bool,
) -> Result<(), CliError> {
    let formatter = get_formatter(json);
    let name = args.action.name();
    let needs_status = matches!(args.action, CmdAction::Grind { .. });
    let command = DeviceCommand::from(args.action);

    let session = open_session(&args.ip, &config, timeout).await?;

    // Grind is a toggle on the wire, so the current selection must be known first
    let result = async {
        if needs_status {
            first_status(&session, Duration::from_millis(timeout)).await?;
        }
        command.apply(&session).await.map_err(CliError::from)
    }
    .await;

    session.disconnect().await;

    match result {
        Ok(()) => {
            println!("{}", formatter.format_command_result(&args.ip, name, true, ""));
            Ok(())
        }
        Err(e) => {
            println!(
                "{}",
                formatter.format_command_result(&args.ip, name, false, &e.to_string())
            );
            Err(e)
        }
    }
}
