//! Command implementations.

pub mod cmd;
pub mod discover;
pub mod run;
pub mod status;

pub use cmd::run_cmd;
pub use discover::run_discover;
pub use run::run_bridge;
pub use status::run_status;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use smarter_link_core::device::NoopObserver;
use smarter_link_core::{BridgeConfig, DeviceId, DeviceSession, SessionOptions, StatusSnapshot};
use tokio::time::timeout;

use crate::error::CliError;

/// Open a session straight to an appliance, bypassing discovery.
async fn open_session(
    ip: &str,
    config: &BridgeConfig,
    timeout_ms: u64,
) -> Result<DeviceSession, CliError> {
    let address: IpAddr = ip
        .parse()
        .map_err(|_| CliError::InvalidArgument(format!("'{}' is not an IP address", ip)))?;

    let session = DeviceSession::new(
        DeviceId::new(ip),
        address,
        SessionOptions {
            port: config.appliance_port,
            connect_timeout: Duration::from_millis(timeout_ms),
            settle_delay: config.settle_delay(),
        },
        Arc::new(NoopObserver),
    );
    session.connect().await?;
    Ok(session)
}

fn describe_wait(wait: Duration) -> String {
    if wait.subsec_millis() == 0 {
        format!("{}s", wait.as_secs())
    } else {
        format!("{}ms", wait.as_millis())
    }
}

/// Wait for the first status frame from a connected session.
async fn first_status(
    session: &DeviceSession,
    wait: Duration,
) -> Result<StatusSnapshot, CliError> {
    let no_status = || {
        CliError::Timeout(format!(
            "no status from {} within {}",
            session.address(),
            describe_wait(wait)
        ))
    };

    let mut updates = session.subscribe_status();
    let status = timeout(wait, updates.wait_for(Option::is_some))
        .await
        .map_err(|_| no_status())?
        .map_err(|_| no_status())?;

    (*status).ok_or_else(no_status)
}
