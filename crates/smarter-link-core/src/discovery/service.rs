//! Periodic discovery feeding the device registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::device::{DeviceRegistry, UpsertOutcome};
use crate::error::DiscoveryError;

use super::resolver::HardwareAddressResolver;
use super::scanner::{DiscoveredAppliance, Scanner};

/// Runs a scan at startup and then on a fixed interval.
pub struct DiscoveryService<R> {
    scanner: Scanner<R>,
    registry: Arc<DeviceRegistry>,
    interval: Duration,
}

impl<R: HardwareAddressResolver> DiscoveryService<R> {
    pub fn new(scanner: Scanner<R>, registry: Arc<DeviceRegistry>, interval: Duration) -> Self {
        Self {
            scanner,
            registry,
            interval,
        }
    }

    /// One scan followed by registration of everything found.
    pub async fn run_cycle(&self) -> Result<Vec<UpsertOutcome>, DiscoveryError> {
        let found = self.scanner.scan().await?;
        Ok(self.register(&found).await)
    }

    /// Hand discovered appliances to the registry.
    pub async fn register(&self, found: &[DiscoveredAppliance]) -> Vec<UpsertOutcome> {
        let mut outcomes = Vec::with_capacity(found.len());
        for appliance in found {
            let outcome = self
                .registry
                .upsert(appliance.hardware_address, appliance.network_address)
                .await;
            if outcome != UpsertOutcome::Unchanged {
                info!(
                    device = %appliance.id(),
                    address = %appliance.network_address,
                    ?outcome,
                    "registry updated"
                );
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Scan until cancelled. Cycle errors are logged and the loop carries on.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "discovery loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.run_cycle() => {
                    if let Err(e) = result {
                        warn!(error = %e, "discovery cycle failed");
                    }
                }
            }
        }

        info!("discovery loop stopped");
    }
}
