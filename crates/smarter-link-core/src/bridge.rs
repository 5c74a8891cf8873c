//! Top-level wiring: registry, discovery loop and subscription eviction.

use std::sync::Arc;

use reqwest::Client;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::device::DeviceRegistry;
use crate::discovery::{DiscoveryService, HardwareAddressResolver, Scanner};
use crate::error::Result;

/// A running bridge. Dropping it without [`Bridge::shutdown`] leaves the
/// background tasks running until the runtime stops.
pub struct Bridge {
    registry: Arc<DeviceRegistry>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Build the registry and start the background loops.
    pub fn start<R>(config: BridgeConfig, resolver: R) -> Result<Self>
    where
        R: HardwareAddressResolver + 'static,
    {
        let client = Client::builder()
            .timeout(config.notification_timeout())
            .build()?;
        let registry = Arc::new(DeviceRegistry::new(&config, client));
        let cancel = CancellationToken::new();

        let discovery = DiscoveryService::new(
            Scanner::new(&config, resolver),
            Arc::clone(&registry),
            config.discovery_interval(),
        );

        let tasks = vec![
            tokio::spawn(discovery.run(cancel.child_token())),
            tokio::spawn(evict_subscriptions(
                Arc::clone(&registry),
                config.subscription_eviction_interval(),
                cancel.child_token(),
            )),
        ];

        info!(
            discovery_port = config.discovery_port,
            appliance_port = config.appliance_port,
            "bridge started"
        );

        Ok(Self {
            registry,
            cancel,
            tasks,
        })
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Token cancelled on shutdown, for callers that tie their own tasks to the bridge.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the loops and close every device connection.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        for entry in self.registry.list().await {
            entry.session.disconnect().await;
        }
        info!("bridge stopped");
    }
}

async fn evict_subscriptions(
    registry: Arc<DeviceRegistry>,
    period: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let removed = registry.evict_expired_subscriptions().await;
                if removed > 0 {
                    debug!(removed, "expired subscriptions evicted");
                }
            }
        }
    }
}
