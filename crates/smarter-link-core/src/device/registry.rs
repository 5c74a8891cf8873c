//! Registry of known appliances.
//!
//! The one structure shared by discovery and the API layer. Inserts and
//! address updates happen under a single write guard, so concurrent lookups
//! never observe a half-registered device.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::subscription::SubscriptionRegistry;
use crate::types::{ConnectionState, Device, DeviceId, DeviceView, MacAddress};

use super::session::{DeviceSession, SessionObserver, SessionOptions};

/// A device together with its session and subscribers.
pub struct DeviceEntry {
    pub device: Device,
    pub session: DeviceSession,
    pub subscriptions: Arc<SubscriptionRegistry>,
}

impl DeviceEntry {
    /// Snapshot for the device endpoints.
    pub fn view(&self) -> DeviceView {
        DeviceView {
            id: self.device.id.clone(),
            hardware_address: self.device.hardware_address,
            network_address: self.session.address(),
            display_name: self.device.display_name.clone(),
            status: self.session.status(),
        }
    }
}

/// Result of registering a discovery reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    AddressChanged,
    Unchanged,
}

/// Map of device id -> device entry.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<DeviceId, Arc<DeviceEntry>>>,
    session_options: SessionOptions,
    display_name: String,
    client: Client,
}

impl DeviceRegistry {
    /// Create an empty registry.
    ///
    /// `client` is shared by every device's notification deliveries.
    pub fn new(config: &BridgeConfig, client: Client) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            session_options: SessionOptions {
                port: config.appliance_port,
                connect_timeout: config.connect_timeout(),
                settle_delay: config.settle_delay(),
            },
            display_name: config.display_name.clone(),
            client,
        }
    }

    /// Register or refresh a device reported by discovery.
    ///
    /// New devices get a session and an initial connect in the background.
    /// Known devices have their address updated; a known device that is
    /// sitting disconnected at the same address gets a reconnect, unless one
    /// is already scheduled after an address change.
    pub async fn upsert(&self, hardware_address: MacAddress, address: IpAddr) -> UpsertOutcome {
        let id = DeviceId::from(&hardware_address);
        let mut devices = self.devices.write().await;

        if let Some(entry) = devices.get(&id) {
            let entry = Arc::clone(entry);
            drop(devices);

            if entry.session.update_address(address).await {
                return UpsertOutcome::AddressChanged;
            }

            if entry.session.state() == ConnectionState::Disconnected
                && !entry.session.reconnect_pending()
            {
                debug!(device = %id, "known device is disconnected, reconnecting");
                spawn_connect(entry.session.clone());
            }
            return UpsertOutcome::Unchanged;
        }

        let device = Device::new(hardware_address, self.display_name.clone());
        let subscriptions = Arc::new(SubscriptionRegistry::new(id.clone(), self.client.clone()));
        let observer: Arc<dyn SessionObserver> = subscriptions.clone();
        let session = DeviceSession::new(id.clone(), address, self.session_options, observer);

        info!(device = %id, hardware_address = %hardware_address, %address, "new device");
        devices.insert(
            id,
            Arc::new(DeviceEntry {
                device,
                session: session.clone(),
                subscriptions,
            }),
        );
        drop(devices);

        spawn_connect(session);
        UpsertOutcome::Created
    }

    /// Look up a device by id.
    pub async fn get(&self, id: &DeviceId) -> Option<Arc<DeviceEntry>> {
        self.devices.read().await.get(id).cloned()
    }

    /// All devices, ordered by id.
    pub async fn list(&self) -> Vec<Arc<DeviceEntry>> {
        let mut entries: Vec<_> = self.devices.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.device.id.cmp(&b.device.id));
        entries
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Drop expired subscriptions on every device. Returns how many were removed.
    pub async fn evict_expired_subscriptions(&self) -> usize {
        self.list()
            .await
            .iter()
            .map(|entry| entry.subscriptions.evict_expired())
            .sum()
    }
}

fn spawn_connect(session: DeviceSession) {
    tokio::spawn(async move {
        if let Err(e) = session.connect().await {
            warn!(device = %session.device_id(), error = %e, "connect failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> BridgeConfig {
        BridgeConfig {
            // Nothing listens on port 1, so background connects fail fast
            appliance_port: 1,
            connect_timeout_secs: 1,
            settle_delay_secs: 60,
            ..BridgeConfig::default()
        }
    }

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_creates_device() {
        let registry = DeviceRegistry::new(&config(), Client::new());
        let outcome = registry
            .upsert(mac("AA:BB:CC:DD:EE:FF"), "127.0.0.1".parse().unwrap())
            .await;

        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(registry.len().await, 1);

        let entry = registry.get(&DeviceId::new("aabbccddeeff")).await.unwrap();
        let view = entry.view();
        assert_eq!(view.display_name, "Smarter Coffee Machine");
        assert_eq!(view.network_address, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert!(view.status.is_none());
    }

    #[tokio::test]
    async fn test_upsert_new_address_updates_without_duplicate() {
        let registry = DeviceRegistry::new(&config(), Client::new());
        registry
            .upsert(mac("aa:bb:cc:dd:ee:ff"), "127.0.0.1".parse().unwrap())
            .await;

        let outcome = registry
            .upsert(mac("AA:BB:CC:DD:EE:FF"), "127.0.0.2".parse().unwrap())
            .await;

        assert_eq!(outcome, UpsertOutcome::AddressChanged);
        assert_eq!(registry.len().await, 1);
        let entry = registry.get(&DeviceId::new("aabbccddeeff")).await.unwrap();
        assert_eq!(entry.session.address(), "127.0.0.2".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_upsert_same_address_is_unchanged() {
        let registry = DeviceRegistry::new(&config(), Client::new());
        let address: IpAddr = "127.0.0.1".parse().unwrap();
        registry.upsert(mac("aa:bb:cc:dd:ee:ff"), address).await;

        assert_eq!(
            registry.upsert(mac("aa:bb:cc:dd:ee:ff"), address).await,
            UpsertOutcome::Unchanged
        );
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unchanged_upsert_waits_for_scheduled_reconnect() {
        let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::UNSPECIFIED, 0))
            .await
            .unwrap();
        let config = BridgeConfig {
            appliance_port: listener.local_addr().unwrap().port(),
            connect_timeout_secs: 1,
            settle_delay_secs: 60,
            ..BridgeConfig::default()
        };
        let registry = DeviceRegistry::new(&config, Client::new());
        let hardware_address = mac("aa:bb:cc:dd:ee:ff");

        registry
            .upsert(hardware_address, "127.0.0.1".parse().unwrap())
            .await;
        let _first = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .unwrap()
            .unwrap();

        let moved: IpAddr = "127.0.0.2".parse().unwrap();
        assert_eq!(
            registry.upsert(hardware_address, moved).await,
            UpsertOutcome::AddressChanged
        );
        assert_eq!(
            registry.upsert(hardware_address, moved).await,
            UpsertOutcome::Unchanged
        );

        let entry = registry.get(&DeviceId::new("aabbccddeeff")).await.unwrap();
        assert!(entry.session.reconnect_pending());

        // The settle delay still applies: nobody connects early
        assert!(
            tokio::time::timeout(Duration::from_millis(300), listener.accept())
                .await
                .is_err()
        );
        assert_eq!(entry.session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_unknown_id_is_a_miss() {
        let registry = DeviceRegistry::new(&config(), Client::new());
        assert!(registry.get(&DeviceId::new("001122334455")).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_eviction_spans_devices() {
        let registry = DeviceRegistry::new(&config(), Client::new());
        registry
            .upsert(mac("ff:00:00:00:00:01"), "127.0.0.1".parse().unwrap())
            .await;
        registry
            .upsert(mac("00:00:00:00:00:02"), "127.0.0.2".parse().unwrap())
            .await;

        let entries = registry.list().await;
        assert_eq!(entries[0].device.id.as_str(), "000000000002");
        assert_eq!(entries[1].device.id.as_str(), "ff0000000001");

        let callback = reqwest::Url::parse("http://127.0.0.1:9/cb").unwrap();
        entries[0]
            .subscriptions
            .subscribe(None, Duration::ZERO, callback.clone());
        entries[1]
            .subscriptions
            .subscribe(None, Duration::ZERO, callback.clone());
        entries[1]
            .subscriptions
            .subscribe(None, Duration::from_secs(60), callback);

        assert_eq!(registry.evict_expired_subscriptions().await, 2);
    }
}
