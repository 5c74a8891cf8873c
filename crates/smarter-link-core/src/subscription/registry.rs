//! Per-device subscription registry and notification dispatch.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::device::SessionObserver;
use crate::types::{DeviceFault, DeviceId, StatusSnapshot};

/// Header carrying the subscription id on every notification.
pub const SID_HEADER: &str = "SID";

/// One registered callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub subscription_id: String,
    pub expires_at: DateTime<Utc>,
    pub callback_url: Url,
}

impl Subscription {
    /// Live until `expires_at`, exclusive. A zero timeout is never live.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// What a subscriber is told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Notification {
    Status(StatusSnapshot),
    Error(DeviceFault),
}

/// Body POSTed to subscribers: `{id, status}` or `{id, error}`.
#[derive(Serialize)]
struct NotificationBody<'a> {
    id: &'a DeviceId,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// Expiring callback subscriptions for one device.
pub struct SubscriptionRegistry {
    device_id: DeviceId,
    entries: DashMap<String, Subscription>,
    client: Client,
}

impl SubscriptionRegistry {
    pub fn new(device_id: DeviceId, client: Client) -> Self {
        Self {
            device_id,
            entries: DashMap::new(),
            client,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Register a callback and return its subscription id.
    ///
    /// A fresh id is generated when none (or an empty one) is supplied. An
    /// existing entry with the same id is replaced.
    pub fn subscribe(
        &self,
        subscription_id: Option<String>,
        timeout: Duration,
        callback_url: Url,
    ) -> String {
        let subscription_id = subscription_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|timeout| now.checked_add_signed(timeout))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        debug!(
            device = %self.device_id,
            subscription = %subscription_id,
            callback = %callback_url,
            %expires_at,
            "subscription registered"
        );

        self.entries.insert(
            subscription_id.clone(),
            Subscription {
                subscription_id: subscription_id.clone(),
                expires_at,
                callback_url,
            },
        );

        subscription_id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, subscription_id: &str) -> bool {
        self.entries.remove(subscription_id).is_some()
    }

    /// Subscriptions that have not expired yet.
    pub fn active(&self) -> Vec<Subscription> {
        let now = Utc::now();
        self.entries
            .iter()
            .filter(|entry| entry.is_active_at(now))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, subscription| subscription.is_active_at(now));
        before.saturating_sub(self.entries.len())
    }

    /// Push a notification to every live subscriber.
    ///
    /// Each delivery runs in its own task; failures are logged there and never
    /// reach the caller. Returns the number of deliveries dispatched.
    pub fn notify(&self, notification: Notification) -> usize {
        let targets = self.active();
        if targets.is_empty() {
            return 0;
        }

        let body = match serde_json::to_value(NotificationBody {
            id: &self.device_id,
            notification: &notification,
        }) {
            Ok(body) => body,
            Err(e) => {
                warn!(device = %self.device_id, error = %e, "failed to encode notification");
                return 0;
            }
        };

        for subscription in &targets {
            tokio::spawn(deliver(
                self.client.clone(),
                self.device_id.clone(),
                subscription.clone(),
                body.clone(),
            ));
        }

        targets.len()
    }
}

impl SessionObserver for SubscriptionRegistry {
    fn on_status(&self, _device_id: &DeviceId, status: &StatusSnapshot) {
        self.notify(Notification::Status(*status));
    }

    fn on_fault(&self, _device_id: &DeviceId, fault: DeviceFault) {
        self.notify(Notification::Error(fault));
    }
}

async fn deliver(
    client: Client,
    device_id: DeviceId,
    subscription: Subscription,
    body: serde_json::Value,
) {
    let result = client
        .post(subscription.callback_url.clone())
        .header(SID_HEADER, &subscription.subscription_id)
        .json(&body)
        .send()
        .await
        .and_then(|response| response.error_for_status());

    match result {
        Ok(response) => debug!(
            device = %device_id,
            subscription = %subscription.subscription_id,
            status = %response.status(),
            "notification delivered"
        ),
        Err(e) => warn!(
            device = %device_id,
            subscription = %subscription.subscription_id,
            callback = %subscription.callback_url,
            error = %e,
            "notification delivery failed"
        ),
    }
}
