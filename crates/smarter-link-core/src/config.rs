//! Bridge configuration.
//!
//! Every field has a default, so a missing file or a partial file is fine.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::APPLIANCE_PORT;
use crate::types::DEFAULT_DISPLAY_NAME;

const CONFIG_FILE_NAME: &str = "config.json";

/// Runtime configuration for discovery, sessions and notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// UDP port discovery requests are sent to and replies are received on
    pub discovery_port: u16,
    /// TCP port of the appliance command channel
    pub appliance_port: u16,
    pub broadcast_address: Ipv4Addr,
    pub discovery_interval_secs: u64,
    /// How long each discovery cycle listens for replies
    pub discovery_window_secs: u64,
    /// Delay before reconnecting to an appliance whose address changed
    pub settle_delay_secs: u64,
    pub connect_timeout_secs: u64,
    pub notification_timeout_secs: u64,
    pub subscription_eviction_interval_secs: u64,
    pub display_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            discovery_port: APPLIANCE_PORT,
            appliance_port: APPLIANCE_PORT,
            broadcast_address: Ipv4Addr::BROADCAST,
            discovery_interval_secs: 5 * 60,
            discovery_window_secs: 4,
            settle_delay_secs: 5,
            connect_timeout_secs: 5,
            notification_timeout_secs: 10,
            subscription_eviction_interval_secs: 60,
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise from the platform config directory.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path.map(Path::to_path_buf).or_else(default_config_path) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "discoveryIntervalSecs must be greater than zero".to_string(),
            ));
        }
        if self.discovery_window_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "discoveryWindowSecs must be greater than zero".to_string(),
            ));
        }
        if self.subscription_eviction_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "subscriptionEvictionIntervalSecs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_secs(self.discovery_window_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }

    pub fn subscription_eviction_interval(&self) -> Duration {
        Duration::from_secs(self.subscription_eviction_interval_secs)
    }
}

/// Get the default config file location.
///
/// Uses the `directories` crate to find the platform-specific config directory.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "smarter-link", "smarter-link")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
