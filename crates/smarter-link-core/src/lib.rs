//! Smarter-Link core: LAN bridge for Smarter coffee appliances.
//!
//! Discovers appliances by UDP broadcast, keeps one TCP session per
//! appliance, tracks decoded status and pushes changes to HTTP subscribers.

pub mod api;
pub mod bridge;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod subscription;
pub mod types;

pub use api::{ApiError, DeviceCommand};
pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use device::{DeviceRegistry, DeviceSession, SessionObserver, SessionOptions};
pub use discovery::{ArpTableResolver, DiscoveredAppliance, HardwareAddressResolver, Scanner};
pub use error::{CoreError, DeviceError, DiscoveryError, Result, ValidationError};
pub use types::{ConnectionState, Device, DeviceFault, DeviceId, DeviceView, MacAddress, StatusSnapshot};
