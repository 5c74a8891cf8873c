//! Device communication layer.
//!
//! Provides the per-appliance TCP session and the registry of known appliances.

pub mod registry;
pub mod session;

pub use registry::{DeviceEntry, DeviceRegistry, UpsertOutcome};
pub use session::{DeviceSession, NoopObserver, SessionObserver, SessionOptions};
