//! Error types for Smarter-Link core.

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

/// Core error type for shared operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Command argument errors. Raised before anything reaches the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Strength must be 0, 1 or 2 (got {0})")]
    Strength(i64),

    #[error("Cups must be between 1 and 12 (got {0})")]
    Cups(i64),

    #[error("Hotplate minutes must be between 1 and 30 (got {0})")]
    HotplateMinutes(i64),

    #[error("'{0}' must be true or false")]
    Flag(String),

    #[error("'{0}' must be an integer")]
    NotAnInteger(String),

    #[error("Missing field '{0}'")]
    MissingField(String),

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
}

/// Device session and command errors
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Invalid command: {0}")]
    Validation(#[from] ValidationError),

    #[error("Device {id} is not connected")]
    NotConnected { id: String },

    #[error("Device {id} has not reported its status yet")]
    StatusUnknown { id: String },

    #[error("Connection to {addr} failed: {message}")]
    ConnectFailed { addr: SocketAddr, message: String },

    #[error("Write to device {id} failed: {message}")]
    WriteFailed { id: String, message: String },

    #[error("Device not found: {0}")]
    NotFound(String),
}

impl DeviceError {
    /// Whether the error comes from the caller's arguments rather than the link.
    pub fn is_validation(&self) -> bool {
        matches!(self, DeviceError::Validation(_))
    }
}

/// Malformed inbound frames. Never surfaced past the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("{kind} frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Unexpected opcode 0x{0:02x}")]
    UnexpectedOpcode(u8),
}

/// Discovery cycle errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Discovery socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("Could not resolve hardware address for {ip}: {message}")]
    Resolution { ip: IpAddr, message: String },

    #[error("Invalid hardware address: {0}")]
    InvalidHardwareAddress(String),
}

/// Subscribe request errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("Missing {0} header")]
    MissingHeader(&'static str),

    #[error("Invalid timeout header: {0}")]
    InvalidTimeout(String),

    #[error("Invalid callback header: {0}")]
    InvalidCallback(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::Cups(13);
        assert_eq!(format!("{}", err), "Cups must be between 1 and 12 (got 13)");
    }

    #[test]
    fn test_core_error_from_device_error() {
        let err = CoreError::Device(DeviceError::NotConnected {
            id: "aabbccddeeff".to_string(),
        });
        assert!(format!("{}", err).contains("not connected"));
    }

    #[test]
    fn test_device_error_from_validation() {
        let err: DeviceError = ValidationError::Strength(3).into();
        assert!(err.is_validation());
        assert!(!DeviceError::NotFound("x".to_string()).is_validation());
    }
}
