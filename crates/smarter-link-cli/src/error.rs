//! Error types for Smarter-Link CLI.
//!
//! CliError wraps CoreError from the shared library and adds CLI-specific variants.

use smarter_link_core::error::CoreError;
use thiserror::Error;

pub use smarter_link_core::error::{ConfigError, DeviceError, DiscoveryError};

/// Exit codes for the CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NETWORK_ERROR: i32 = 2;
    pub const DEVICE_ERROR: i32 = 3;
    pub const INVALID_ARGS: i32 = 4;
}

/// Main error type for the CLI
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No appliances found")]
    NoDevicesFound,

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Core(e) => match e {
                CoreError::Device(DeviceError::Validation(_)) => exit_codes::INVALID_ARGS,
                CoreError::Device(DeviceError::ConnectFailed { .. }) => exit_codes::NETWORK_ERROR,
                CoreError::Device(_) => exit_codes::DEVICE_ERROR,
                CoreError::Discovery(_) => exit_codes::NETWORK_ERROR,
                CoreError::Http(_) => exit_codes::NETWORK_ERROR,
                CoreError::Subscription(_) => exit_codes::INVALID_ARGS,
                CoreError::Config(_) => exit_codes::GENERAL_ERROR,
            },
            CliError::Io(_) => exit_codes::GENERAL_ERROR,
            CliError::InvalidArgument(_) => exit_codes::INVALID_ARGS,
            CliError::NoDevicesFound => exit_codes::GENERAL_ERROR,
            CliError::Timeout(_) => exit_codes::NETWORK_ERROR,
        }
    }
}

// Conversions from core error subtypes to CliError
impl From<DeviceError> for CliError {
    fn from(e: DeviceError) -> Self {
        CliError::Core(CoreError::Device(e))
    }
}

impl From<DiscoveryError> for CliError {
    fn from(e: DiscoveryError) -> Self {
        CliError::Core(CoreError::Discovery(e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Core(CoreError::Config(e))
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
