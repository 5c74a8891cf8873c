//! Output formatting for CLI results.

pub mod json;
pub mod table;

pub use json::JsonOutput;
pub use table::TableOutput;

use smarter_link_core::{DeviceView, DiscoveredAppliance, StatusSnapshot};

/// Output formatter trait
pub trait OutputFormatter {
    /// Format the result of a discovery scan
    fn format_discovered(&self, appliances: &[DiscoveredAppliance]) -> String;

    /// Format one appliance's status
    fn format_status(&self, ip: &str, status: &StatusSnapshot) -> String;

    /// Format the bridge's device list
    fn format_devices(&self, devices: &[DeviceView]) -> String;

    /// Format command result
    fn format_command_result(&self, ip: &str, command: &str, success: bool, message: &str)
        -> String;
}

/// Get the appropriate formatter based on JSON flag
pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonOutput::new())
    } else {
        Box::new(TableOutput::new())
    }
}
