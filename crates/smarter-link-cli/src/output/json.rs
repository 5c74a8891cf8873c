//! JSON-formatted output for CLI.

use serde::Serialize;
use serde_json::json;

use smarter_link_core::{DeviceView, DiscoveredAppliance, StatusSnapshot};

use super::OutputFormatter;

pub struct JsonOutput;

impl JsonOutput {
    pub fn new() -> Self {
        Self
    }

    fn to_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for JsonOutput {
    fn format_discovered(&self, appliances: &[DiscoveredAppliance]) -> String {
        let items: Vec<_> = appliances
            .iter()
            .map(|a| {
                json!({
                    "id": a.id(),
                    "networkAddress": a.network_address,
                    "hardwareAddress": a.hardware_address,
                })
            })
            .collect();

        Self::to_json(&json!({
            "appliances": items,
            "count": appliances.len()
        }))
    }

    fn format_status(&self, ip: &str, status: &StatusSnapshot) -> String {
        Self::to_json(&json!({
            "ip": ip,
            "status": status
        }))
    }

    fn format_devices(&self, devices: &[DeviceView]) -> String {
        Self::to_json(&json!({
            "devices": devices,
            "count": devices.len()
        }))
    }

    fn format_command_result(
        &self,
        ip: &str,
        command: &str,
        success: bool,
        message: &str,
    ) -> String {
        Self::to_json(&json!({
            "ip": ip,
            "command": command,
            "success": success,
            "message": message
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_format_discovered() {
        let appliances = [DiscoveredAppliance {
            network_address: "192.168.1.42".parse().unwrap(),
            hardware_address: "18:FE:34:AA:BB:CC".parse().unwrap(),
        }];

        let value: Value = serde_json::from_str(&JsonOutput::new().format_discovered(&appliances))
            .unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["appliances"][0]["id"], "18fe34aabbcc");
        assert_eq!(value["appliances"][0]["hardwareAddress"], "18:fe:34:aa:bb:cc");
        assert_eq!(value["appliances"][0]["networkAddress"], "192.168.1.42");
    }

    #[test]
    fn test_format_status() {
        let status = StatusSnapshot {
            is_brewing: false,
            is_carafe_detected: true,
            is_grind_selected: true,
            is_hotplate_on: false,
            water_level: 3,
            strength: 2,
            cups: 4,
        };

        let value: Value =
            serde_json::from_str(&JsonOutput::new().format_status("10.0.0.5", &status)).unwrap();
        assert_eq!(value["ip"], "10.0.0.5");
        assert_eq!(value["status"]["isGrindSelected"], true);
        assert_eq!(value["status"]["waterLevel"], 3);
    }
}
