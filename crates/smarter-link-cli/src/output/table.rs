//! Table-formatted output for CLI.

use colored::*;
use comfy_table::{Cell, Color, ContentArrangement, Table};

use smarter_link_core::{DeviceView, DiscoveredAppliance, StatusSnapshot};

use super::OutputFormatter;

pub struct TableOutput;

impl TableOutput {
    pub fn new() -> Self {
        Self
    }

    fn strength(strength: u8) -> &'static str {
        match strength {
            0 => "Weak",
            1 => "Medium",
            2 => "Strong",
            _ => "?",
        }
    }

    fn yes_no(value: bool) -> ColoredString {
        if value {
            "Yes".green()
        } else {
            "No".dimmed()
        }
    }
}

impl Default for TableOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for TableOutput {
    fn format_discovered(&self, appliances: &[DiscoveredAppliance]) -> String {
        if appliances.is_empty() {
            return "No appliances found.".to_string();
        }

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["IP", "Hardware Address", "ID"]);

        for appliance in appliances {
            table.add_row(vec![
                Cell::new(appliance.network_address),
                Cell::new(appliance.hardware_address),
                Cell::new(appliance.id()),
            ]);
        }

        format!("{}\n\nFound {} appliance(s)", table, appliances.len())
    }

    fn format_status(&self, ip: &str, status: &StatusSnapshot) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Appliance: {}", ip));
        lines.push(format!("  Brewing:     {}", Self::yes_no(status.is_brewing)));
        lines.push(format!("  Carafe:      {}", Self::yes_no(status.is_carafe_detected)));
        lines.push(format!("  Grinder:     {}", Self::yes_no(status.is_grind_selected)));
        lines.push(format!("  Hotplate:    {}", Self::yes_no(status.is_hotplate_on)));
        lines.push(format!("  Water level: {}", status.water_level));
        lines.push(format!("  Strength:    {}", Self::strength(status.strength)));
        lines.push(format!("  Cups:        {}", status.cups));

        lines.join("\n")
    }

    fn format_devices(&self, devices: &[DeviceView]) -> String {
        if devices.is_empty() {
            return "No devices registered.".to_string();
        }

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["ID", "IP", "Name", "Brewing", "Carafe", "Water", "Cups"]);

        for device in devices {
            let mut row = vec![
                Cell::new(&device.id),
                Cell::new(device.network_address),
                Cell::new(&device.display_name),
            ];
            match &device.status {
                Some(status) => {
                    let brewing = if status.is_brewing {
                        Cell::new("Yes").fg(Color::Green)
                    } else {
                        Cell::new("No")
                    };
                    let carafe = if status.is_carafe_detected {
                        Cell::new("Yes")
                    } else {
                        Cell::new("No").fg(Color::Red)
                    };
                    row.extend([
                        brewing,
                        carafe,
                        Cell::new(status.water_level),
                        Cell::new(status.cups),
                    ]);
                }
                None => row.extend((0..4).map(|_| Cell::new("-").fg(Color::DarkGrey))),
            }
            table.add_row(row);
        }

        format!("{}\n\n{} device(s)", table, devices.len())
    }

    fn format_command_result(
        &self,
        ip: &str,
        command: &str,
        success: bool,
        message: &str,
    ) -> String {
        let status = if success {
            "[OK]".green()
        } else {
            "[FAIL]".red()
        };

        if message.is_empty() {
            format!("{} {} '{}'", status, ip, command)
        } else {
            format!("{} {} '{}'\n{}", status, ip, command, message)
        }
    }
}
