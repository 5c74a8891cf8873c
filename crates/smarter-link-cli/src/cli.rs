//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use smarter_link_core::DeviceCommand;

/// Smarter-Link - discover and control Smarter coffee appliances on the LAN
#[derive(Parser, Debug)]
#[command(name = "smarter-link")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Connect timeout in milliseconds
    #[arg(long, global = true, default_value = "5000", env = "SMARTER_LINK_TIMEOUT")]
    pub timeout: u64,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: platform config directory)
    #[arg(long, global = true, env = "SMARTER_LINK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Broadcast once and list the appliances that answer
    Discover(DiscoverArgs),

    /// Connect to an appliance and print its status
    Status(StatusArgs),

    /// Send a single command to an appliance
    Cmd(CmdArgs),

    /// Run the bridge until interrupted
    Run(RunArgs),
}

// ==================== Discover ====================

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// How long to listen for replies (seconds)
    #[arg(short, long, default_value = "4")]
    pub duration: u64,
}

// ==================== Status ====================

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Appliance IP address
    pub ip: String,

    /// How long to wait for the first status frame (seconds)
    #[arg(short, long, default_value = "5")]
    pub wait: u64,
}

// ==================== Cmd ====================

#[derive(Args, Debug)]
pub struct CmdArgs {
    /// Appliance IP address
    pub ip: String,

    #[command(subcommand)]
    pub action: CmdAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CmdAction {
    /// Set brew strength (0 weak, 1 medium, 2 strong)
    Strength { value: i64 },

    /// Set number of cups (1-12)
    Cups { value: i64 },

    /// Select (true) or deselect (false) the grinder
    Grind {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },

    /// Start brewing with explicit settings
    BrewOn {
        #[arg(long)]
        grind: bool,

        #[arg(long)]
        cups: i64,

        #[arg(long)]
        strength: i64,
    },

    /// Start brewing with the appliance's current settings
    BrewDefault,

    /// Stop brewing
    BrewOff,

    /// Turn the hotplate on
    HotplateOn {
        /// Minutes to keep warm (1-30, default 5)
        #[arg(short, long)]
        minutes: Option<i64>,
    },

    /// Turn the hotplate off
    HotplateOff,
}

impl CmdAction {
    pub fn name(&self) -> &'static str {
        match self {
            CmdAction::Strength { .. } => "strength",
            CmdAction::Cups { .. } => "cups",
            CmdAction::Grind { .. } => "grind",
            CmdAction::BrewOn { .. } => "brew-on",
            CmdAction::BrewDefault => "brew-default",
            CmdAction::BrewOff => "brew-off",
            CmdAction::HotplateOn { .. } => "hotplate-on",
            CmdAction::HotplateOff => "hotplate-off",
        }
    }
}

impl From<CmdAction> for DeviceCommand {
    fn from(action: CmdAction) -> Self {
        match action {
            CmdAction::Strength { value } => DeviceCommand::Strength(value),
            CmdAction::Cups { value } => DeviceCommand::Cups(value),
            CmdAction::Grind { enabled } => DeviceCommand::Grind(enabled),
            CmdAction::BrewOn {
                grind,
                cups,
                strength,
            } => DeviceCommand::BrewOn {
                grind,
                cups,
                strength,
            },
            CmdAction::BrewDefault => DeviceCommand::BrewOnDefault,
            CmdAction::BrewOff => DeviceCommand::BrewOff,
            CmdAction::HotplateOn { minutes } => DeviceCommand::HotplateOn(minutes),
            CmdAction::HotplateOff => DeviceCommand::HotplateOff,
        }
    }
}

// ==================== Run ====================

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Print the device table this often (seconds)
    #[arg(long, default_value = "30")]
    pub report_interval: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_cmd_actions() {
        let cli = Cli::parse_from(["smarter-link", "cmd", "192.168.1.42", "grind", "false"]);
        match cli.command {
            Commands::Cmd(args) => {
                assert_eq!(args.ip, "192.168.1.42");
                assert_eq!(DeviceCommand::from(args.action), DeviceCommand::Grind(false));
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::parse_from([
            "smarter-link",
            "--json",
            "cmd",
            "10.0.0.5",
            "brew-on",
            "--grind",
            "--cups",
            "4",
            "--strength",
            "2",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::Cmd(args) => assert_eq!(
                DeviceCommand::from(args.action),
                DeviceCommand::BrewOn {
                    grind: true,
                    cups: 4,
                    strength: 2
                }
            ),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_hotplate_minutes_optional() {
        let cli = Cli::parse_from(["smarter-link", "cmd", "10.0.0.5", "hotplate-on"]);
        match cli.command {
            Commands::Cmd(args) => {
                assert_eq!(args.action.name(), "hotplate-on");
                assert_eq!(DeviceCommand::from(args.action), DeviceCommand::HotplateOn(None));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
