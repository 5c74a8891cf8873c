//! Protocol layer for appliance communication.
//!
//! This module handles building commands and decoding frames exchanged with
//! Smarter appliances over TCP (commands, status) and UDP (discovery).

pub mod commands;
pub mod response;

pub use commands::{Command, Cups, HotplateMinutes, Strength};
pub use response::{
    classify_frame, decode_acknowledgement, decode_status, is_discovery_reply, split_frames,
    Acknowledgement, FrameKind,
};

/// TCP command port and UDP discovery port of the appliance.
pub const APPLIANCE_PORT: u16 = 2081;

/// Every frame ends with this byte.
pub const MESSAGE_TERMINATOR: u8 = 0x7E;

/// Device type byte carried by coffee machines in discovery replies.
pub const COFFEE_DEVICE_TYPE: u8 = 0x02;

/// Opcodes on the wire.
pub mod opcode {
    pub const ACKNOWLEDGEMENT_REPLY: u8 = 0x03;
    pub const STATUS_REPLY: u8 = 0x32;
    pub const BREW_ON: u8 = 0x33;
    pub const BREW_OFF: u8 = 0x34;
    pub const STRENGTH: u8 = 0x35;
    pub const CUPS: u8 = 0x36;
    pub const BREW_ON_DEFAULT: u8 = 0x37;
    pub const TOGGLE_GRIND: u8 = 0x3C;
    pub const HOTPLATE_ON: u8 = 0x3E;
    pub const HOTPLATE_OFF: u8 = 0x4A;
    pub const DISCOVERY_REQUEST: u8 = 0x64;
    pub const DISCOVERY_REPLY: u8 = 0x65;
}

/// Acknowledgement codes (byte 1 of an acknowledgement frame).
pub mod ack_code {
    pub const SUCCESS: u8 = 0x00;
    pub const NO_CARAFE: u8 = 0x05;
}

/// Datagram broadcast to find appliances.
pub fn discovery_request() -> [u8; 2] {
    [opcode::DISCOVERY_REQUEST, MESSAGE_TERMINATOR]
}
