//! Command frame builders for the appliance protocol.
//!
//! These frames are written to the appliance over its TCP port. Parameterised
//! commands only accept validated argument types, so an out-of-range value
//! never gets as far as the encoder.

use crate::error::ValidationError;

use super::{opcode, MESSAGE_TERMINATOR};

/// Hotplate duration used when the caller does not pick one.
pub const DEFAULT_HOTPLATE_MINUTES: u8 = 5;

/// Brew strength: 0 (weak), 1 (medium) or 2 (strong).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strength(u8);

impl Strength {
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Strength {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(v @ 0..=2) => Ok(Self(v)),
            _ => Err(ValidationError::Strength(value)),
        }
    }
}

/// Number of cups, 1 to 12.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cups(u8);

impl Cups {
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Cups {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(v @ 1..=12) => Ok(Self(v)),
            _ => Err(ValidationError::Cups(value)),
        }
    }
}

/// Hotplate duration in minutes, 1 to 30.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotplateMinutes(u8);

impl HotplateMinutes {
    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for HotplateMinutes {
    fn default() -> Self {
        Self(DEFAULT_HOTPLATE_MINUTES)
    }
}

impl TryFrom<i64> for HotplateMinutes {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(v @ 1..=30) => Ok(Self(v)),
            _ => Err(ValidationError::HotplateMinutes(value)),
        }
    }
}

/// One outbound frame: opcode, parameters, terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: u8,
    params: Vec<u8>,
}

impl Command {
    /// Raw constructor. Callers are responsible for parameter ranges.
    pub fn new(opcode: u8, params: &[u8]) -> Self {
        Self {
            opcode,
            params: params.to_vec(),
        }
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Wire bytes: `[opcode, params..., 0x7E]`.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.params.len() + 2);
        bytes.push(self.opcode);
        bytes.extend_from_slice(&self.params);
        bytes.push(MESSAGE_TERMINATOR);
        bytes
    }

    // ==================== Brew settings ====================

    pub fn strength(strength: Strength) -> Self {
        Self::new(opcode::STRENGTH, &[strength.value()])
    }

    pub fn cups(cups: Cups) -> Self {
        Self::new(opcode::CUPS, &[cups.value()])
    }

    /// The appliance only knows how to flip the grinder setting.
    pub fn toggle_grind() -> Self {
        Self::new(opcode::TOGGLE_GRIND, &[])
    }

    // ==================== Brewing ====================

    /// Brew with explicit settings.
    ///
    /// The appliance frame also carries a hotplate duration, which is always
    /// sent as the default.
    pub fn brew_on(grind: bool, cups: Cups, strength: Strength) -> Self {
        Self::new(
            opcode::BREW_ON,
            &[
                cups.value(),
                strength.value(),
                DEFAULT_HOTPLATE_MINUTES,
                u8::from(grind),
            ],
        )
    }

    /// Brew with whatever is currently set on the appliance.
    pub fn brew_on_default() -> Self {
        Self::new(opcode::BREW_ON_DEFAULT, &[])
    }

    pub fn brew_off() -> Self {
        Self::new(opcode::BREW_OFF, &[])
    }

    // ==================== Hotplate ====================

    pub fn hotplate_on(minutes: HotplateMinutes) -> Self {
        Self::new(opcode::HOTPLATE_ON, &[minutes.value()])
    }

    pub fn hotplate_off() -> Self {
        Self::new(opcode::HOTPLATE_OFF, &[])
    }
}
