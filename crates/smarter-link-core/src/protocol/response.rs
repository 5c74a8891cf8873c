//! Frame decoding for appliance replies.

use crate::error::ProtocolError;
use crate::types::StatusSnapshot;

use super::{ack_code, opcode, COFFEE_DEVICE_TYPE, MESSAGE_TERMINATOR};

/// Shortest status frame that carries every field we read.
const STATUS_FRAME_MIN_LEN: usize = 6;

const ACK_FRAME_MIN_LEN: usize = 2;

/// `[0x03, code, 0x7E]`
const ACK_FRAME_LEN: usize = 3;

const DISCOVERY_REPLY_MIN_LEN: usize = 4;

// Status byte 1 bit layout
const CARAFE_DETECTED: u8 = 1 << 0;
const GRIND_SELECTED: u8 = 1 << 1;
const GRIND_IN_PROGRESS: u8 = 1 << 3;
const WATER_PUMP_IN_PROGRESS: u8 = 1 << 4;
const HOTPLATE_ON: u8 = 1 << 6;

/// What kind of reply a buffer holds, judged by its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Acknowledgement,
    Status,
    Unrecognized,
}

/// Outcome carried by an acknowledgement frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    Success,
    NoCarafe,
    Other(u8),
}

/// Classify an inbound buffer. Empty and unknown buffers are `Unrecognized`.
pub fn classify_frame(frame: &[u8]) -> FrameKind {
    match frame.first() {
        Some(&opcode::ACKNOWLEDGEMENT_REPLY) => FrameKind::Acknowledgement,
        Some(&opcode::STATUS_REPLY) => FrameKind::Status,
        _ => FrameKind::Unrecognized,
    }
}

/// Decode the result code of an acknowledgement frame.
pub fn decode_acknowledgement(frame: &[u8]) -> Result<Acknowledgement, ProtocolError> {
    expect_opcode(frame, opcode::ACKNOWLEDGEMENT_REPLY)?;

    let code = *frame.get(1).ok_or(ProtocolError::TooShort {
        kind: "acknowledgement",
        expected: ACK_FRAME_MIN_LEN,
        actual: frame.len(),
    })?;

    Ok(match code {
        ack_code::SUCCESS => Acknowledgement::Success,
        ack_code::NO_CARAFE => Acknowledgement::NoCarafe,
        other => Acknowledgement::Other(other),
    })
}

/// Decode a status frame into a snapshot.
pub fn decode_status(frame: &[u8]) -> Result<StatusSnapshot, ProtocolError> {
    expect_opcode(frame, opcode::STATUS_REPLY)?;

    if frame.len() < STATUS_FRAME_MIN_LEN {
        return Err(ProtocolError::TooShort {
            kind: "status",
            expected: STATUS_FRAME_MIN_LEN,
            actual: frame.len(),
        });
    }

    let flags = frame[1];

    Ok(StatusSnapshot {
        is_brewing: flags & (GRIND_IN_PROGRESS | WATER_PUMP_IN_PROGRESS) != 0,
        is_carafe_detected: flags & CARAFE_DETECTED != 0,
        is_grind_selected: flags & GRIND_SELECTED != 0,
        is_hotplate_on: flags & HOTPLATE_ON != 0,
        water_level: frame[2] & 0x0F,
        strength: frame[4] & 0x03,
        cups: frame[5] & 0x0F,
    })
}

/// Split one read buffer into frames.
///
/// Acknowledgements have a fixed three-byte layout and are peeled off the
/// front, so an ack and a status frame arriving in one segment are both seen.
/// Whatever remains is taken as a single frame.
pub fn split_frames(buf: &[u8]) -> Vec<&[u8]> {
    let mut frames = Vec::new();
    let mut rest = buf;

    while rest.len() > ACK_FRAME_LEN
        && rest[0] == opcode::ACKNOWLEDGEMENT_REPLY
        && rest[ACK_FRAME_LEN - 1] == MESSAGE_TERMINATOR
    {
        let (frame, tail) = rest.split_at(ACK_FRAME_LEN);
        frames.push(frame);
        rest = tail;
    }

    if !rest.is_empty() {
        frames.push(rest);
    }
    frames
}

/// Whether a UDP datagram is a discovery reply from a coffee machine.
pub fn is_discovery_reply(datagram: &[u8]) -> bool {
    datagram.len() >= DISCOVERY_REPLY_MIN_LEN
        && datagram[0] == opcode::DISCOVERY_REPLY
        && datagram[1] == COFFEE_DEVICE_TYPE
        && datagram[3] == MESSAGE_TERMINATOR
}

fn expect_opcode(frame: &[u8], expected: u8) -> Result<(), ProtocolError> {
    match frame.first() {
        Some(&op) if op == expected => Ok(()),
        Some(&op) => Err(ProtocolError::UnexpectedOpcode(op)),
        None => Err(ProtocolError::TooShort {
            kind: "empty",
            expected: 1,
            actual: 0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_frame() {
        assert_eq!(classify_frame(&[0x03, 0x00, 0x7E]), FrameKind::Acknowledgement);
        assert_eq!(classify_frame(&[0x32, 0, 0, 0, 0, 0]), FrameKind::Status);
        assert_eq!(classify_frame(&[0x99, 0x7E]), FrameKind::Unrecognized);
        assert_eq!(classify_frame(&[]), FrameKind::Unrecognized);
    }

    #[test]
    fn test_decode_acknowledgement() {
        assert_eq!(
            decode_acknowledgement(&[0x03, 0x00, 0x7E]),
            Ok(Acknowledgement::Success)
        );
        assert_eq!(
            decode_acknowledgement(&[0x03, 0x05, 0x7E]),
            Ok(Acknowledgement::NoCarafe)
        );
        assert_eq!(
            decode_acknowledgement(&[0x03, 0x01, 0x7E]),
            Ok(Acknowledgement::Other(0x01))
        );
        assert!(decode_acknowledgement(&[0x03]).is_err());
    }

    #[test]
    fn test_decode_status_example_frame() {
        let status = decode_status(&[0x32, 0x1B, 0x04, 0x00, 0x02, 0x07]).unwrap();

        assert!(status.is_carafe_detected);
        assert!(status.is_grind_selected);
        assert!(status.is_brewing);
        assert!(!status.is_hotplate_on);
        assert_eq!(status.water_level, 4);
        assert_eq!(status.strength, 2);
        assert_eq!(status.cups, 7);
    }

    #[test]
    fn test_decode_status_individual_bits() {
        let pump_only = decode_status(&[0x32, 0x10, 0, 0, 0, 0, 0x7E]).unwrap();
        assert!(pump_only.is_brewing);
        assert!(!pump_only.is_carafe_detected);

        let hotplate = decode_status(&[0x32, 0x40, 0, 0, 0, 0, 0x7E]).unwrap();
        assert!(hotplate.is_hotplate_on);
        assert!(!hotplate.is_brewing);

        // Unread bits and high nibbles are masked out
        let noisy = decode_status(&[0x32, 0xA4, 0xF9, 0xFF, 0xFE, 0xFC]).unwrap();
        assert!(!noisy.is_brewing);
        assert!(!noisy.is_carafe_detected);
        assert_eq!(noisy.water_level, 9);
        assert_eq!(noisy.strength, 2);
        assert_eq!(noisy.cups, 12);
    }

    #[test]
    fn test_decode_status_rejects_short_frames() {
        assert_eq!(
            decode_status(&[0x32, 0x1B, 0x04]),
            Err(ProtocolError::TooShort {
                kind: "status",
                expected: 6,
                actual: 3
            })
        );
        assert_eq!(
            decode_status(&[0x03, 0, 0, 0, 0, 0]),
            Err(ProtocolError::UnexpectedOpcode(0x03))
        );
    }

    #[test]
    fn test_split_frames() {
        let ack_then_status = [0x03, 0x00, 0x7E, 0x32, 0x1B, 0x04, 0x00, 0x02, 0x07, 0x7E];
        assert_eq!(
            split_frames(&ack_then_status),
            vec![&ack_then_status[..3], &ack_then_status[3..]]
        );

        let two_acks = [0x03, 0x00, 0x7E, 0x03, 0x05, 0x7E];
        assert_eq!(split_frames(&two_acks), vec![&two_acks[..3], &two_acks[3..]]);

        let status = [0x32, 0x1B, 0x04, 0x00, 0x02, 0x07, 0x7E];
        assert_eq!(split_frames(&status), vec![&status[..]]);

        // No terminator where an ack would end: left whole
        let odd = [0x03, 0x00, 0x00, 0x7E];
        assert_eq!(split_frames(&odd), vec![&odd[..]]);

        assert!(split_frames(&[]).is_empty());
    }

    #[test]
    fn test_is_discovery_reply() {
        assert!(is_discovery_reply(&[0x65, 0x02, 0x00, 0x7E]));
        assert!(is_discovery_reply(&[0x65, 0x02, 0x11, 0x7E, 0x00]));
        assert!(!is_discovery_reply(&[0x65, 0x03, 0x00, 0x7E]));
        assert!(!is_discovery_reply(&[0x64, 0x02, 0x00, 0x7E]));
        assert!(!is_discovery_reply(&[0x65, 0x02, 0x00, 0x00]));
        assert!(!is_discovery_reply(&[0x65, 0x02, 0x7E]));
    }
}
