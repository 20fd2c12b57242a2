//! # Frame Decoder
//!
//! Validates raw frames and interprets them (acknowledgments, boot
//! notifications, telemetry broadcasts).

use super::crc::crc8_maxim;
use super::protocol::*;
use crate::error::{FleetError, Result};

/// Check whether a TYPE byte can start a frame
///
/// Known command opcodes, telemetry and boot frames are plausible. Anything
/// else means the reader lost synchronization.
pub fn is_known_type(frame_type: u8) -> bool {
    frame_type == FRAMETYPE_TELEMETRY
        || frame_type == FRAMETYPE_BOOT
        || CommandKind::from_opcode(frame_type).is_some()
}

/// Check the trailing CRC of a complete frame
///
/// # Arguments
///
/// * `frame` - Complete frame bytes (sync, type, len, args, crc)
///
/// # Returns
///
/// * `bool` - true only when the recomputed CRC matches the last byte exactly
pub fn validate(frame: &[u8]) -> bool {
    match frame {
        [_, body @ .., crc] if !body.is_empty() => crc8_maxim(body) == *crc,
        _ => false,
    }
}

/// Decode a complete frame
///
/// # Errors
///
/// Returns error if:
/// - Frame is too short
/// - Sync byte is incorrect
/// - LEN exceeds the maximum or disagrees with the frame size
/// - CRC check fails
pub fn decode_frame(frame: &[u8]) -> Result<Frame> {
    if frame.len() < FRAME_OVERHEAD {
        return Err(FleetError::Protocol("Frame too short".to_string()));
    }

    if frame[0] != SYNC_BYTE {
        return Err(FleetError::Protocol(format!("Invalid sync byte: 0x{:02X}", frame[0])));
    }

    let len = frame[2] as usize;
    if len > MAX_ARGS {
        return Err(FleetError::Protocol(format!("Length {} exceeds maximum {}", len, MAX_ARGS)));
    }

    if frame.len() != len + FRAME_OVERHEAD {
        return Err(FleetError::Protocol(format!(
            "Frame size mismatch: expected {} bytes, got {}",
            len + FRAME_OVERHEAD,
            frame.len()
        )));
    }

    if !validate(frame) {
        return Err(FleetError::Protocol(format!(
            "CRC mismatch: expected 0x{:02X}, got 0x{:02X}",
            crc8_maxim(&frame[1..frame.len() - 1]),
            frame[frame.len() - 1]
        )));
    }

    Frame::new(frame[1], frame[3..3 + len].to_vec())
}

/// Decode the signed half-dBm RSSI byte into dBm
///
/// The byte is a two's complement count of half dB relative to -70 dBm.
pub fn decode_rssi(raw: u8) -> f64 {
    f64::from(raw as i8) / 2.0 - 70.0
}

/// Decode a telemetry payload
///
/// # Errors
///
/// Returns error if the payload is shorter than 7 bytes
pub fn decode_telemetry(args: &[u8]) -> Result<TelemetryPacket> {
    if args.len() < TELEMETRY_PAYLOAD_SIZE {
        return Err(FleetError::Protocol(format!(
            "Telemetry payload too short: {} bytes",
            args.len()
        )));
    }

    Ok(TelemetryPacket {
        src: u16::from_be_bytes([args[0], args[1]]),
        burst: u16::from_be_bytes([args[2], args[3]]),
        pktid: u16::from_be_bytes([args[4], args[5]]),
        rssi: decode_rssi(args[6]),
    })
}

/// Interpret a validated frame
///
/// Only single-byte frames with a catalog opcode are acknowledgments; a
/// catalog opcode with another length is ignored.
///
/// # Errors
///
/// Returns error if a telemetry frame carries a truncated payload
pub fn classify(frame: &Frame) -> Result<FrameKind> {
    match frame.frame_type {
        FRAMETYPE_BOOT => Ok(FrameKind::Boot),
        FRAMETYPE_TELEMETRY => decode_telemetry(&frame.args).map(FrameKind::Telemetry),
        opcode if CommandKind::from_opcode(opcode).is_some() && frame.args.len() == 1 => {
            Ok(FrameKind::Ack(Ack { opcode, status: frame.args[0] }))
        }
        _ => Ok(FrameKind::Ignored),
    }
}
