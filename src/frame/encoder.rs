//! # Frame Encoder
//!
//! Serializes commands and frames to wire bytes.

use super::crc::crc8_maxim;
use super::protocol::*;

/// Encode any frame into its wire bytes
///
/// # Returns
///
/// * `Vec<u8>` - `SYNC, TYPE, LEN, ARGS..., CRC`
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    encode_parts(frame.frame_type, &frame.args)
}

/// Encode a command into a complete frame
///
/// # Examples
///
/// ```
/// use radio_fleet::frame::encoder::encode_command;
/// use radio_fleet::frame::protocol::Command;
///
/// let bytes = encode_command(&Command::resetrx());
/// assert_eq!(&bytes[..3], &[0x80, 0xC2, 0x00]);
/// assert_eq!(bytes.len(), 4);
/// ```
pub fn encode_command(command: &Command) -> Vec<u8> {
    encode_parts(command.opcode(), command.args())
}

/// Encode an acknowledgment frame as a node would send it
pub fn encode_ack(ack: &Ack) -> Vec<u8> {
    encode_parts(ack.opcode, &[ack.status])
}

/// Encode a telemetry broadcast as a node would send it
///
/// `rssi_raw` is the signed half-dBm offset byte (see
/// [`decode_rssi`](super::decoder::decode_rssi)).
pub fn encode_telemetry(src: u16, burst: u16, pktid: u16, rssi_raw: u8) -> Vec<u8> {
    let mut args = Vec::with_capacity(TELEMETRY_PAYLOAD_SIZE);
    args.extend_from_slice(&src.to_be_bytes());
    args.extend_from_slice(&burst.to_be_bytes());
    args.extend_from_slice(&pktid.to_be_bytes());
    args.push(rssi_raw);
    encode_parts(FRAMETYPE_TELEMETRY, &args)
}

fn encode_parts(frame_type: u8, args: &[u8]) -> Vec<u8> {
    debug_assert!(args.len() <= MAX_ARGS);

    let mut bytes = Vec::with_capacity(FRAME_OVERHEAD + args.len());
    bytes.push(SYNC_BYTE);
    bytes.push(frame_type);
    bytes.push(args.len() as u8);
    bytes.extend_from_slice(args);

    // CRC over Type + Len + Args
    let crc = crc8_maxim(&bytes[1..]);
    bytes.push(crc);

    bytes
}
