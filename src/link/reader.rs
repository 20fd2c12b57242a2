//! Frame reassembly for a single link.
//!
//! The reader is a byte-driven state machine:
//! - `SeekSync`: drop everything until a sync byte
//! - `AwaitType`: the next byte must be a known frame type
//! - `Accumulating`: collect LEN, ARGS and CRC, then validate
//!
//! Every framing error (unknown type, oversized LEN, bad CRC) is recovered
//! locally by going back to `SeekSync`. Nothing is ever requested from the
//! remote side.
//!
//! # Example
//!
//! ```
//! use radio_fleet::frame::encoder::encode_command;
//! use radio_fleet::frame::protocol::Command;
//! use radio_fleet::link::LinkReader;
//!
//! let mut reader = LinkReader::new();
//! let mut bytes = vec![0x13, 0x37];
//! bytes.extend(encode_command(&Command::resetrx()));
//!
//! let frames = reader.push(&bytes);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].frame_type, 0xC2);
//! ```

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::frame::decoder::{is_known_type, validate};
use crate::frame::protocol::{Frame, FRAME_OVERHEAD, MAX_ARGS, SYNC_BYTE};

/// Position of the reader within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Looking for a sync byte
    SeekSync,
    /// Sync seen, waiting for the TYPE byte
    AwaitType,
    /// TYPE accepted, collecting LEN, ARGS and CRC
    Accumulating,
}

/// Counters of what the reader saw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Frames that passed CRC validation
    pub frames: u64,
    /// Candidate frames dropped for a CRC mismatch
    pub crc_errors: u64,
    /// Sync bytes followed by an unknown TYPE
    pub bad_types: u64,
    /// Candidate frames dropped for LEN > 10
    pub oversized: u64,
    /// Bytes discarded while looking for sync
    pub dropped_bytes: u64,
}

/// Reassembles frames from a byte stream
#[derive(Debug)]
pub struct LinkReader {
    state: ReaderState,
    buffer: BytesMut,
    stats: ReaderStats,
}

impl Default for LinkReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkReader {
    pub fn new() -> Self {
        Self {
            state: ReaderState::SeekSync,
            buffer: BytesMut::with_capacity(FRAME_OVERHEAD + MAX_ARGS),
            stats: ReaderStats::default(),
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Feed a chunk of bytes and collect every frame it completes
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        data.iter().filter_map(|&byte| self.push_byte(byte)).collect()
    }

    /// Feed a single byte
    ///
    /// # Returns
    ///
    /// * `Option<Frame>` - A frame if this byte completed a valid one
    pub fn push_byte(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            ReaderState::SeekSync => {
                if byte == SYNC_BYTE {
                    self.buffer.clear();
                    self.buffer.put_u8(byte);
                    self.state = ReaderState::AwaitType;
                } else {
                    self.stats.dropped_bytes += 1;
                }
                None
            }
            ReaderState::AwaitType => {
                if is_known_type(byte) {
                    self.buffer.put_u8(byte);
                    self.state = ReaderState::Accumulating;
                    return None;
                }

                debug!("Unknown frame type 0x{:02X}, resynchronizing", byte);
                self.stats.bad_types += 1;
                self.reset();

                // A sync byte in the TYPE slot may be the start of the next frame
                if byte == SYNC_BYTE {
                    self.push_byte(byte)
                } else {
                    None
                }
            }
            ReaderState::Accumulating => {
                self.buffer.put_u8(byte);

                let len = self.buffer[2] as usize;
                if len > MAX_ARGS {
                    debug!("Frame length {} exceeds maximum {}, dropping", len, MAX_ARGS);
                    self.stats.oversized += 1;
                    self.reset();
                    return None;
                }

                if self.buffer.len() < len + FRAME_OVERHEAD {
                    return None;
                }

                // Copy out and clear so the buffer keeps its allocation
                let frame = if validate(&self.buffer) {
                    self.stats.frames += 1;
                    Some(Frame {
                        frame_type: self.buffer[1],
                        args: self.buffer[3..3 + len].to_vec(),
                    })
                } else {
                    debug!("Discarding frame with bad CRC: {:02X?}", &self.buffer[..]);
                    self.stats.crc_errors += 1;
                    None
                };

                self.reset();
                frame
            }
        }
    }

    /// Drop any partial frame and look for sync again
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ReaderState::SeekSync;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::crc::crc8_maxim;
    use crate::frame::encoder::{encode_ack, encode_command, encode_telemetry};
    use crate::frame::protocol::*;

    #[test]
    fn test_single_frame() {
        let mut reader = LinkReader::new();
        let frames = reader.push(&encode_command(&Command::setid(42)));

        assert_eq!(frames, vec![Frame::from(&Command::setid(42))]);
        assert_eq!(reader.state(), ReaderState::SeekSync);
        assert_eq!(reader.stats().frames, 1);
    }

    #[test]
    fn test_resync_after_noise() {
        let first = encode_ack(&Ack { opcode: 0xC7, status: STATUS_OK });
        let second = encode_telemetry(9, 2, 17, 0x14);

        let mut stream = vec![0x00, 0x13, 0xC0, 0xFF, 0x42];
        stream.extend_from_slice(&first);
        stream.extend_from_slice(&[0x99, 0x80, 0x01, 0x55, 0xAA]);
        stream.extend_from_slice(&second);

        let mut reader = LinkReader::new();
        let frames = reader.push(&stream);

        assert_eq!(frames.len(), 2, "expected exactly two frames");
        assert_eq!(frames[0], Frame::new(0xC7, vec![STATUS_OK]).unwrap());
        assert_eq!(frames[1].frame_type, FRAMETYPE_TELEMETRY);
        assert_eq!(frames[1].args, second[3..10].to_vec());
        assert_eq!(reader.stats().bad_types, 1);
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let bytes = encode_command(&Command::send(BurstParams::new(5)));
        let mut reader = LinkReader::new();

        let mut frames = Vec::new();
        for chunk in bytes.chunks(3) {
            frames.extend(reader.push(chunk));
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].args.len(), 7);
    }

    #[test]
    fn test_unknown_type_resets() {
        let mut reader = LinkReader::new();
        assert!(reader.push_byte(SYNC_BYTE).is_none());
        assert_eq!(reader.state(), ReaderState::AwaitType);

        assert!(reader.push_byte(0x42).is_none());
        assert_eq!(reader.state(), ReaderState::SeekSync);
        assert_eq!(reader.stats().bad_types, 1);
    }

    #[test]
    fn test_double_sync_rearms() {
        let mut stream = vec![SYNC_BYTE];
        stream.extend_from_slice(&encode_command(&Command::resetrx()));

        let mut reader = LinkReader::new();
        assert_eq!(reader.push(&stream).len(), 1);
    }

    #[test]
    fn test_length_guard_recovers() {
        // LEN = 11 is never valid
        let mut oversized = vec![SYNC_BYTE, FRAMETYPE_TELEMETRY, 11];
        oversized.extend_from_slice(&[0u8; 11]);
        oversized.push(crc8_maxim(&oversized[1..]));

        let valid = encode_ack(&Ack { opcode: 0xC2, status: STATUS_OK });

        let mut reader = LinkReader::new();
        let mut stream = oversized;
        stream.extend_from_slice(&valid);
        let frames = reader.push(&stream);

        assert_eq!(frames, vec![Frame::new(0xC2, vec![STATUS_OK]).unwrap()]);
        assert_eq!(reader.stats().oversized, 1);
    }

    #[test]
    fn test_bad_crc_discarded() {
        let mut corrupted = encode_command(&Command::settxpow(0x27));
        corrupted[3] ^= 0x01;
        let valid = encode_command(&Command::settxpow(0x27));

        let mut reader = LinkReader::new();
        let mut stream = corrupted;
        stream.extend_from_slice(&valid);
        let frames = reader.push(&stream);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].args, vec![0x27]);
        assert_eq!(reader.stats().crc_errors, 1);
    }

    #[test]
    fn test_zero_length_frame() {
        let mut reader = LinkReader::new();
        let frames = reader.push(&encode_command(&Command::resetrx()));
        assert_eq!(frames.len(), 1);
        assert!(frames[0].args.is_empty());
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let bytes = encode_command(&Command::setid(1));
        let mut reader = LinkReader::new();
        reader.push(&bytes[..4]);
        assert_eq!(reader.state(), ReaderState::Accumulating);

        reader.reset();
        assert!(reader.push(&bytes[4..]).is_empty());
        assert_eq!(reader.push(&bytes).len(), 1);
    }

    #[test]
    fn test_buffer_keeps_capacity_across_frames() {
        let mut reader = LinkReader::new();
        let initial = reader.buffer.capacity();
        assert!(initial >= FRAME_OVERHEAD + MAX_ARGS);

        for pktid in 0..100 {
            let frames = reader.push(&encode_telemetry(3, 1, pktid, 0));
            assert_eq!(frames.len(), 1);
            assert!(
                reader.buffer.capacity() >= FRAME_OVERHEAD + MAX_ARGS,
                "buffer allocation was handed out with frame {}",
                pktid
            );
        }

        assert_eq!(reader.stats().frames, 100);
    }
}
