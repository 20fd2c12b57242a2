//! # Frame Codec Module
//!
//! Implementation of the node link framing protocol.
//!
//! This module handles:
//! - Command catalog and argument validation
//! - Frame encoding (`SYNC TYPE LEN ARGS CRC`)
//! - CRC-8/MAXIM checksum calculation
//! - Frame validation and interpretation (acks, boot, telemetry)

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;
