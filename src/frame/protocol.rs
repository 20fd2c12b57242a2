//! # Link Protocol Constants and Types
//!
//! Core definitions for the node link protocol.
//!
//! Wire layout of every frame:
//!
//! ```text
//! SYNC(0x80) TYPE LEN ARGS[LEN] CRC
//! ```
//!
//! `LEN` never exceeds [`MAX_ARGS`]. The CRC covers `TYPE`, `LEN` and `ARGS`.

use std::fmt;
use std::time::Duration;

use crate::error::{FleetError, Result};

/// Frame sync byte (always 0x80)
pub const SYNC_BYTE: u8 = 0x80;

/// Boot notification frame type
pub const FRAMETYPE_BOOT: u8 = 0xF0;

/// Telemetry broadcast frame type
pub const FRAMETYPE_TELEMETRY: u8 = 0xFF;

/// Maximum number of argument bytes in a frame
pub const MAX_ARGS: usize = 10;

/// Frame overhead: sync(1) + type(1) + len(1) + crc(1)
pub const FRAME_OVERHEAD: usize = 4;

/// Telemetry payload size: src(2) + burst(2) + pktid(2) + rssi(1)
pub const TELEMETRY_PAYLOAD_SIZE: usize = 7;

/// Acknowledgment status: command accepted
pub const STATUS_OK: u8 = 0x00;

/// Acknowledgment status: the node saw a bad CRC on our frame
pub const STATUS_BAD_CRC: u8 = 0x03;

/// Node identity as carried by `setid`/`cmpid` (16 bits on the wire)
pub type NodeId = u16;

/// Largest value the 24-bit `setfreq` word can hold
pub const MAX_FREQUENCY_WORD: u32 = 0x00FF_FFFF;

/// Default number of packets in a burst
pub const DEFAULT_BURST_LEN: u16 = 128;

/// Default inter-packet period of a burst (node ticks)
pub const DEFAULT_BURST_PERIOD: u16 = 10;

/// Command catalog
///
/// Each entry has a fixed opcode and a fixed argument count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    SetId,
    CmpId,
    ResetRx,
    SetFreq,
    SetChanBw,
    SetDrate,
    SetMod,
    SetTxPow,
    Send,
}

impl CommandKind {
    /// Every command in the catalog, in opcode order
    pub const ALL: [CommandKind; 9] = [
        CommandKind::SetId,
        CommandKind::CmpId,
        CommandKind::ResetRx,
        CommandKind::SetFreq,
        CommandKind::SetChanBw,
        CommandKind::SetDrate,
        CommandKind::SetMod,
        CommandKind::SetTxPow,
        CommandKind::Send,
    ];

    /// Wire opcode (frame TYPE byte)
    pub const fn opcode(self) -> u8 {
        match self {
            CommandKind::SetId => 0xC0,
            CommandKind::CmpId => 0xC1,
            CommandKind::ResetRx => 0xC2,
            CommandKind::SetFreq => 0xC3,
            CommandKind::SetChanBw => 0xC4,
            CommandKind::SetDrate => 0xC5,
            CommandKind::SetMod => 0xC6,
            CommandKind::SetTxPow => 0xC7,
            CommandKind::Send => 0xC8,
        }
    }

    /// Number of argument bytes the command must carry
    pub const fn arg_count(self) -> usize {
        match self {
            CommandKind::SetId => 2,
            CommandKind::CmpId => 2,
            CommandKind::ResetRx => 0,
            CommandKind::SetFreq => 3,
            CommandKind::SetChanBw => 2,
            CommandKind::SetDrate => 2,
            CommandKind::SetMod => 1,
            CommandKind::SetTxPow => 1,
            CommandKind::Send => 7,
        }
    }

    /// Catalog name
    pub const fn name(self) -> &'static str {
        match self {
            CommandKind::SetId => "setid",
            CommandKind::CmpId => "cmpid",
            CommandKind::ResetRx => "resetrx",
            CommandKind::SetFreq => "setfreq",
            CommandKind::SetChanBw => "setchanbw",
            CommandKind::SetDrate => "setdrate",
            CommandKind::SetMod => "setmod",
            CommandKind::SetTxPow => "settxpow",
            CommandKind::Send => "send",
        }
    }

    /// Look a command up by its catalog name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Look a command up by its opcode
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.opcode() == opcode)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Radio modulation accepted by `setmod`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    Fsk2,
    Gfsk,
    Ask,
    Msk,
}

impl Modulation {
    /// Register value sent to the node
    pub const fn code(self) -> u8 {
        match self {
            Modulation::Fsk2 => 0,
            Modulation::Gfsk => 1,
            Modulation::Ask => 2,
            Modulation::Msk => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Modulation::Fsk2),
            1 => Some(Modulation::Gfsk),
            2 => Some(Modulation::Ask),
            3 => Some(Modulation::Msk),
            _ => None,
        }
    }

    /// Parse the conventional name ("2FSK", "GFSK", "ASK", "MSK")
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "2FSK" => Some(Modulation::Fsk2),
            "GFSK" => Some(Modulation::Gfsk),
            "ASK" => Some(Modulation::Ask),
            "MSK" => Some(Modulation::Msk),
            _ => None,
        }
    }
}

/// Parameters of a `send` burst
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstParams {
    /// Burst identifier stamped into every telemetry frame
    pub burst_id: u16,

    /// Number of packets to transmit
    pub burst_len: u16,

    /// Inter-packet period
    pub period: u16,

    /// Extra payload byte
    pub payload: u8,
}

impl BurstParams {
    /// Burst with the default length, period and payload
    pub fn new(burst_id: u16) -> Self {
        Self {
            burst_id,
            burst_len: DEFAULT_BURST_LEN,
            period: DEFAULT_BURST_PERIOD,
            payload: 0,
        }
    }

    pub fn with_len(mut self, burst_len: u16) -> Self {
        self.burst_len = burst_len;
        self
    }

    pub fn with_period(mut self, period: u16) -> Self {
        self.period = period;
        self
    }
}

/// Timing used to bound how long a command waits for its acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseTiming {
    /// Wait applied to every command
    pub base: Duration,

    /// Extra wait per packet of a `send` burst
    pub per_packet: Duration,
}

impl Default for ResponseTiming {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            per_packet: Duration::from_millis(10),
        }
    }
}

/// A command ready to be encoded
///
/// The argument count always matches the catalog entry of `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    args: Vec<u8>,
}

impl Command {
    /// Create a command from raw argument bytes
    ///
    /// # Errors
    ///
    /// Returns error if `args.len()` differs from the catalog argument count
    pub fn new(kind: CommandKind, args: Vec<u8>) -> Result<Self> {
        if args.len() != kind.arg_count() {
            return Err(FleetError::Protocol(format!(
                "{} expects {} argument bytes, got {}",
                kind,
                kind.arg_count(),
                args.len()
            )));
        }

        Ok(Self { kind, args })
    }

    /// Create a command from its catalog name
    ///
    /// # Errors
    ///
    /// Returns error if the name is unknown or the argument count is wrong
    pub fn from_name(name: &str, args: Vec<u8>) -> Result<Self> {
        let kind = CommandKind::from_name(name)
            .ok_or_else(|| FleetError::Protocol(format!("{} is not a valid command", name)))?;
        Self::new(kind, args)
    }

    pub fn setid(id: NodeId) -> Self {
        Self { kind: CommandKind::SetId, args: id.to_be_bytes().to_vec() }
    }

    pub fn cmpid(id: NodeId) -> Self {
        Self { kind: CommandKind::CmpId, args: id.to_be_bytes().to_vec() }
    }

    pub fn resetrx() -> Self {
        Self { kind: CommandKind::ResetRx, args: Vec::new() }
    }

    /// Set the carrier frequency word (24 bits, big-endian)
    ///
    /// # Errors
    ///
    /// Returns error if `freq` does not fit in 24 bits
    pub fn setfreq(freq: u32) -> Result<Self> {
        if freq > MAX_FREQUENCY_WORD {
            return Err(FleetError::Protocol(format!(
                "frequency word 0x{:X} exceeds 24 bits",
                freq
            )));
        }
        let [_, f2, f1, f0] = freq.to_be_bytes();
        Ok(Self { kind: CommandKind::SetFreq, args: vec![f2, f1, f0] })
    }

    pub fn setchanbw(exponent: u8, mantissa: u8) -> Self {
        Self { kind: CommandKind::SetChanBw, args: vec![exponent, mantissa] }
    }

    pub fn setdrate(exponent: u8, mantissa: u8) -> Self {
        Self { kind: CommandKind::SetDrate, args: vec![exponent, mantissa] }
    }

    pub fn setmod(modulation: Modulation) -> Self {
        Self { kind: CommandKind::SetMod, args: vec![modulation.code()] }
    }

    pub fn settxpow(register: u8) -> Self {
        Self { kind: CommandKind::SetTxPow, args: vec![register] }
    }

    pub fn send(burst: BurstParams) -> Self {
        let mut args = Vec::with_capacity(CommandKind::Send.arg_count());
        args.extend_from_slice(&burst.burst_id.to_be_bytes());
        args.extend_from_slice(&burst.burst_len.to_be_bytes());
        args.extend_from_slice(&burst.period.to_be_bytes());
        args.push(burst.payload);
        Self { kind: CommandKind::Send, args }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn opcode(&self) -> u8 {
        self.kind.opcode()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn args(&self) -> &[u8] {
        &self.args
    }

    /// Number of packets a `send` command asks for (0 for other commands)
    pub fn burst_len(&self) -> u16 {
        match self.kind {
            CommandKind::Send => u16::from_be_bytes([self.args[2], self.args[3]]),
            _ => 0,
        }
    }

    /// How long to wait for the acknowledgment of this command
    ///
    /// `send` only acknowledges once the burst is over, so its wait grows
    /// with the burst length.
    pub fn response_timeout(&self, timing: &ResponseTiming) -> Duration {
        timing.base + timing.per_packet * u32::from(self.burst_len())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        for arg in &self.args {
            write!(f, " {:02x}", arg)?;
        }
        Ok(())
    }
}

/// A validated link frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame type
    pub frame_type: u8,

    /// Argument bytes
    pub args: Vec<u8>,
}

impl Frame {
    /// Create a new frame
    ///
    /// # Errors
    ///
    /// Returns error if `args` exceeds [`MAX_ARGS`] (10 bytes)
    pub fn new(frame_type: u8, args: Vec<u8>) -> Result<Self> {
        if args.len() > MAX_ARGS {
            return Err(FleetError::Protocol(format!(
                "Argument count {} exceeds maximum {}",
                args.len(),
                MAX_ARGS
            )));
        }

        Ok(Self { frame_type, args })
    }

    /// LEN field value
    ///
    /// Cannot overflow since args is validated to be ≤ 10 bytes
    pub fn len_field(&self) -> u8 {
        self.args.len() as u8
    }
}

impl From<&Command> for Frame {
    fn from(command: &Command) -> Self {
        Self { frame_type: command.opcode(), args: command.args.clone() }
    }
}

/// Status carried by an acknowledgment frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Ok,
    BadCrc,
    Nack(u8),
}

impl AckStatus {
    pub fn from_byte(status: u8) -> Self {
        match status {
            STATUS_OK => AckStatus::Ok,
            STATUS_BAD_CRC => AckStatus::BadCrc,
            code => AckStatus::Nack(code),
        }
    }
}

/// Acknowledgment of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Opcode of the command being acknowledged
    pub opcode: u8,

    /// Raw status byte
    pub status: u8,
}

impl Ack {
    pub fn status(&self) -> AckStatus {
        AckStatus::from_byte(self.status)
    }
}

/// Decoded telemetry broadcast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryPacket {
    /// Transmitting node
    pub src: u16,

    /// Burst identifier
    pub burst: u16,

    /// Packet index within the burst
    pub pktid: u16,

    /// Received signal strength in dBm
    pub rssi: f64,
}

/// What a validated frame means to the session
#[derive(Debug, Clone, PartialEq)]
pub enum FrameKind {
    /// Acknowledgment of a catalog command
    Ack(Ack),

    /// The node (re)booted
    Boot,

    /// Passive radio reception report
    Telemetry(TelemetryPacket),

    /// Valid frame with no meaning for the session
    Ignored,
}
