//! # Error Types
//!
//! Custom error types for Radio Fleet using `thiserror`.
//!
//! Two layers are kept apart:
//! - [`FleetError`] covers setup and infrastructure failures (configuration,
//!   transports, log files, invalid frame construction).
//! - [`CommandError`] is the reason a single command exchange with a node
//!   failed. It is returned as a value and never aborts a run.

use thiserror::Error;

/// Main error type for Radio Fleet
#[derive(Debug, Error)]
pub enum FleetError {
    /// Link protocol errors (bad frame construction, unknown command, ...)
    #[error("Link protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Telemetry serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Radio Fleet
pub type Result<T> = std::result::Result<T, FleetError>;

/// Failure of one command exchange with one node
#[derive(Debug, Error)]
pub enum CommandError {
    /// No acknowledgment arrived before the deadline
    #[error("Timeout")]
    Timeout,

    /// The acknowledgment answers a different command
    #[error("response opcode mismatch: expected 0x{expected:02X}, got 0x{got:02X}")]
    OpcodeMismatch { expected: u8, got: u8 },

    /// The node received our frame with a bad checksum
    #[error("BAD CRC")]
    BadCrc,

    /// The node rejected the command with a status code
    #[error("NACK:{0:x}")]
    Nack(u8),

    /// The command frame could not be written to the transport
    #[error("transport write failed: {0}")]
    Transport(#[source] std::io::Error),

    /// The command could not be built from the given arguments
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The task running the command died before reporting
    #[error("aborted: {0}")]
    Aborted(String),
}

impl From<FleetError> for CommandError {
    fn from(err: FleetError) -> Self {
        CommandError::InvalidCommand(err.to_string())
    }
}
