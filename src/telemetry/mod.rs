//! # Telemetry Module
//!
//! Handles the passive telemetry log and the run event log.
//!
//! This module handles:
//! - The telemetry sink contract shared by every session reader
//! - Per-node CSV / JSONL telemetry files
//! - The errors / sends event log of a fleet run

pub mod sink;
pub mod file_log;
pub mod run_log;

pub use file_log::{FileTelemetryLog, LogFormat};
pub use run_log::RunLog;
pub use sink::{MemoryTelemetry, TelemetryRecord, TelemetrySink};
