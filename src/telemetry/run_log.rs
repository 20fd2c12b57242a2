//! Event log of a fleet run.
//!
//! Two append-only files in the log directory:
//! - `errors.log`: one line per failed command or removed node
//! - `sends.log`: one CSV line per triggered burst
//!
//! A single `RunLog` is created by the owner of the run and handed to the
//! fan-out executor and the campaign. The files are closed when the last
//! owner drops it.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use tracing::warn;

use super::sink::epoch_seconds;
use crate::error::Result;
use crate::frame::protocol::NodeId;

/// Header of `sends.log`
pub const SENDS_HEADER: &str = "time, src, burstid, burstsize, extralen";

#[derive(Debug)]
pub struct RunLog {
    errors: Option<Mutex<File>>,
    sends: Option<Mutex<File>>,
}

impl RunLog {
    /// Open (or create) `errors.log` and `sends.log` under `dir`
    ///
    /// # Errors
    ///
    /// Returns error if the directory or a file cannot be created
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let errors = OpenOptions::new().create(true).append(true).open(dir.join("errors.log"))?;

        let sends_path = dir.join("sends.log");
        let sends_is_new = !sends_path.exists();
        let mut sends = OpenOptions::new().create(true).append(true).open(sends_path)?;
        if sends_is_new {
            writeln!(sends, "{}", SENDS_HEADER)?;
        }

        Ok(Self {
            errors: Some(Mutex::new(errors)),
            sends: Some(Mutex::new(sends)),
        })
    }

    /// A log that drops every entry
    pub fn discard() -> Self {
        Self { errors: None, sends: None }
    }

    /// Record a failure on `node` while running `command`
    pub fn log_error(&self, node: NodeId, command: &str, reason: &str) {
        let line = format!(
            "t:{:.6}, N{}, error executing {}: {}",
            epoch_seconds(Utc::now()),
            node,
            command,
            reason
        );
        Self::append(&self.errors, &line);
    }

    /// Record that `src` was asked to transmit burst `burst`
    pub fn log_send(&self, src: NodeId, burst: u16, burst_size: u16, extra_len: u8) {
        let line = format!(
            "{:.6}, {}, {}, {}, {}",
            epoch_seconds(Utc::now()),
            src,
            burst,
            burst_size,
            extra_len
        );
        Self::append(&self.sends, &line);
    }

    fn append(file: &Option<Mutex<File>>, line: &str) {
        let Some(file) = file else { return };

        let mut file = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
            warn!("Failed to write run log entry: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_files() {
        let dir = TempDir::new().unwrap();
        let log = RunLog::open(dir.path()).unwrap();

        log.log_send(4, 1, 128, 0);
        log.log_error(4, "cmpid", "Timeout");
        drop(log);

        let sends = fs::read_to_string(dir.path().join("sends.log")).unwrap();
        let lines: Vec<&str> = sends.lines().collect();
        assert_eq!(lines[0], SENDS_HEADER);
        assert!(lines[1].ends_with(", 4, 1, 128, 0"), "got: {}", lines[1]);

        let errors = fs::read_to_string(dir.path().join("errors.log")).unwrap();
        assert!(errors.contains("N4, error executing cmpid: Timeout"));
    }

    #[test]
    fn test_reopen_keeps_single_header() {
        let dir = TempDir::new().unwrap();
        RunLog::open(dir.path()).unwrap().log_send(1, 1, 16, 0);
        RunLog::open(dir.path()).unwrap().log_send(2, 1, 16, 0);

        let sends = fs::read_to_string(dir.path().join("sends.log")).unwrap();
        assert_eq!(sends.lines().filter(|l| *l == SENDS_HEADER).count(), 1);
        assert_eq!(sends.lines().count(), 3);
    }

    #[test]
    fn test_discard_writes_nothing() {
        let log = RunLog::discard();
        log.log_error(1, "setid", "Timeout");
        log.log_send(1, 1, 1, 0);
    }
}
