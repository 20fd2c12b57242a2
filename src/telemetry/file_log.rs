//! Per-node telemetry files.
//!
//! Every receiving node gets its own append-only file in the log directory
//! (`node<dst>.csv` or `node<dst>.jsonl`). Existing files are appended to, so
//! consecutive runs accumulate in the same log.
//!
//! Session readers run on the async runtime and must never wait on the disk.
//! `append` only queues the record; a dedicated writer thread owns the files,
//! writes each record as one whole line and flushes whenever the queue runs
//! empty.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::sink::{epoch_seconds, TelemetryRecord, TelemetrySink};
use crate::error::{FleetError, Result};
use crate::frame::protocol::NodeId;

/// CSV header written at the top of a new file
pub const CSV_HEADER: &str = "time, src, dst, burstid, pktid, rssi";

/// On-disk record format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Csv,
    Jsonl,
}

impl LogFormat {
    fn extension(self) -> &'static str {
        match self {
            LogFormat::Csv => "csv",
            LogFormat::Jsonl => "jsonl",
        }
    }
}

fn node_path(dir: &Path, format: LogFormat, dst: NodeId) -> PathBuf {
    dir.join(format!("node{}.{}", dst, format.extension()))
}

#[derive(Debug)]
enum Message {
    Record(TelemetryRecord),
    Flush(oneshot::Sender<()>),
}

/// Telemetry sink writing one file per receiving node
///
/// Dropping the log drains the queue and waits for the writer thread.
#[derive(Debug)]
pub struct FileTelemetryLog {
    dir: PathBuf,
    format: LogFormat,
    sender: Option<mpsc::UnboundedSender<Message>>,
    worker: Option<JoinHandle<()>>,
}

impl FileTelemetryLog {
    /// Create a log writing into `dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or the writer thread
    /// cannot be started
    pub fn open<P: AsRef<Path>>(dir: P, format: LogFormat) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let writer = NodeFiles { dir: dir.clone(), format, files: HashMap::new() };
        let worker = std::thread::Builder::new()
            .name("telemetry-writer".to_string())
            .spawn(move || writer.run(receiver))?;

        Ok(Self { dir, format, sender: Some(sender), worker: Some(worker) })
    }

    /// Path of the file holding receptions of node `dst`
    pub fn path_for(&self, dst: NodeId) -> PathBuf {
        node_path(&self.dir, self.format, dst)
    }

    /// Block until every record queued so far is on disk
    ///
    /// Must not be called from async code.
    ///
    /// # Errors
    ///
    /// Returns error if the writer thread has stopped
    pub fn flush(&self) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.queue(Message::Flush(done))?;
        wait.blocking_recv().map_err(|_| writer_stopped())
    }

    fn queue(&self, message: Message) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or_else(writer_stopped)?
            .send(message)
            .map_err(|_| writer_stopped())
    }
}

impl TelemetrySink for FileTelemetryLog {
    /// Queue one record; never touches the disk
    fn append(&self, record: &TelemetryRecord) -> Result<()> {
        self.queue(Message::Record(record.clone()))
    }
}

impl Drop for FileTelemetryLog {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain and exit
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Telemetry writer thread panicked");
            }
        }
    }
}

fn writer_stopped() -> FleetError {
    FleetError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "telemetry writer stopped"))
}

/// Open files of the writer thread
struct NodeFiles {
    dir: PathBuf,
    format: LogFormat,
    files: HashMap<NodeId, BufWriter<File>>,
}

impl NodeFiles {
    fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = receiver.blocking_recv() {
            self.handle(message);

            // Batch whatever else is already queued before hitting the disk
            while let Ok(message) = receiver.try_recv() {
                self.handle(message);
            }
            self.flush_all();
        }

        self.flush_all();
        debug!("Telemetry writer stopped");
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Record(record) => {
                if let Err(e) = self.write(&record) {
                    warn!("Node {}: failed to log telemetry: {}", record.dst, e);
                }
            }
            Message::Flush(done) => {
                self.flush_all();
                let _ = done.send(());
            }
        }
    }

    fn write(&mut self, record: &TelemetryRecord) -> Result<()> {
        let line = format_record(self.format, record)?;

        let writer = match self.files.entry(record.dst) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(open_node_file(&self.dir, self.format, record.dst)?)
            }
        };

        writeln!(writer, "{}", line)?;
        Ok(())
    }

    fn flush_all(&mut self) {
        for (dst, writer) in &mut self.files {
            if let Err(e) = writer.flush() {
                warn!("Node {}: failed to flush telemetry log: {}", dst, e);
            }
        }
    }
}

fn open_node_file(dir: &Path, format: LogFormat, dst: NodeId) -> Result<BufWriter<File>> {
    let path = node_path(dir, format, dst);
    let is_new = !path.exists();

    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let mut writer = BufWriter::new(file);

    if is_new && format == LogFormat::Csv {
        writeln!(writer, "{}", CSV_HEADER)?;
    }

    debug!("Opened telemetry log {}", path.display());
    Ok(writer)
}

fn format_record(format: LogFormat, record: &TelemetryRecord) -> Result<String> {
    match format {
        LogFormat::Csv => Ok(format!(
            "{:.6}, {}, {}, {}, {}, {:.6}",
            epoch_seconds(record.time),
            record.src,
            record.dst,
            record.burst,
            record.pktid,
            record.rssi
        )),
        LogFormat::Jsonl => Ok(serde_json::to_string(record)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::protocol::TelemetryPacket;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(dst: NodeId, pktid: u16) -> TelemetryRecord {
        let packet = TelemetryPacket { src: 5, burst: 2, pktid, rssi: -60.5 };
        TelemetryRecord::received(&packet, dst)
    }

    #[test]
    fn test_csv_header_and_line() {
        let dir = TempDir::new().unwrap();
        let log = FileTelemetryLog::open(dir.path(), LogFormat::Csv).unwrap();

        log.append(&record(7, 1)).unwrap();
        log.append(&record(7, 2)).unwrap();
        log.flush().unwrap();

        let contents = fs::read_to_string(log.path_for(7)).unwrap();
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].ends_with(", 5, 7, 2, 1, -60.500000"), "got: {}", lines[1]);
    }

    #[test]
    fn test_existing_file_is_appended() {
        let dir = TempDir::new().unwrap();
        {
            let log = FileTelemetryLog::open(dir.path(), LogFormat::Csv).unwrap();
            log.append(&record(3, 1)).unwrap();
        }

        let log = FileTelemetryLog::open(dir.path(), LogFormat::Csv).unwrap();
        log.append(&record(3, 2)).unwrap();
        log.flush().unwrap();

        let contents = fs::read_to_string(log.path_for(3)).unwrap();
        assert_eq!(contents.lines().filter(|l| *l == CSV_HEADER).count(), 1);
        assert_eq!(contents.lines().count(), 3);
    }

    #[test]
    fn test_jsonl_records() {
        let dir = TempDir::new().unwrap();
        let log = FileTelemetryLog::open(dir.path(), LogFormat::Jsonl).unwrap();
        log.append(&record(9, 4)).unwrap();
        log.flush().unwrap();

        let contents = fs::read_to_string(dir.path().join("node9.jsonl")).unwrap();
        let value: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();

        assert_eq!(value["dst"], 9);
        assert_eq!(value["pktid"], 4);
        assert_eq!(value["rssi"], -60.5);
    }

    #[test]
    fn test_concurrent_appends_keep_whole_lines() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(FileTelemetryLog::open(dir.path(), LogFormat::Csv).unwrap());

        let handles: Vec<_> = (0..4u16)
            .map(|pktid_base| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        log.append(&record(1, pktid_base * 100 + i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        log.flush().unwrap();

        let contents = fs::read_to_string(log.path_for(1)).unwrap();
        let data_lines: Vec<&str> = contents.lines().skip(1).collect();
        assert_eq!(data_lines.len(), 200);
        for line in data_lines {
            assert_eq!(line.split(", ").count(), 6, "malformed line: {}", line);
        }
    }

    #[test]
    fn test_append_does_not_touch_disk() {
        let dir = TempDir::new().unwrap();
        let log = FileTelemetryLog::open(dir.path().join("telemetry"), LogFormat::Csv).unwrap();

        // The directory vanishes: the caller is not affected, the writer
        // thread reports the failure
        fs::remove_dir_all(dir.path().join("telemetry")).unwrap();
        assert!(log.append(&record(2, 1)).is_ok());
        assert!(log.flush().is_ok());
        assert!(!log.path_for(2).exists());
    }

    #[test]
    fn test_drop_writes_pending_records() {
        let dir = TempDir::new().unwrap();
        let path = {
            let log = FileTelemetryLog::open(dir.path(), LogFormat::Csv).unwrap();
            for pktid in 0..10 {
                log.append(&record(4, pktid)).unwrap();
            }
            log.path_for(4)
        };

        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 11, "header plus every queued record");
    }

    #[tokio::test]
    async fn test_append_from_async_reader() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(FileTelemetryLog::open(dir.path(), LogFormat::Jsonl).unwrap());

        let sink = log.clone();
        tokio::spawn(async move {
            for pktid in 0..20 {
                sink.append(&record(6, pktid)).unwrap();
            }
        })
        .await
        .unwrap();

        let flushed = log.clone();
        tokio::task::spawn_blocking(move || flushed.flush()).await.unwrap().unwrap();

        let contents = fs::read_to_string(log.path_for(6)).unwrap();
        assert_eq!(contents.lines().count(), 20);
    }
}
