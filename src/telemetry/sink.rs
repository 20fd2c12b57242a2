//! Telemetry sink contract and the record it receives.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::frame::protocol::{NodeId, TelemetryPacket};

/// One passively observed radio reception
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    /// Reception time on the host
    pub time: DateTime<Utc>,

    /// Transmitting node
    pub src: u16,

    /// Receiving node (the session that read the frame)
    pub dst: NodeId,

    /// Burst identifier
    pub burst: u16,

    /// Packet index within the burst
    pub pktid: u16,

    /// Received signal strength in dBm
    pub rssi: f64,
}

impl TelemetryRecord {
    /// Stamp a decoded packet with its receiver and the current time
    pub fn received(packet: &TelemetryPacket, dst: NodeId) -> Self {
        Self {
            time: Utc::now(),
            src: packet.src,
            dst,
            burst: packet.burst,
            pktid: packet.pktid,
            rssi: packet.rssi,
        }
    }
}

/// Seconds since the Unix epoch with microsecond resolution
pub fn epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}

/// Append-only destination of telemetry records
///
/// Reader tasks of several sessions append concurrently. Each call must
/// persist exactly one whole record.
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySink: Send + Sync {
    fn append(&self, record: &TelemetryRecord) -> Result<()>;
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    records: Mutex<Vec<TelemetryRecord>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record appended so far, in append order
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl TelemetrySink for MemoryTelemetry {
    fn append(&self, record: &TelemetryRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn packet(pktid: u16) -> TelemetryPacket {
        TelemetryPacket { src: 3, burst: 1, pktid, rssi: -72.5 }
    }

    #[test]
    fn test_received_sets_dst() {
        let record = TelemetryRecord::received(&packet(8), 21);
        assert_eq!(record.src, 3);
        assert_eq!(record.dst, 21);
        assert_eq!(record.pktid, 8);
    }

    #[test]
    fn test_epoch_seconds() {
        let time = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        assert!((epoch_seconds(time) - 1_700_000_000.25).abs() < 1e-6);
    }

    #[test]
    fn test_memory_sink_concurrent_appends() {
        let sink = Arc::new(MemoryTelemetry::new());

        let handles: Vec<_> = (0..4u16)
            .map(|dst| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for pktid in 0..100 {
                        sink.append(&TelemetryRecord::received(&packet(pktid), dst)).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let records = sink.records();
        assert_eq!(records.len(), 400);
        for dst in 0..4u16 {
            let ids: Vec<u16> = records.iter().filter(|r| r.dst == dst).map(|r| r.pktid).collect();
            assert_eq!(ids, (0..100).collect::<Vec<_>>(), "per-writer order for dst {}", dst);
        }
    }
}
