//! # Node Session
//!
//! Runtime pairing of one node identity with its transport.
//!
//! Starting a session splits the transport in two:
//! - a reader task owns the read half for the whole session lifetime, turns
//!   bytes into frames with a [`LinkReader`] and dispatches them
//!   (acknowledgments to the mailbox, telemetry to the sink, boot notices to
//!   the log)
//! - the command side owns the write half and runs one request/response
//!   exchange at a time
//!
//! ```text
//!            ┌──────────── NodeSession ────────────┐
//! execute ──►│ write half ─────────────► transport │
//!    ▲       │                                     │
//!    └─ take─│ mailbox ◄── reader task ◄─ read half│
//!            │                 └──► telemetry sink │
//!            └─────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::mailbox::Mailbox;
use super::op::NodeOp;
use crate::error::CommandError;
use crate::frame::decoder::classify;
use crate::frame::encoder::encode_command;
use crate::frame::protocol::{
    AckStatus, BurstParams, Command, Frame, FrameKind, Modulation, NodeId, ResponseTiming,
};
use crate::link::{LinkReader, ReaderStats};
use crate::telemetry::{TelemetryRecord, TelemetrySink};
use crate::transport::Transport;

/// Outcome of one command exchange
pub type CommandResult = std::result::Result<(), CommandError>;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Size of a single transport read
const READ_CHUNK: usize = 64;

/// Command and telemetry session with one node
pub struct NodeSession {
    id: NodeId,
    writer: tokio::sync::Mutex<BoxedWriter>,
    mailbox: Arc<Mailbox>,
    timing: ResponseTiming,
    shutdown: watch::Sender<bool>,
    reader_task: Mutex<Option<JoinHandle<ReaderStats>>>,
}

impl std::fmt::Debug for NodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSession")
            .field("id", &self.id)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl NodeSession {
    /// Start a session and its reader task
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `id` - Identity of the node behind `transport`
    /// * `transport` - Byte stream to the node
    /// * `sink` - Destination of the telemetry this node receives
    /// * `timing` - Acknowledgment timeouts
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use radio_fleet::frame::protocol::ResponseTiming;
    /// use radio_fleet::session::NodeSession;
    /// use radio_fleet::telemetry::MemoryTelemetry;
    /// use radio_fleet::transport::tcp::connect_tcp;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let stream = connect_tcp("experiment", 30000, 7).await?;
    ///     let session = NodeSession::start(7, stream, Arc::new(MemoryTelemetry::new()), ResponseTiming::default());
    ///
    ///     session.setid().await?;
    ///     session.halt().await;
    ///     Ok(())
    /// }
    /// ```
    pub fn start<T: Transport>(
        id: NodeId,
        transport: T,
        sink: Arc<dyn TelemetrySink>,
        timing: ResponseTiming,
    ) -> Self {
        let (reader, writer) = tokio::io::split(transport);
        let mailbox = Arc::new(Mailbox::new());
        let (shutdown, stop) = watch::channel(false);

        let task = tokio::spawn(read_loop(id, Box::new(reader), mailbox.clone(), sink, stop));
        debug!("Node {}: session started", id);

        Self {
            id,
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            mailbox,
            timing,
            shutdown,
            reader_task: Mutex::new(Some(task)),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Whether the reader task is still processing frames
    pub fn is_running(&self) -> bool {
        self.reader_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map_or(false, |task| !task.is_finished())
    }

    /// Send a command and wait for its acknowledgment
    ///
    /// Only one exchange runs at a time per session; concurrent callers
    /// queue on the write half.
    ///
    /// # Errors
    ///
    /// - `Transport` if the frame cannot be written
    /// - `Timeout` if no acknowledgment arrives in time
    /// - `OpcodeMismatch` if the acknowledgment answers another command
    /// - `BadCrc` / `Nack` if the node rejected the command
    pub async fn execute(&self, command: &Command) -> CommandResult {
        let mut writer = self.writer.lock().await;

        if let Some(stale) = self.mailbox.drain() {
            debug!("Node {}: discarding stale ack for opcode 0x{:02X}", self.id, stale.opcode);
        }

        writer.write_all(&encode_command(command)).await.map_err(CommandError::Transport)?;
        writer.flush().await.map_err(CommandError::Transport)?;
        debug!("Node {}: sent {}", self.id, command);

        let timeout = command.response_timeout(&self.timing);
        let ack = self.mailbox.take(timeout).await.ok_or(CommandError::Timeout)?;

        if ack.opcode != command.opcode() {
            return Err(CommandError::OpcodeMismatch { expected: command.opcode(), got: ack.opcode });
        }

        match ack.status() {
            AckStatus::Ok => Ok(()),
            AckStatus::BadCrc => Err(CommandError::BadCrc),
            AckStatus::Nack(code) => Err(CommandError::Nack(code)),
        }
    }

    /// Run a named operation against this node
    pub async fn apply(&self, op: &NodeOp) -> CommandResult {
        let command = op.to_command(self.id)?;
        self.execute(&command).await
    }

    /// Assert this session's identity onto the node
    pub async fn setid(&self) -> CommandResult {
        self.execute(&Command::setid(self.id)).await
    }

    /// Check that the node still holds this session's identity
    pub async fn cmpid(&self) -> CommandResult {
        self.execute(&Command::cmpid(self.id)).await
    }

    pub async fn resetrx(&self) -> CommandResult {
        self.execute(&Command::resetrx()).await
    }

    /// Set the carrier frequency word (24 bits)
    pub async fn setfreq(&self, freq: u32) -> CommandResult {
        let command = Command::setfreq(freq)?;
        self.execute(&command).await
    }

    pub async fn setchanbw(&self, exponent: u8, mantissa: u8) -> CommandResult {
        self.execute(&Command::setchanbw(exponent, mantissa)).await
    }

    pub async fn setdrate(&self, exponent: u8, mantissa: u8) -> CommandResult {
        self.execute(&Command::setdrate(exponent, mantissa)).await
    }

    pub async fn setmod(&self, modulation: Modulation) -> CommandResult {
        self.execute(&Command::setmod(modulation)).await
    }

    pub async fn settxpow(&self, register: u8) -> CommandResult {
        self.execute(&Command::settxpow(register)).await
    }

    /// Trigger a burst; the acknowledgment only comes once it is over
    pub async fn send(&self, burst: BurstParams) -> CommandResult {
        self.execute(&Command::send(burst)).await
    }

    /// Run `setid` until it succeeds, at most `attempts` times
    ///
    /// # Errors
    ///
    /// Returns the failure of the last attempt
    pub async fn bring_up(&self, attempts: u32) -> CommandResult {
        let attempts = attempts.max(1);
        let mut last = CommandError::Timeout;

        for attempt in 1..=attempts {
            match self.setid().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Node {}: setid attempt {}/{} failed [{}]", self.id, attempt, attempts, e);
                    last = e;
                }
            }
        }

        Err(last)
    }

    /// Stop the reader task and close the transport
    ///
    /// No frame is processed once this returns. A command already waiting
    /// for its acknowledgment runs into its own timeout.
    ///
    /// # Returns
    ///
    /// * `Option<ReaderStats>` - Reader counters, if the task was still owned
    pub async fn halt(&self) -> Option<ReaderStats> {
        let _ = self.shutdown.send(true);

        let task = self
            .reader_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let stats = match task {
            Some(task) => task.await.ok(),
            None => None,
        };

        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!("Node {}: closing transport failed: {}", self.id, e);
        }

        info!("Node {}: session halted", self.id);
        stats
    }
}

/// Reader task body: runs until stopped, EOF, or a fatal read error
async fn read_loop(
    id: NodeId,
    mut reader: BoxedReader,
    mailbox: Arc<Mailbox>,
    sink: Arc<dyn TelemetrySink>,
    mut stop: watch::Receiver<bool>,
) -> ReaderStats {
    let mut link = LinkReader::new();
    let mut buf = [0u8; READ_CHUNK];

    loop {
        tokio::select! {
            biased;

            // Fires on halt and when the session is dropped
            _ = stop.changed() => break,

            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    warn!("Node {}: link closed by remote", id);
                    break;
                }
                Ok(n) => {
                    for frame in link.push(&buf[..n]) {
                        dispatch(id, &frame, &mailbox, sink.as_ref());
                    }
                }
                Err(e) if is_transient(&e) => {}
                Err(e) => {
                    error!("Node {}: link read failed: {}", id, e);
                    break;
                }
            }
        }
    }

    let stats = link.stats();
    debug!("Node {}: reader stopped ({:?})", id, stats);
    stats
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
    )
}

/// Route one validated frame
///
/// An acknowledgment is delivered even when no command is waiting; a late
/// answer to a timed-out command can therefore be taken by the next one if
/// it arrives after the drain.
fn dispatch(id: NodeId, frame: &Frame, mailbox: &Mailbox, sink: &dyn TelemetrySink) {
    match classify(frame) {
        Ok(FrameKind::Ack(ack)) => mailbox.put(ack),
        Ok(FrameKind::Boot) => info!("Node {} BOOTED", id),
        Ok(FrameKind::Telemetry(packet)) => {
            let record = TelemetryRecord::received(&packet, id);
            if let Err(e) = sink.append(&record) {
                warn!("Node {}: failed to log telemetry: {}", id, e);
            }
        }
        Ok(FrameKind::Ignored) => {
            debug!("Node {}: ignoring frame type 0x{:02X} ({} args)", id, frame.frame_type, frame.args.len());
        }
        Err(e) => debug!("Node {}: dropping frame: {}", id, e),
    }
}
