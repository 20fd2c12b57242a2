//! # Fan-out Executor
//!
//! Runs one operation on many sessions at once.
//!
//! Every session gets its own task, so a node that never answers only delays
//! the join, never the other nodes' exchanges. The executor always returns
//! one entry per session, in the order the sessions were given.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{CommandError, Result};
use crate::frame::protocol::NodeId;
use crate::session::{CommandResult, NodeOp, NodeSession};
use crate::telemetry::RunLog;

/// Outcome of the operation on one session
#[derive(Debug)]
pub struct FanOutEntry {
    pub node: NodeId,
    pub command: &'static str,
    pub outcome: CommandResult,
    /// When the exchange with this node finished
    pub finished_at: DateTime<Utc>,
}

impl FanOutEntry {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Per-session outcomes of one fan-out, in session order
#[derive(Debug, Default)]
pub struct FanOutReport {
    pub entries: Vec<FanOutEntry>,
}

impl FanOutReport {
    /// Entries whose command failed
    pub fn failures(&self) -> impl Iterator<Item = &FanOutEntry> {
        self.entries.iter().filter(|entry| !entry.is_ok())
    }

    pub fn all_ok(&self) -> bool {
        self.entries.iter().all(FanOutEntry::is_ok)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Concurrent command executor
#[derive(Debug, Clone)]
pub struct FanOut {
    run_log: Arc<RunLog>,
}

impl FanOut {
    /// Create an executor reporting failures to `run_log`
    pub fn new(run_log: Arc<RunLog>) -> Self {
        Self { run_log }
    }

    /// Run `op` on every session concurrently and wait for all of them
    ///
    /// Failures are logged and reported, never propagated: the report always
    /// holds exactly one entry per session.
    pub async fn run(&self, sessions: &[Arc<NodeSession>], op: &NodeOp) -> FanOutReport {
        let command = op.name();

        let handles: Vec<_> = sessions
            .iter()
            .map(|session| {
                let node = session.id();
                let session = session.clone();
                let op = op.clone();
                let run_log = self.run_log.clone();

                let handle = tokio::spawn(async move {
                    let outcome = session.apply(&op).await;
                    if let Err(e) = &outcome {
                        warn!("Node {}: {} failed [{}]", node, command, e);
                        run_log.log_error(node, command, &e.to_string());
                    }
                    (outcome, Utc::now())
                });

                (node, handle)
            })
            .collect();

        let mut entries = Vec::with_capacity(handles.len());
        for (node, handle) in handles {
            let (outcome, finished_at) = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let reason = if e.is_panic() { "task panicked" } else { "task cancelled" };
                    warn!("Node {}: {} aborted ({})", node, command, reason);
                    self.run_log.log_error(node, command, reason);
                    (Err(CommandError::Aborted(reason.to_string())), Utc::now())
                }
            };

            entries.push(FanOutEntry { node, command, outcome, finished_at });
        }

        let report = FanOutReport { entries };
        debug!(
            "Fan-out {} on {} sessions: {} failed",
            command,
            report.len(),
            report.failures().count()
        );
        report
    }

    /// Run a command given by name and numeric fields
    ///
    /// # Errors
    ///
    /// Returns error if the name or fields do not describe a valid command;
    /// nothing is sent in that case
    pub async fn run_named(
        &self,
        sessions: &[Arc<NodeSession>],
        name: &str,
        args: &[u32],
    ) -> Result<FanOutReport> {
        let op = NodeOp::parse(name, args)?;
        Ok(self.run(sessions, &op).await)
    }
}
