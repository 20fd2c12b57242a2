//! The active set of node sessions.

use std::sync::Arc;

use tracing::{error, info};

use crate::fanout::{FanOut, FanOutReport};
use crate::frame::protocol::NodeId;
use crate::session::{NodeOp, NodeSession};
use crate::telemetry::RunLog;

/// Sessions taking part in a run
///
/// Sessions that fail bring-up are removed and halted; the remaining ones
/// keep their relative order.
#[derive(Debug)]
pub struct Fleet {
    sessions: Vec<Arc<NodeSession>>,
    fanout: FanOut,
    run_log: Arc<RunLog>,
}

impl Fleet {
    pub fn new(sessions: Vec<NodeSession>, run_log: Arc<RunLog>) -> Self {
        Self {
            sessions: sessions.into_iter().map(Arc::new).collect(),
            fanout: FanOut::new(run_log.clone()),
            run_log,
        }
    }

    pub fn sessions(&self) -> &[Arc<NodeSession>] {
        &self.sessions
    }

    /// Identities of the active sessions, in order
    pub fn ids(&self) -> Vec<NodeId> {
        self.sessions.iter().map(|session| session.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Assert every session's identity, one node at a time
    ///
    /// A session whose `setid` fails `attempts` times in a row is logged,
    /// halted and removed from the fleet.
    ///
    /// # Returns
    ///
    /// * `Vec<NodeId>` - Identities of the removed sessions
    pub async fn bring_up(&mut self, attempts: u32) -> Vec<NodeId> {
        let mut active = Vec::with_capacity(self.sessions.len());
        let mut removed = Vec::new();

        for session in std::mem::take(&mut self.sessions) {
            match session.bring_up(attempts).await {
                Ok(()) => active.push(session),
                Err(e) => {
                    error!("Node {}: removed after {} setid attempts [{}]", session.id(), attempts, e);
                    self.run_log.log_error(session.id(), "setid", &e.to_string());
                    session.halt().await;
                    removed.push(session.id());
                }
            }
        }

        self.sessions = active;
        info!("Bring-up done: {} active, {} removed", self.sessions.len(), removed.len());
        removed
    }

    /// Run `op` on every active session concurrently
    pub async fn broadcast(&self, op: &NodeOp) -> FanOutReport {
        self.fanout.run(&self.sessions, op).await
    }

    /// Stop every session
    pub async fn halt(&self) {
        for session in &self.sessions {
            session.halt().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::protocol::ResponseTiming;
    use crate::telemetry::MemoryTelemetry;
    use crate::transport::mocks::FakeNode;

    fn fleet_of(nodes: Vec<(NodeId, tokio::io::DuplexStream)>) -> Fleet {
        let sink = Arc::new(MemoryTelemetry::new());
        let sessions = nodes
            .into_iter()
            .map(|(id, transport)| NodeSession::start(id, transport, sink.clone(), ResponseTiming::default()))
            .collect();
        Fleet::new(sessions, Arc::new(RunLog::discard()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_bring_up_removes_silent_node() {
        let (t1, _n1) = FakeNode::acking();
        let (t2, n2) = FakeNode::silent();
        let (t3, _n3) = FakeNode::acking();
        let mut fleet = fleet_of(vec![(1, t1), (2, t2), (3, t3)]);

        let removed = fleet.bring_up(3).await;

        assert_eq!(removed, vec![2]);
        assert_eq!(fleet.ids(), vec![1, 3], "survivors keep their order");
        assert_eq!(n2.received().len(), 3, "silent node gets exactly 3 setid attempts");
    }

    #[tokio::test]
    async fn test_broadcast_and_halt() {
        let (t1, n1) = FakeNode::acking();
        let (t2, n2) = FakeNode::acking();
        let fleet = fleet_of(vec![(1, t1), (2, t2)]);

        let report = fleet.broadcast(&NodeOp::ResetRx).await;
        assert!(report.all_ok());
        assert_eq!(n1.received().len(), 1);
        assert_eq!(n2.received().len(), 1);

        fleet.halt().await;
        assert!(fleet.sessions().iter().all(|session| !session.is_running()));
    }
}
