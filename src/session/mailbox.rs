//! Single-slot handoff of acknowledgments from the link reader to the
//! command issuer.
//!
//! The slot is bounded to one entry with last-write-wins eviction: a new
//! acknowledgment replaces any unclaimed one. The issuer drains the slot
//! before each command so a stale acknowledgment is not mistaken for the
//! answer to the next command.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::frame::protocol::Ack;

/// Response mailbox of one session
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<Option<Ack>>,
    notify: Notify,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an acknowledgment, evicting any unclaimed one
    ///
    /// Never blocks.
    pub fn put(&self, ack: Ack) {
        if let Some(stale) = self.lock().replace(ack) {
            tracing::debug!("Evicting unclaimed ack for opcode 0x{:02X}", stale.opcode);
        }
        self.notify.notify_one();
    }

    /// Remove and return the pending acknowledgment, if any
    pub fn drain(&self) -> Option<Ack> {
        self.lock().take()
    }

    /// Wait for an acknowledgment
    ///
    /// # Returns
    ///
    /// * `Option<Ack>` - The acknowledgment, or `None` once `timeout` elapsed
    pub async fn take(&self, timeout: Duration) -> Option<Ack> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking the slot so a concurrent put
            // cannot slip between the check and the wait
            let notified = self.notify.notified();

            if let Some(ack) = self.drain() {
                return Some(ack);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.drain();
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Ack>> {
        // The slot holds plain data, a poisoned lock is still consistent
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
