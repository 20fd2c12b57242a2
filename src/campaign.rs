//! # Coverage Campaign
//!
//! Measures radio coverage between every pair of nodes.
//!
//! Each burst round picks a transmit power, then lets every node transmit a
//! burst in turn while all others listen and report what they receive as
//! telemetry. Between turns all receivers are reset.
//!
//! ```text
//! init:  setid (retried) per node ── settle
//! run:   resetrx* ── settle
//!        for each burst b:
//!            settxpow* ── settle
//!            for each node n:
//!                cmpid (repair: setid + settxpow)
//!                send(b) ── settle ── resetrx* ── settle
//!
//! * = fan-out over all active nodes
//! ```

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::CampaignConfig;
use crate::error::{FleetError, Result};
use crate::fleet::Fleet;
use crate::frame::protocol::{BurstParams, NodeId};
use crate::session::{NodeOp, NodeSession};
use crate::telemetry::RunLog;

/// Known power amplifier settings: (output power in dBm, PA register)
const PA_TABLE: [(i8, u8); 5] = [(10, 0xC2), (0, 0x50), (-10, 0x27), (-20, 0x0F), (-30, 0x03)];

/// PA register value for an output power, if the radio supports it
pub fn tx_power_register(dbm: i8) -> Option<u8> {
    PA_TABLE
        .iter()
        .find(|(level, _)| *level == dbm)
        .map(|&(_, register)| register)
}

/// Predefined campaign shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
    /// 256 nodes from id 1, 32 bursts of 256 packets
    Allnodes,
    /// 16 nodes from id 101, 5 bursts of 16384 packets
    Longburst,
}

impl Preset {
    pub fn apply(self, config: &mut CampaignConfig) {
        match self {
            Preset::Allnodes => {
                config.first_node = 1;
                config.node_count = 256;
                config.bursts = 32;
                config.burst_size = 256;
            }
            Preset::Longburst => {
                config.first_node = 101;
                config.node_count = 16;
                config.bursts = 5;
                config.burst_size = 16384;
            }
        }
    }
}

/// What a finished campaign did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CampaignSummary {
    /// Nodes removed during bring-up
    pub removed: usize,
    /// Burst rounds completed
    pub rounds: u16,
    /// Bursts acknowledged by their transmitter
    pub sends_ok: u32,
    /// Bursts that failed
    pub sends_failed: u32,
    /// Nodes whose identity had to be restored
    pub repairs: u32,
}

/// Coverage campaign over a fleet
#[derive(Debug)]
pub struct Campaign {
    fleet: Fleet,
    config: CampaignConfig,
    registers: Vec<u8>,
    run_log: Arc<RunLog>,
}

impl Campaign {
    /// # Errors
    ///
    /// Returns error if a configured power level has no PA register or the
    /// campaign has no power levels
    pub fn new(fleet: Fleet, config: CampaignConfig, run_log: Arc<RunLog>) -> Result<Self> {
        let registers = config
            .power_levels_dbm
            .iter()
            .map(|&dbm| {
                tx_power_register(dbm)
                    .ok_or_else(|| FleetError::Protocol(format!("no PA register for {} dBm", dbm)))
            })
            .collect::<Result<Vec<_>>>()?;

        if registers.is_empty() {
            return Err(FleetError::Protocol("campaign needs at least one power level".to_string()));
        }

        Ok(Self { fleet, config, registers, run_log })
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    /// Bring up every node, then let the links settle
    ///
    /// # Returns
    ///
    /// * `usize` - Number of nodes removed from the fleet
    pub async fn init(&mut self) -> usize {
        let removed = self.fleet.bring_up(self.config.setid_retries).await;
        info!("Active nodes: {:?}", self.fleet.ids());
        self.settle().await;
        removed.len()
    }

    /// Run every burst round
    pub async fn run(&self) -> CampaignSummary {
        let mut summary = CampaignSummary::default();

        self.fleet.broadcast(&NodeOp::ResetRx).await;
        self.settle().await;

        for burst in 1..=self.config.bursts {
            let register = self.register_for(burst);
            info!("Burst {}/{}: PA register 0x{:02X}", burst, self.config.bursts, register);

            self.fleet.broadcast(&NodeOp::SetTxPow(register)).await;
            self.settle().await;

            for session in self.fleet.sessions() {
                if self.ensure_identity(session, register).await {
                    summary.repairs += 1;
                }

                if self.trigger(session, burst).await {
                    summary.sends_ok += 1;
                } else {
                    summary.sends_failed += 1;
                }
                self.settle().await;

                self.fleet.broadcast(&NodeOp::ResetRx).await;
                self.settle().await;
            }

            summary.rounds = burst;
        }

        info!(
            "Campaign done: {} rounds, {} bursts sent, {} failed, {} repairs",
            summary.rounds, summary.sends_ok, summary.sends_failed, summary.repairs
        );
        summary
    }

    /// Bring up the fleet and run the campaign
    pub async fn execute(&mut self) -> CampaignSummary {
        let removed = self.init().await;
        CampaignSummary { removed, ..self.run().await }
    }

    /// Halt every session
    pub async fn shutdown(&self) {
        self.fleet.halt().await;
    }

    fn register_for(&self, burst: u16) -> u8 {
        let index = usize::from(burst.saturating_sub(1)) % self.registers.len();
        self.registers[index]
    }

    /// Check the node's identity and restore it if needed
    ///
    /// # Returns
    ///
    /// * `bool` - Whether a repair was attempted
    async fn ensure_identity(&self, session: &NodeSession, register: u8) -> bool {
        let Err(e) = session.cmpid().await else {
            return false;
        };
        self.failed(session.id(), "cmpid", &e);

        // A rebooted node lost both identity and power setting
        if let Err(e) = session.setid().await {
            self.failed(session.id(), "setid", &e);
        }
        if let Err(e) = session.settxpow(register).await {
            self.failed(session.id(), "settxpow", &e);
        }
        true
    }

    async fn trigger(&self, session: &NodeSession, burst: u16) -> bool {
        let params = BurstParams::new(burst)
            .with_len(self.config.burst_size)
            .with_period(self.config.burst_period);

        self.run_log.log_send(session.id(), burst, params.burst_len, params.payload);

        match session.send(params).await {
            Ok(()) => true,
            Err(e) => {
                self.failed(session.id(), "send", &e);
                false
            }
        }
    }

    fn failed(&self, node: NodeId, command: &str, e: &crate::error::CommandError) {
        warn!("Node {}: {} failed [{}]", node, command, e);
        self.run_log.log_error(node, command, &e.to_string());
    }

    async fn settle(&self) {
        tokio::time::sleep(self.config.settle()).await;
    }
}
