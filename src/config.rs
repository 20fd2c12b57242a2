//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::campaign::tx_power_register;
use crate::error::{FleetError, Result};
use crate::frame::protocol::{NodeId, ResponseTiming};
use crate::telemetry::LogFormat;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How node links are reached
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// One TCP port per node on a gateway host
    Tcp,
    /// Serial ports attached to this host
    Serial,
}

/// A node reachable through a local serial port
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SerialPortEntry {
    pub id: NodeId,
    pub device: String,
}

/// Transport configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    #[serde(default = "default_transport_kind")]
    pub kind: TransportKind,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port_base")]
    pub port_base: u16,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default)]
    pub serial_ports: Vec<SerialPortEntry>,
}

/// Command exchange configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    #[serde(default = "default_per_packet_timeout_ms")]
    pub per_packet_timeout_ms: u64,
}

/// Coverage campaign configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CampaignConfig {
    #[serde(default = "default_first_node")]
    pub first_node: NodeId,

    #[serde(default = "default_node_count")]
    pub node_count: u16,

    #[serde(default = "default_bursts")]
    pub bursts: u16,

    #[serde(default = "default_burst_size")]
    pub burst_size: u16,

    #[serde(default = "default_burst_period")]
    pub burst_period: u16,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_setid_retries")]
    pub setid_retries: u32,

    #[serde(default = "default_power_levels_dbm")]
    pub power_levels_dbm: Vec<i8>,
}

/// Telemetry log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

/// Run log / tracing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,

    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_transport_kind() -> TransportKind { TransportKind::Tcp }
fn default_host() -> String { "experiment".to_string() }
fn default_port_base() -> u16 { 30000 }
fn default_baud_rate() -> u32 { 115200 }

fn default_response_timeout_ms() -> u64 { 500 }
fn default_per_packet_timeout_ms() -> u64 { 10 }

fn default_first_node() -> NodeId { 1 }
fn default_node_count() -> u16 { 256 }
fn default_bursts() -> u16 { 32 }
fn default_burst_size() -> u16 { 128 }
fn default_burst_period() -> u16 { 10 }
fn default_settle_ms() -> u64 { 200 }
fn default_setid_retries() -> u32 { 3 }
fn default_power_levels_dbm() -> Vec<i8> { vec![-30, -20, -10, 0, 10] }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_log_format() -> LogFormat { LogFormat::Csv }
fn default_log_level() -> String { "info".to_string() }

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            host: default_host(),
            port_base: default_port_base(),
            baud_rate: default_baud_rate(),
            serial_ports: Vec::new(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
            per_packet_timeout_ms: default_per_packet_timeout_ms(),
        }
    }
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            first_node: default_first_node(),
            node_count: default_node_count(),
            bursts: default_bursts(),
            burst_size: default_burst_size(),
            burst_period: default_burst_period(),
            settle_ms: default_settle_ms(),
            setid_retries: default_setid_retries(),
            power_levels_dbm: default_power_levels_dbm(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { log_dir: default_log_dir(), format: default_log_format() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { dir: default_log_dir(), level: default_log_level() }
    }
}

impl SessionConfig {
    /// Acknowledgment timing derived from this configuration
    pub fn timing(&self) -> ResponseTiming {
        ResponseTiming {
            base: Duration::from_millis(self.response_timeout_ms),
            per_packet: Duration::from_millis(self.per_packet_timeout_ms),
        }
    }
}

impl CampaignConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use radio_fleet::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Node identities the campaign drives
    ///
    /// With a TCP gateway these are `first_node..first_node + node_count`;
    /// with serial ports they are the configured port ids.
    pub fn node_ids(&self) -> Vec<NodeId> {
        match self.transport.kind {
            TransportKind::Tcp => {
                let first = self.campaign.first_node;
                (0..self.campaign.node_count)
                    .filter_map(|offset| first.checked_add(offset))
                    .collect()
            }
            TransportKind::Serial => self.transport.serial_ports.iter().map(|p| p.id).collect(),
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.transport.host.is_empty() && self.transport.kind == TransportKind::Tcp {
            return Err(invalid("transport host cannot be empty"));
        }

        if self.transport.kind == TransportKind::Serial {
            if self.transport.serial_ports.is_empty() {
                return Err(invalid("serial transport needs at least one serial_ports entry"));
            }

            let mut seen = HashSet::new();
            for port in &self.transport.serial_ports {
                if port.device.is_empty() {
                    return Err(invalid(format!("serial port of node {} has an empty device", port.id)));
                }
                if !seen.insert(port.id) {
                    return Err(invalid(format!("node {} is listed twice in serial_ports", port.id)));
                }
            }
        }

        if self.session.response_timeout_ms == 0 || self.session.response_timeout_ms > 10000 {
            return Err(invalid("response_timeout_ms must be between 1 and 10000"));
        }

        if self.session.per_packet_timeout_ms > 1000 {
            return Err(invalid("per_packet_timeout_ms must be between 0 and 1000"));
        }

        if self.campaign.node_count == 0 {
            return Err(invalid("node_count must be greater than 0"));
        }

        if self.campaign.bursts == 0 {
            return Err(invalid("bursts must be greater than 0"));
        }

        if self.campaign.burst_size == 0 {
            return Err(invalid("burst_size must be greater than 0"));
        }

        if self.campaign.setid_retries == 0 {
            return Err(invalid("setid_retries must be greater than 0"));
        }

        if self.campaign.settle_ms > 60000 {
            return Err(invalid("settle_ms must be between 0 and 60000"));
        }

        if self.campaign.power_levels_dbm.is_empty() {
            return Err(invalid("power_levels_dbm cannot be empty"));
        }

        for &dbm in &self.campaign.power_levels_dbm {
            if tx_power_register(dbm).is_none() {
                return Err(invalid(format!("no PA register for {} dBm", dbm)));
            }
        }

        if self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty"));
        }

        if self.logging.dir.is_empty() {
            return Err(invalid("logging dir cannot be empty"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("logging level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}

fn invalid(msg: impl std::fmt::Display) -> FleetError {
    FleetError::Config(toml::de::Error::custom(msg))
}
