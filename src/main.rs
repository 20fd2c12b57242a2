//! # Radio Fleet
//!
//! Runs the radio coverage campaign over a fleet of nodes.
//!
//! Every node transmits bursts in turn at a sweep of power levels while all
//! other nodes listen; what each node receives is logged as telemetry.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use radio_fleet::campaign::{Campaign, Preset};
use radio_fleet::config::Config;
use radio_fleet::fleet::Fleet;
use radio_fleet::session::NodeSession;
use radio_fleet::telemetry::{FileTelemetryLog, RunLog, TelemetrySink};
use radio_fleet::transport;

/// Name of the tracing output file in the log directory
const OUTPUT_LOG: &str = "output.log";

#[derive(Debug, Parser)]
#[command(version, about = "Radio coverage campaign over a node fleet")]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Predefined campaign shape, overriding the configured one
    #[arg(short, long, value_enum)]
    preset: Option<Preset>,
}

/// Main entry point for Radio Fleet
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration and apply the preset
///    - Set up logging (stdout and `output.log`)
///    - Open the telemetry and run logs
///    - Connect to every node; unreachable nodes are skipped
///
/// 2. **Campaign**
///    - Bring up identities, then run every burst round
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Shutdown**
///    - Halt all sessions and close their transports
///
/// # Errors
///
/// Returns error if:
/// - Configuration is invalid
/// - Log directories cannot be created
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let _guard = init_tracing(&config)?;
    info!("Radio Fleet v{} starting...", env!("CARGO_PKG_VERSION"));

    let run_log = Arc::new(RunLog::open(&config.logging.dir).context("failed to open run log")?);
    let sink: Arc<dyn TelemetrySink> = Arc::new(
        FileTelemetryLog::open(&config.telemetry.log_dir, config.telemetry.format)
            .context("failed to open telemetry log")?,
    );

    let timing = config.session.timing();
    let mut sessions = Vec::new();
    for id in config.node_ids() {
        match transport::connect(&config.transport, id).await {
            Ok(link) => sessions.push(NodeSession::start(id, link, sink.clone(), timing)),
            Err(e) => {
                warn!("Node {}: cannot connect: {}", id, e);
                run_log.log_error(id, "connect", &e.to_string());
            }
        }
    }
    info!("Connected to {} nodes", sessions.len());

    let fleet = Fleet::new(sessions, run_log.clone());
    let mut campaign = Campaign::new(fleet, config.campaign.clone(), run_log)?;

    tokio::select! {
        summary = campaign.execute() => {
            info!("Summary: {:?}", summary);
        }

        // Handle Ctrl+C for graceful shutdown
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    campaign.shutdown().await;
    info!("All sessions halted");
    Ok(())
}

/// Load the configuration file (if any) and apply the preset
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(preset) = cli.preset {
        preset.apply(&mut config.campaign);
    }

    config.validate()?;
    Ok(config)
}

/// Log to stdout and to `output.log` in the log directory
///
/// `RUST_LOG` overrides the configured level. The returned guard flushes the
/// file writer when dropped.
fn init_tracing(config: &Config) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.logging.dir)
        .with_context(|| format!("failed to create log directory {}", config.logging.dir))?;

    let appender = tracing_appender::rolling::never(&config.logging.dir, OUTPUT_LOG);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log level")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["radio-fleet"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.preset.is_none());

        let config = load_config(&cli).unwrap();
        assert_eq!(config.campaign.node_count, 256);
    }

    #[test]
    fn test_cli_preset_overrides_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[campaign]\nfirst_node = 7\nbursts = 2").unwrap();

        let cli = Cli::try_parse_from([
            "radio-fleet",
            "--config",
            file.path().to_str().unwrap(),
            "--preset",
            "longburst",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.campaign.first_node, 101, "preset wins over the file");
        assert_eq!(config.campaign.bursts, 5);
        assert_eq!(config.campaign.burst_size, 16384);
        assert_eq!(config.node_ids().len(), 16);
    }

    #[test]
    fn test_cli_rejects_unknown_preset() {
        assert!(Cli::try_parse_from(["radio-fleet", "--preset", "everything"]).is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let cli = Cli::try_parse_from(["radio-fleet", "--config", "/nonexistent/fleet.toml"]).unwrap();
        assert!(load_config(&cli).is_err());
    }
}
