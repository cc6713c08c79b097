//! OBD-II Probe - Main Entry Point
//!
//! Opens an ELM327 adapter and runs one diagnostic pass.

use anyhow::{Context, Result};
use clap::Parser;
use obd_protocol::{mode, EngineConfig, ObdClient, ObdProtocol, Pid};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// PIDs read on every pass when the vehicle supports them
const LIVE_PIDS: &[Pid] = &[
    Pid::RPM,
    Pid::VSS,
    Pid::ECT,
    Pid::IAT,
    Pid::LOAD_PCT,
    Pid::TP,
    Pid::MAF,
    Pid::MAP,
    Pid::FUEL_LEVEL,
    Pid::VPWR,
];

/// Query an OBD-II adapter: identity, protocol, supported PIDs, live values
/// and trouble codes.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Serial device, overrides the configuration
    #[arg(short, long)]
    device: Option<String>,
    /// Baud rate, overrides the configuration
    #[arg(short, long)]
    baud: Option<u32>,
    /// ELM protocol number (0 = automatic)
    #[arg(short, long)]
    protocol: Option<u8>,
    /// Report values in imperial units
    #[arg(long)]
    imperial: bool,
    /// Clear stored trouble codes after reading them
    #[arg(long)]
    clear_codes: bool,
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Apply command line overrides and re-check the result
fn apply_overrides(cli: &Cli, mut config: EngineConfig) -> Result<EngineConfig> {
    if let Some(device) = cli.device.clone() {
        config.device = device;
    }
    if let Some(baud) = cli.baud {
        config.baud_rate = baud;
    }
    config.imperial_units |= cli.imperial;
    config.validate().context("Invalid command line override")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config =
        EngineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let config = apply_overrides(&cli, config)?;

    init_logging(&config.log_level);
    info!("=== OBD-II Probe v{} ===", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli, config).await {
        error!("Probe failed: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli, config: EngineConfig) -> Result<()> {
    let device = config.device.clone();
    let mut client = ObdClient::open_serial(config)
        .await
        .with_context(|| format!("Failed to open adapter on {device}"))?;

    let identity = client.identify().await.context("Adapter did not identify")?;
    info!("Adapter: {}", identity);

    if let Some(code) = cli.protocol {
        let protocol = ObdProtocol::from_code(code)
            .with_context(|| format!("Unknown protocol number {code}"))?;
        if !client.set_protocol(protocol).await? {
            warn!("Adapter refused protocol {:?}", protocol);
        }
    }
    info!("Protocol: {}", client.get_protocol().await?);

    let supported = client
        .scan_supported(mode::CURRENT_DATA)
        .await
        .context("Supported PID scan failed")?;
    info!("{} supported PIDs", supported.len());

    for pid in LIVE_PIDS.iter().filter(|pid| supported.contains(*pid)) {
        match client.read_parameter(*pid).await {
            Ok(response) => info!("{:<32} {} {}", pid.name(), response.value, response.unit),
            Err(e) => warn!("{:<32} not read: {}", pid.name(), e),
        }
    }

    let status = client.mil_status().await.context("MIL status failed")?;
    info!(
        "MIL {}, {} stored trouble codes",
        if status.mil_on { "ON" } else { "off" },
        status.dtc_count
    );
    for code in client.read_trouble_codes().await? {
        info!("  {}", code);
    }

    if cli.clear_codes && status.dtc_count > 0 {
        client.clear_trouble_codes().await.context("Clearing trouble codes failed")?;
        info!("Trouble codes cleared");
    }

    client.disconnect();
    Ok(())
}
