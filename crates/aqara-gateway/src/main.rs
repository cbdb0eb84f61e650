//! aqara-gateway command-line entry point.
//!
//! Thin wiring around the library:
//!
//! ```text
//! main()
//!  └─ load_config()            -- TOML file (optional)
//!  └─ resolve_gateways()       -- --ip/--sid, [[gateways]], or discovery
//!  └─ subcommand
//!       ├─ discover            -- print every gateway that answers whois
//!       ├─ list / status / set / rgb / mid
//!       │                      -- one command-channel exchange (blocking pool)
//!       └─ listen              -- background listener thread, JSON lines on stdout
//! ```

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use aqara_core::{FieldMap, FieldValue, ReportMessage};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use aqara_gateway::application::resolve_gateways::{resolve_gateways, GatewaySelection};
use aqara_gateway::infrastructure::network::discovery::{GatewayDiscovery, MulticastDiscovery};
use aqara_gateway::infrastructure::network::gateway::Gateway;
use aqara_gateway::infrastructure::network::listener::spawn_listener;
use aqara_gateway::infrastructure::storage::config::{load_config, AppConfig};

/// LAN client for Aqara gateways.
#[derive(Debug, Parser)]
#[command(name = "aqara-gateway", version, about)]
struct Cli {
    /// Configuration file (defaults to the platform config directory).
    #[arg(long, env = "AQARA_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Network interface name or local IPv4 address.
    #[arg(long, env = "AQARA_IFACE", global = true)]
    iface: Option<String>,

    /// Gateway address; skips discovery (requires --sid).
    #[arg(long, global = true)]
    ip: Option<Ipv4Addr>,

    /// Gateway id.
    #[arg(long, global = true)]
    sid: Option<String>,

    /// Gateway password from the Aqara app.
    #[arg(long, env = "AQARA_KEY", global = true, hide_env_values = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every gateway that answers a whois query.
    Discover,
    /// List the devices paired with the gateway.
    List,
    /// Read the status of a device.
    Status { device: String },
    /// Write fields to a device, e.g. `set 158d0001 status=on`.
    Set {
        device: String,
        #[arg(required = true, value_name = "FIELD=VALUE")]
        fields: Vec<String>,
    },
    /// Set the gateway night light (`0xBBRRGGBB`, 0 switches it off).
    Rgb { value: String },
    /// Play a ringtone on the gateway.
    Mid {
        mid: u32,
        #[arg(long, default_value_t = 10)]
        vol: u32,
    },
    /// Print reports from the gateways as JSON lines until interrupted.
    Listen,
}

/// One line of `listen` output.
#[derive(Serialize)]
struct ReportLine<'a> {
    gateway: &'a str,
    #[serde(flatten)]
    report: &'a ReportMessage,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let selection = GatewaySelection {
        interface: cli.iface.clone().or_else(|| config.network.interface.clone()),
        ip: cli.ip,
        sid: cli.sid.clone(),
        key: cli.key.clone(),
        discovery_timeout: config.network.discovery_timeout(),
        command_timeout: config.network.command_timeout(),
    };

    match cli.command {
        Command::Discover => discover(selection).await,
        Command::Listen => listen(selection, config).await,
        command => run_command(command, selection, config).await,
    }
}

async fn discover(selection: GatewaySelection) -> anyhow::Result<()> {
    let Some(interface) = selection.interface else {
        bail!("discovery needs an interface (use --iface or [network] interface)");
    };
    let timeout = selection.discovery_timeout;

    let found = tokio::task::spawn_blocking(move || MulticastDiscovery.discover(&interface, timeout))
        .await
        .context("discovery task panicked")??;

    for gw in &found {
        println!(
            "{}\t{}\t{}\t{}",
            gw.sid,
            gw.ip,
            gw.model.as_deref().unwrap_or("-"),
            gw.proto_version.as_deref().unwrap_or("-")
        );
    }
    if found.is_empty() {
        warn!("no gateway answered");
    }
    Ok(())
}

async fn resolve(selection: GatewaySelection, config: AppConfig) -> anyhow::Result<Vec<Arc<Gateway>>> {
    tokio::task::spawn_blocking(move || {
        resolve_gateways(&selection, &config.gateways, &MulticastDiscovery)
    })
    .await
    .context("gateway resolution panicked")?
    .context("failed to resolve gateway")
}

async fn run_command(
    command: Command,
    selection: GatewaySelection,
    config: AppConfig,
) -> anyhow::Result<()> {
    let gateways = resolve(selection, config).await?;
    let gateway = gateways.first().cloned().context("no gateway resolved")?;
    if gateways.len() > 1 {
        info!("{} gateways resolved, using {}", gateways.len(), gateway.sid());
    }

    let output = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let report = match command {
            Command::List => return Ok(gateway.list_device_ids()?.join("\n")),
            Command::Status { device } => gateway.get_device_status(&device)?,
            Command::Set { device, fields } => {
                gateway.set_device_attribute(&device, &parse_fields(&fields)?)?
            }
            Command::Rgb { value } => gateway.set_rgb(parse_rgb(&value)?)?,
            Command::Mid { mid, vol } => gateway.set_mid(mid, vol)?,
            other => bail!("`{other:?}` is not a gateway command"),
        };
        Ok(serde_json::to_string(&report)?)
    })
    .await
    .context("command task panicked")??;

    println!("{output}");
    Ok(())
}

async fn listen(selection: GatewaySelection, config: AppConfig) -> anyhow::Result<()> {
    let gateways = resolve(selection, config).await?;
    let (mut rx, handle) = spawn_listener(gateways).context("failed to start listener")?;

    loop {
        tokio::select! {
            result = rx.recv() => {
                let Some(result) = result else { break };
                let line = ReportLine {
                    gateway: result.gateway.sid(),
                    report: &result.report,
                };
                println!("{}", serde_json::to_string(&line)?);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return Ok(());
            }
        }
    }

    // The channel only closes when the listener thread has returned.
    drop(rx);
    match tokio::task::spawn_blocking(move || handle.join()).await? {
        Ok(result) => result.context("report listener stopped"),
        Err(_) => bail!("report listener thread panicked"),
    }
}

/// Parses `field=value` pairs; values become numbers where they look like one.
fn parse_fields(pairs: &[String]) -> anyhow::Result<FieldMap> {
    pairs
        .iter()
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .with_context(|| format!("expected FIELD=VALUE, got `{pair}`"))?;
            Ok((name.trim().to_string(), FieldValue::parse_lossy(value.trim())))
        })
        .collect()
}

/// Parses a decimal or `0x`-prefixed hexadecimal colour.
fn parse_rgb(text: &str) -> anyhow::Result<u32> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("invalid colour `{text}`"))
}
