//! ResolveGatewaysUseCase: turn options and configuration into gateway handles.
//!
//! Resolution order:
//!
//! ```text
//! --ip + --sid given?  ──yes──►  that one gateway
//!        │ no
//! [[gateways]] with ip? ──yes──►  every configured gateway with an address
//!        │ no
//! discover(interface)   ──────►  every gateway that answered (filtered by --sid)
//! ```
//!
//! The key attached to a gateway is the command-line key if one was given,
//! otherwise the `key` of the `[[gateways]]` entry with the same `sid`,
//! otherwise empty (writes are sent without a key).

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use aqara_core::protocol::constants::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_DISCOVERY_TIMEOUT};
use thiserror::Error;
use tracing::{debug, info};

use crate::infrastructure::network::discovery::{DiscoveryError, GatewayDiscovery};
use crate::infrastructure::network::gateway::Gateway;
use crate::infrastructure::storage::config::{ConfigError, GatewayEntry};

/// Error type for gateway resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No interface was configured; sockets have nothing to bind to.
    #[error("no network interface configured (use --iface or [network] interface)")]
    NoInterface,

    /// An address was given without the gateway id.
    #[error("--ip requires --sid")]
    MissingSid,

    /// A configured gateway entry is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Discovery failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Neither configuration nor discovery produced a gateway.
    #[error("no gateway found on interface `{0}`")]
    NoGatewayFound(String),
}

/// What the user asked for, merged from the command line and the config file.
#[derive(Debug, Clone)]
pub struct GatewaySelection {
    pub interface: Option<String>,
    pub ip: Option<Ipv4Addr>,
    pub sid: Option<String>,
    /// Key that overrides any per-gateway key from the config file.
    pub key: Option<String>,
    pub discovery_timeout: Duration,
    pub command_timeout: Option<Duration>,
}

impl Default for GatewaySelection {
    fn default() -> Self {
        Self {
            interface: None,
            ip: None,
            sid: None,
            key: None,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
        }
    }
}

impl GatewaySelection {
    fn key_for(&self, sid: &str, entries: &[GatewayEntry]) -> String {
        self.key
            .clone()
            .or_else(|| {
                entries
                    .iter()
                    .find(|e| e.sid == sid)
                    .and_then(|e| e.key.clone())
            })
            .unwrap_or_default()
    }

    fn build(&self, ip: Ipv4Addr, sid: &str, interface: &str, entries: &[GatewayEntry]) -> Arc<Gateway> {
        let key = self.key_for(sid, entries);
        Arc::new(Gateway::new(ip, sid, key, interface).with_timeout(self.command_timeout))
    }
}

/// Resolves the gateways to talk to.
///
/// # Errors
///
/// See [`ResolveError`].
pub fn resolve_gateways(
    selection: &GatewaySelection,
    entries: &[GatewayEntry],
    discovery: &dyn GatewayDiscovery,
) -> Result<Vec<Arc<Gateway>>, ResolveError> {
    let interface = selection
        .interface
        .as_deref()
        .ok_or(ResolveError::NoInterface)?;

    if let Some(ip) = selection.ip {
        let sid = selection.sid.as_deref().ok_or(ResolveError::MissingSid)?;
        debug!("using gateway {sid} at {ip} from command line");
        return Ok(vec![selection.build(ip, sid, interface, entries)]);
    }

    let mut configured = Vec::new();
    for entry in entries {
        if let Some(ip) = entry.address()? {
            if selection.sid.as_deref().map_or(true, |sid| sid == entry.sid) {
                configured.push(selection.build(ip, &entry.sid, interface, entries));
            }
        }
    }
    if !configured.is_empty() {
        debug!("using {} configured gateway(s)", configured.len());
        return Ok(configured);
    }

    info!("no gateway address configured, discovering on {interface}");
    let discovered: Vec<_> = discovery
        .discover(interface, selection.discovery_timeout)?
        .into_iter()
        .filter(|found| selection.sid.as_deref().map_or(true, |sid| sid == found.sid))
        .map(|found| selection.build(found.ip, &found.sid, interface, entries))
        .collect();

    if discovered.is_empty() {
        return Err(ResolveError::NoGatewayFound(interface.to_string()));
    }
    Ok(discovered)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
