//! Multicast gateway discovery.
//!
//! Discovery sends one `{"cmd":"whois"}` datagram to the well-known
//! discovery group and collects the `iam` replies that arrive before a
//! deadline.
//!
//! # How multicast discovery works (for beginners)
//!
//! 1. We bind an ephemeral UDP socket on the chosen interface's address and
//!    send the query to `224.0.0.50:4321`.  Every gateway on the segment is a
//!    member of that group and receives it.
//!
//! 2. Each gateway replies with a unicast `iam` datagram to our socket.  The
//!    reply contains an `ip` member, but we ignore it and use the datagram's
//!    source address: the packet's origin is harder to get wrong than
//!    whatever the firmware wrote into the payload.
//!
//! 3. We keep reading until the deadline passes.  A reply that cannot be
//!    parsed is logged and skipped; it never aborts discovery.
//!
//! # Deadline handling
//!
//! The deadline is absolute: before every read the socket's read timeout is
//! set to the time remaining, so a chatty network cannot stretch discovery
//! beyond `timeout`.

use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use aqara_core::protocol::constants::{cmd, DISCOVERY_ADDR, MAX_DATAGRAM_SIZE};
use aqara_core::{IamMessage, Request};
use socket2::SockRef;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::gateway::Gateway;
use super::interface::{interface_ipv4, InterfaceError};
use super::is_timeout_error;

/// Error type for discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The interface could not be resolved.
    #[error(transparent)]
    Interface(#[from] InterfaceError),

    /// The query socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The `whois` query could not be sent.
    #[error("failed to send whois query: {0}")]
    Send(#[source] io::Error),

    /// A read failed for a reason other than the deadline expiring.
    #[error("recv error during discovery: {0}")]
    Recv(#[source] io::Error),
}

/// A gateway that answered a `whois` query.
///
/// The key is never sent over the discovery channel; supply it with
/// [`DiscoveredGateway::into_gateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredGateway {
    /// Source address of the `iam` reply.
    pub ip: Ipv4Addr,
    pub sid: String,
    pub model: Option<String>,
    pub proto_version: Option<String>,
    /// Interface the reply was received on.
    pub interface: String,
}

impl DiscoveredGateway {
    /// Builds a [`Gateway`] handle, attaching the out-of-band `key`.
    pub fn into_gateway(self, key: impl Into<String>) -> Gateway {
        Gateway::new(self.ip, self.sid, key, self.interface)
    }
}

/// Source of discovered gateways.
///
/// The application layer depends on this trait rather than on sockets, so
/// gateway resolution can be tested without a network.
#[cfg_attr(test, mockall::automock)]
pub trait GatewayDiscovery {
    /// Discovers gateways reachable through `interface` within `timeout`.
    fn discover(
        &self,
        interface: &str,
        timeout: Duration,
    ) -> Result<Vec<DiscoveredGateway>, DiscoveryError>;
}

/// [`GatewayDiscovery`] over the real discovery multicast group.
#[derive(Debug, Default, Clone, Copy)]
pub struct MulticastDiscovery;

impl GatewayDiscovery for MulticastDiscovery {
    fn discover(
        &self,
        interface: &str,
        timeout: Duration,
    ) -> Result<Vec<DiscoveredGateway>, DiscoveryError> {
        discover(interface, timeout)
    }
}

/// Discovers the gateways on `interface`'s segment.
///
/// Returns an empty list, not an error, when nobody answers within `timeout`.
///
/// # Errors
///
/// Interface lookup, bind and send failures, and any read error other than
/// the deadline expiring.
pub fn discover(interface: &str, timeout: Duration) -> Result<Vec<DiscoveredGateway>, DiscoveryError> {
    discover_at(interface, SocketAddr::V4(DISCOVERY_ADDR), timeout)
}

/// Like [`discover`], but sends the query to `target` instead of the
/// well-known discovery group.
///
/// # Errors
///
/// See [`discover`].
pub fn discover_at(
    interface: &str,
    target: SocketAddr,
    timeout: Duration,
) -> Result<Vec<DiscoveredGateway>, DiscoveryError> {
    let local = interface_ipv4(interface)?;
    let addr = SocketAddr::from((local, 0));
    let socket = UdpSocket::bind(addr).map_err(|source| DiscoveryError::Bind { addr, source })?;

    if target.ip().is_multicast() {
        // Without this the OS picks the outgoing interface from the routing
        // table, which is wrong on multi-homed hosts.
        if let Err(e) = SockRef::from(&socket).set_multicast_if_v4(&local) {
            warn!("failed to pin multicast interface to {local}: {e}");
        }
    }

    let query = Request::WhoIs.encode().map_err(|e| {
        DiscoveryError::Send(io::Error::new(io::ErrorKind::InvalidData, e))
    })?;
    let deadline = Instant::now() + timeout;
    socket.send_to(&query, target).map_err(DiscoveryError::Send)?;
    info!("sent whois to {target} from {local}, waiting {timeout:?}");

    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        socket
            .set_read_timeout(Some(remaining))
            .map_err(DiscoveryError::Recv)?;

        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            // The deadline check at the top of the loop ends discovery.
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => return Err(DiscoveryError::Recv(e)),
        };

        let IpAddr::V4(ip) = src.ip() else {
            debug!("ignoring discovery reply from non-IPv4 source {src}");
            continue;
        };

        let iam = match IamMessage::decode(&buf[..len]) {
            Ok(iam) => iam,
            Err(e) => {
                warn!("skipping malformed discovery reply from {src}: {e}");
                continue;
            }
        };

        if iam.cmd.as_deref().is_some_and(|c| c != cmd::IAM) {
            debug!("ignoring non-iam discovery reply from {src}");
            continue;
        }

        if !seen.insert((ip, iam.sid.clone())) {
            debug!("duplicate iam from {src} (sid={})", iam.sid);
            continue;
        }

        debug!(
            "gateway {} at {ip} (model={:?}, proto={:?})",
            iam.sid, iam.model, iam.proto_version
        );
        found.push(DiscoveredGateway {
            ip,
            sid: iam.sid,
            model: iam.model,
            proto_version: iam.proto_version,
            interface: interface.to_string(),
        });
    }

    info!("discovery finished: {} gateway(s)", found.len());
    Ok(found)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
