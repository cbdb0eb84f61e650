//! Multicast report listener.
//!
//! Gateways broadcast every sensor event (and a periodic heartbeat) to the
//! report group `224.0.0.50:9898`.  The listener joins that group on the
//! gateways' interface, attributes each datagram to a known gateway by exact
//! source address, decodes it and hands a [`ListenResult`] to a
//! [`ReportSink`].
//!
//! # Lifecycle
//!
//! ```text
//! GatewayListener::new ──► bind() ──► run() ──► Err(Recv)   (socket failure)
//!   (validates set)       (Bound)   (Listening)  Ok(())     (sink closed)
//! ```
//!
//! Configuration mistakes (an empty gateway set, gateways on different
//! interfaces) are rejected by [`GatewayListener::new`] before any socket is
//! opened.  Once listening, per-packet problems are logged and skipped; only
//! a socket read error ends the loop with an error.
//!
//! # Back-pressure
//!
//! Delivery blocks.  With the capacity-1 channel created by
//! [`spawn_listener`], a slow consumer stalls the receive loop (and the
//! kernel buffers the backlog) instead of reports being dropped.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread::JoinHandle;

use aqara_core::protocol::constants::{cmd, MAX_DATAGRAM_SIZE, MULTICAST_GROUP, REPORT_PORT};
use aqara_core::{decode_envelope, ReportMessage};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::gateway::Gateway;
use super::interface::{interface_ipv4, InterfaceError};

/// Error type for the report listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// `listen` was called with no gateways.
    #[error("no gateways to listen for")]
    NoGateways,

    /// The gateways are not all reachable through one interface.
    #[error("all gateways must share one interface: expected `{expected}`, found `{found}`")]
    MixedInterfaces { expected: String, found: String },

    /// The shared interface could not be resolved.
    #[error(transparent)]
    Interface(#[from] InterfaceError),

    /// The report socket could not be created or bound.
    #[error("failed to bind report socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Joining the report multicast group failed.
    #[error("failed to join {group} on {interface}: {source}")]
    JoinGroup {
        group: Ipv4Addr,
        interface: Ipv4Addr,
        #[source]
        source: io::Error,
    },

    /// A socket read failed after binding; the listener has stopped.
    #[error("report socket recv error: {0}")]
    Recv(#[source] io::Error),

    /// The background listener thread could not be started.
    #[error("failed to spawn listener thread: {0}")]
    Spawn(#[source] io::Error),
}

/// A decoded report together with the gateway it came from.
#[derive(Debug, Clone)]
pub struct ListenResult {
    pub report: ReportMessage,
    pub gateway: Arc<Gateway>,
}

/// The consumer has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("report sink closed")]
pub struct SinkClosed;

/// Destination for decoded reports.
///
/// `deliver` may block; that is how a slow consumer applies back-pressure
/// to the receive loop.
#[cfg_attr(test, mockall::automock)]
pub trait ReportSink {
    /// Hands over one report.  Returns [`SinkClosed`] once the consumer is
    /// gone, which stops the listener.
    fn deliver(&self, result: ListenResult) -> Result<(), SinkClosed>;
}

impl ReportSink for mpsc::Sender<ListenResult> {
    fn deliver(&self, result: ListenResult) -> Result<(), SinkClosed> {
        self.blocking_send(result).map_err(|_| SinkClosed)
    }
}

impl ReportSink for std::sync::mpsc::SyncSender<ListenResult> {
    fn deliver(&self, result: ListenResult) -> Result<(), SinkClosed> {
        self.send(result).map_err(|_| SinkClosed)
    }
}

/// Listens for reports from a fixed set of gateways.
#[derive(Debug)]
pub struct GatewayListener {
    gateways: Vec<Arc<Gateway>>,
    interface: String,
}

impl GatewayListener {
    /// Validates the gateway set.
    ///
    /// # Errors
    ///
    /// [`ListenerError::NoGateways`] for an empty set and
    /// [`ListenerError::MixedInterfaces`] when the gateways name different
    /// interfaces.
    pub fn new(gateways: Vec<Arc<Gateway>>) -> Result<Self, ListenerError> {
        let interface = gateways
            .first()
            .ok_or(ListenerError::NoGateways)?
            .interface()
            .to_string();

        if let Some(other) = gateways.iter().find(|g| g.interface() != interface) {
            return Err(ListenerError::MixedInterfaces {
                expected: interface,
                found: other.interface().to_string(),
            });
        }

        Ok(Self { gateways, interface })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn gateways(&self) -> &[Arc<Gateway>] {
        &self.gateways
    }

    /// Opens the report socket and joins the multicast group on the
    /// gateways' interface.
    ///
    /// Address and port reuse are enabled so several listeners (or other
    /// Aqara tools) can share the report port on one host.
    ///
    /// # Errors
    ///
    /// Interface lookup, socket creation, bind and group-join failures.
    pub fn bind(&self) -> Result<UdpSocket, ListenerError> {
        let local = interface_ipv4(&self.interface)?;
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, REPORT_PORT));
        let bind_err = |source| ListenerError::Bind { addr, source };

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        #[cfg(unix)]
        socket.set_reuse_port(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;
        socket
            .join_multicast_v4(&MULTICAST_GROUP, &local)
            .map_err(|source| ListenerError::JoinGroup {
                group: MULTICAST_GROUP,
                interface: local,
                source,
            })?;

        info!("listening for reports on {addr} (group {MULTICAST_GROUP} via {local})");
        Ok(socket.into())
    }

    /// Binds and runs the receive loop on the calling thread.
    ///
    /// # Errors
    ///
    /// See [`GatewayListener::bind`] and [`GatewayListener::run`].
    pub fn listen(&self, sink: &dyn ReportSink) -> Result<(), ListenerError> {
        let socket = self.bind()?;
        self.run(&socket, sink)
    }

    /// Receive loop over an already bound socket.
    ///
    /// Returns `Ok(())` when the sink closes.
    ///
    /// # Errors
    ///
    /// [`ListenerError::Recv`] on any socket read error other than an
    /// interrupted call.
    pub fn run(&self, socket: &UdpSocket, sink: &dyn ReportSink) -> Result<(), ListenerError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let (len, src) = match socket.recv_from(&mut buf) {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("report listener stopped: {e}");
                    return Err(ListenerError::Recv(e));
                }
            };

            let Some(result) = self.handle_datagram(&buf[..len], src) else {
                continue;
            };

            if sink.deliver(result).is_err() {
                info!("report sink closed, stopping listener");
                return Ok(());
            }
        }
    }

    /// Attributes and decodes one datagram.  `None` means "skip it".
    fn handle_datagram(&self, datagram: &[u8], src: SocketAddr) -> Option<ListenResult> {
        let IpAddr::V4(ip) = src.ip() else {
            debug!("ignoring report from non-IPv4 source {src}");
            return None;
        };

        let Some(gateway) = self.gateways.iter().find(|g| g.ip() == ip) else {
            debug!("ignoring report from unknown sender {src}");
            return None;
        };

        let envelope = match decode_envelope(datagram) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(gateway = %gateway.sid(), "discarding malformed report from {src}: {e}");
                return None;
            }
        };

        if let Some(token) = envelope.token.as_deref() {
            gateway.observe_token(token);
        }
        if envelope.cmd == cmd::HEARTBEAT {
            debug!(gateway = %gateway.sid(), "heartbeat from {src}");
        }

        match envelope.into_report() {
            Ok(report) => {
                debug!(gateway = %gateway.sid(), model = %report.model, sid = %report.sid, "report");
                Some(ListenResult {
                    report,
                    gateway: Arc::clone(gateway),
                })
            }
            Err(e) => {
                warn!(gateway = %gateway.sid(), "discarding report from {src}: {e}");
                None
            }
        }
    }
}

/// Runs a listener for `gateways` on a dedicated thread.
///
/// Reports arrive on the returned capacity-1 channel.  The join handle
/// yields the listener's terminal result: `Ok(())` once the receiver is
/// dropped, or the socket error that stopped it.
///
/// # Errors
///
/// Configuration errors are reported immediately, before the thread starts.
pub fn spawn_listener(
    gateways: Vec<Arc<Gateway>>,
) -> Result<(mpsc::Receiver<ListenResult>, JoinHandle<Result<(), ListenerError>>), ListenerError> {
    let listener = GatewayListener::new(gateways)?;
    let (tx, rx) = mpsc::channel(1);

    let handle = std::thread::Builder::new()
        .name("aqara-listener".to_string())
        .spawn(move || listener.listen(&tx))
        .map_err(ListenerError::Spawn)?;

    Ok((rx, handle))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(ip: [u8; 4], sid: &str, iface: &str) -> Arc<Gateway> {
        Arc::new(Gateway::new(Ipv4Addr::from(ip), sid, "", iface))
    }

    fn listener() -> GatewayListener {
        GatewayListener::new(vec![
            gateway([192, 168, 1, 20], "gw-a", "eth0"),
            gateway([192, 168, 1, 21], "gw-b", "eth0"),
        ])
        .unwrap()
    }

    fn from(ip: [u8; 4]) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::from(ip), 9898))
    }

    const MAGNET: &[u8] =
        br#"{"cmd":"report","model":"magnet","sid":"158d0001","data":"{\"status\":\"open\"}"}"#;

    #[test]
    fn test_new_rejects_empty_gateway_set() {
        assert!(matches!(GatewayListener::new(Vec::new()), Err(ListenerError::NoGateways)));
    }

    #[test]
    fn test_new_rejects_mixed_interfaces() {
        // Arrange
        let set = vec![
            gateway([192, 168, 1, 20], "gw-a", "eth0"),
            gateway([10, 0, 0, 5], "gw-b", "wlan0"),
        ];

        // Act
        let result = GatewayListener::new(set);

        // Assert
        assert!(matches!(
            result,
            Err(ListenerError::MixedInterfaces { expected, found }) if expected == "eth0" && found == "wlan0"
        ));
    }

    #[test]
    fn test_report_from_known_gateway_is_attributed_to_it() {
        // Arrange
        let l = listener();

        // Act
        let result = l.handle_datagram(MAGNET, from([192, 168, 1, 21])).unwrap();

        // Assert
        assert_eq!(result.gateway.sid(), "gw-b");
        assert_eq!(result.report.model, "magnet");
        assert_eq!(result.report.sid, "158d0001");
        assert_eq!(result.report.get("status").and_then(|v| v.as_str()), Some("open"));
    }

    #[test]
    fn test_report_from_unknown_sender_is_dropped() {
        assert!(listener().handle_datagram(MAGNET, from([192, 168, 1, 99])).is_none());
    }

    #[test]
    fn test_malformed_report_is_dropped() {
        let l = listener();
        assert!(l.handle_datagram(b"not json", from([192, 168, 1, 20])).is_none());
        let bad_payload = br#"{"cmd":"report","sid":"x","data":"{broken"}"#;
        assert!(l.handle_datagram(bad_payload, from([192, 168, 1, 20])).is_none());
    }

    #[test]
    fn test_report_with_inline_payload_is_not_delivered() {
        // Arrange: `data` must be string-encoded; an inline object is malformed
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let l = GatewayListener::new(vec![gateway([127, 0, 0, 1], "gw", "127.0.0.1")]).unwrap();
        socket.set_read_timeout(Some(std::time::Duration::from_millis(200))).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(
                br#"{"cmd":"report","model":"magnet","sid":"s1","data":{"status":"open"}}"#,
                socket.local_addr().unwrap(),
            )
            .unwrap();

        let mut sink = MockReportSink::new();
        sink.expect_deliver().never();

        // Act: the read timeout ends the loop once the packet was discarded
        let result = l.run(&socket, &sink);

        // Assert
        assert!(matches!(result, Err(ListenerError::Recv(_))));
    }

    #[test]
    fn test_heartbeat_token_refreshes_matching_gateway_only() {
        // Arrange
        let l = listener();
        let heartbeat = br#"{"cmd":"heartbeat","model":"gateway","sid":"gw-a","token":"1234567890abcdef","data":"{\"ip\":\"192.168.1.20\"}"}"#;

        // Act
        let result = l.handle_datagram(heartbeat, from([192, 168, 1, 20]));

        // Assert
        assert!(result.is_some());
        assert_eq!(l.gateways()[0].token().as_deref(), Some("1234567890abcdef"));
        assert!(l.gateways()[1].token().is_none());
    }

    #[test]
    fn test_run_stops_cleanly_when_sink_closes() {
        // Arrange: a loopback socket standing in for the multicast socket
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let l = GatewayListener::new(vec![gateway([127, 0, 0, 1], "gw", "127.0.0.1")]).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(MAGNET, socket.local_addr().unwrap()).unwrap();

        let mut sink = MockReportSink::new();
        sink.expect_deliver()
            .withf(|r| r.report.model == "magnet")
            .times(1)
            .returning(|_| Err(SinkClosed));

        // Act
        let result = l.run(&socket, &sink);

        // Assert
        assert!(result.is_ok());
    }

    #[test]
    fn test_run_skips_unknown_senders_before_delivering() {
        // Arrange
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = socket.local_addr().unwrap();
        // Only 127.0.0.2 is known; loopback packets come from 127.0.0.1.
        let l = GatewayListener::new(vec![gateway([127, 0, 0, 2], "gw", "127.0.0.1")]).unwrap();
        socket.set_read_timeout(Some(std::time::Duration::from_millis(200))).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(MAGNET, target).unwrap();

        let mut sink = MockReportSink::new();
        sink.expect_deliver().never();

        // Act: the read timeout surfaces as a Recv error once the queue drains
        let result = l.run(&socket, &sink);

        // Assert
        assert!(matches!(result, Err(ListenerError::Recv(_))));
    }
}
