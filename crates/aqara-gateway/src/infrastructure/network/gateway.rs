//! Gateway handle and command channel.
//!
//! A [`Gateway`] represents one physical hub.  Commands run as strictly
//! sequential request/response exchanges over a single UDP socket:
//!
//! ```text
//! caller ──► lock session ──► (open socket on first use) ──► send request
//!                                                              │
//!            unlock ◄── cache token ◄── decode ◄── recv one datagram
//! ```
//!
//! # Why one exchange at a time?
//!
//! The protocol has no request identifiers, so a reply can only be matched
//! to a request by order.  The session mutex is held across the whole
//! exchange; concurrent callers on the same gateway queue up behind it,
//! while callers on different gateways never contend.
//!
//! # Session token
//!
//! Responses may carry a `token`.  The newest one is cached (in a separate
//! lock, so the report listener can refresh it without waiting for an
//! exchange) and combined with the gateway password to derive the `key` of
//! the next write.
//!
//! # Read timeout
//!
//! A gateway that never answers would otherwise block the caller forever.
//! Each handle has a configurable read timeout ([`DEFAULT_COMMAND_TIMEOUT`]
//! unless overridden).  After a timeout or I/O failure the session socket is
//! discarded, so a late reply cannot be mistaken for the answer to the next
//! request.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use aqara_core::protocol::constants::{cmd, COMMAND_PORT, DEFAULT_COMMAND_TIMEOUT, MAX_DATAGRAM_SIZE};
use aqara_core::{
    decode_envelope, derive_auth_token, DecodedEnvelope, FieldMap, FieldValue, ProtocolError,
    ReportMessage, Request,
};
use thiserror::Error;
use tracing::{debug, warn};

use super::interface::{interface_ipv4, InterfaceError};
use super::is_timeout_error;

/// Error type for command-channel exchanges.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The configured interface could not be resolved.
    #[error(transparent)]
    Interface(#[from] InterfaceError),

    /// The session socket could not be created or connected.
    #[error("failed to open session socket to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Sending the request or receiving the reply failed.
    #[error("gateway I/O error: {0}")]
    Io(#[source] io::Error),

    /// No reply arrived within the handle's read timeout.
    #[error("no reply from gateway {addr} within {after:?}")]
    Timeout { addr: SocketAddr, after: Duration },

    /// The reply was malformed.
    #[error("malformed gateway reply: {0}")]
    Protocol(ProtocolError),

    /// The gateway answered with an `error` payload.
    #[error("gateway rejected request: {message}")]
    Device { message: String },
}

impl From<ProtocolError> for CommandError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Device { message } => CommandError::Device { message },
            other => CommandError::Protocol(other),
        }
    }
}

/// Handle to one Aqara gateway.
///
/// Share it as `Arc<Gateway>`: the command channel and the listener both
/// need it, and every method takes `&self`.
pub struct Gateway {
    ip: Ipv4Addr,
    port: u16,
    sid: String,
    key: String,
    interface: String,
    timeout: Option<Duration>,
    /// Exclusion guard for exchanges; holds the lazily opened socket.
    session: Mutex<Option<UdpSocket>>,
    token: Mutex<Option<String>>,
}

impl Gateway {
    /// Creates a handle for the gateway at `ip` with id `sid`.
    ///
    /// `key` is the gateway password from the Aqara app; pass an empty
    /// string to send writes without a key.  `interface` names the local
    /// interface (or IPv4 address) the session socket binds to.
    pub fn new(
        ip: Ipv4Addr,
        sid: impl Into<String>,
        key: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            ip,
            port: COMMAND_PORT,
            sid: sid.into(),
            key: key.into(),
            interface: interface.into(),
            timeout: Some(DEFAULT_COMMAND_TIMEOUT),
            session: Mutex::new(None),
            token: Mutex::new(None),
        }
    }

    /// Overrides the command port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the reply timeout.  `None` (or a zero duration) waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Whether a gateway password is configured.
    pub fn has_key(&self) -> bool {
        !self.key.is_empty()
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The most recently observed session token.
    pub fn token(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Caches a session token seen in a message from this gateway.
    pub(crate) fn observe_token(&self, token: &str) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    }

    /// The `key` value for the next write.  Empty without a password or token.
    pub fn write_key(&self) -> String {
        derive_auth_token(&self.key, self.token().as_deref().unwrap_or_default())
    }

    // ── Command channel ───────────────────────────────────────────────────────

    /// Runs one request/response exchange and returns the decoded reply.
    ///
    /// A token in the reply is cached even when the payload is an error.
    /// An `error` payload is *not* reported here; the public operations
    /// turn it into [`CommandError::Device`].
    pub(crate) fn exchange(&self, request: &Request<'_>) -> Result<DecodedEnvelope, CommandError> {
        self.exchange_with(request.command(), || request.encode())
    }

    /// Runs one exchange whose request is encoded by `encode` while the
    /// session guard is held, so a write key derived inside `encode` sees the
    /// token left by the previous exchange.
    fn exchange_with(
        &self,
        cmd: &'static str,
        encode: impl FnOnce() -> Result<Vec<u8>, ProtocolError>,
    ) -> Result<DecodedEnvelope, CommandError> {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let bytes = encode()?;
        let socket = match session.take() {
            Some(socket) => socket,
            None => self.open_session()?,
        };

        debug!(gateway = %self.sid, cmd, "sending request");
        let reply = match self.round_trip(&socket, &bytes) {
            Ok(reply) => {
                *session = Some(socket);
                reply
            }
            Err(e) => {
                warn!(gateway = %self.sid, "exchange failed, dropping session socket: {e}");
                return Err(e);
            }
        };

        let decoded = decode_envelope(&reply)?;
        if let Some(token) = decoded.token.as_deref() {
            self.observe_token(token);
        }
        debug!(gateway = %self.sid, cmd = %decoded.cmd, "received reply");
        Ok(decoded)
    }

    /// Runs one exchange and converts the reply into a [`ReportMessage`].
    ///
    /// # Errors
    ///
    /// Socket failures, timeouts and malformed replies, plus
    /// [`CommandError::Device`] when the gateway answers with an `error`
    /// payload.
    pub fn send(&self, request: &Request<'_>) -> Result<ReportMessage, CommandError> {
        Ok(self.exchange(request)?.into_report()?)
    }

    /// Lists the ids of the devices paired with this gateway, in gateway order.
    ///
    /// # Errors
    ///
    /// See [`Gateway::send`].
    pub fn list_device_ids(&self) -> Result<Vec<String>, CommandError> {
        Ok(self.exchange(&Request::GetIdList)?.into_id_list()?)
    }

    /// Reads the current status of device `sid`.
    ///
    /// # Errors
    ///
    /// See [`Gateway::send`].
    pub fn get_device_status(&self, sid: &str) -> Result<ReportMessage, CommandError> {
        self.send(&Request::Read { sid })
    }

    /// Writes `fields` to device `sid`, authorised with the current write key.
    ///
    /// # Errors
    ///
    /// See [`Gateway::send`].  A wrong password or stale token comes back as
    /// [`CommandError::Device`].
    pub fn set_device_attribute(
        &self,
        sid: &str,
        fields: &FieldMap,
    ) -> Result<ReportMessage, CommandError> {
        let reply = self.exchange_with(cmd::WRITE, || {
            let key = self.write_key();
            if key.is_empty() {
                debug!(gateway = %self.sid, "no write key available, sending write without one");
            }
            let request = Request::Write {
                sid,
                data: fields,
                key: &key,
            };
            request.encode()
        })?;
        Ok(reply.into_report()?)
    }

    /// Sets the gateway's night light.  `rgb` packs brightness and colour as
    /// `0xBBRRGGBB`; `0` switches the light off.
    ///
    /// # Errors
    ///
    /// See [`Gateway::set_device_attribute`].
    pub fn set_rgb(&self, rgb: u32) -> Result<ReportMessage, CommandError> {
        let mut fields = FieldMap::new();
        fields.insert("rgb".into(), FieldValue::from(rgb));
        self.set_device_attribute(&self.sid, &fields)
    }

    /// Plays ringtone `mid` on the gateway at volume `vol`.
    ///
    /// # Errors
    ///
    /// See [`Gateway::set_device_attribute`].
    pub fn set_mid(&self, mid: u32, vol: u32) -> Result<ReportMessage, CommandError> {
        let mut fields = FieldMap::new();
        fields.insert("mid".into(), FieldValue::from(mid));
        fields.insert("vol".into(), FieldValue::from(vol));
        self.set_device_attribute(&self.sid, &fields)
    }

    /// Sets the `status` of a sub-device, e.g. `"on"`/`"off"` for a plug.
    ///
    /// # Errors
    ///
    /// See [`Gateway::set_device_attribute`].
    pub fn set_status(&self, sid: &str, status: &str) -> Result<ReportMessage, CommandError> {
        let mut fields = FieldMap::new();
        fields.insert("status".into(), FieldValue::from(status));
        self.set_device_attribute(sid, &fields)
    }

    /// Binds to the interface address and connects to the gateway.
    fn open_session(&self) -> Result<UdpSocket, CommandError> {
        let local = interface_ipv4(&self.interface)?;
        let addr = self.addr();
        let connect_err = |source| CommandError::Connect { addr, source };

        let socket = UdpSocket::bind((local, 0)).map_err(connect_err)?;
        socket.connect(addr).map_err(connect_err)?;
        socket.set_read_timeout(self.timeout).map_err(connect_err)?;

        debug!(gateway = %self.sid, "opened session socket {local} -> {addr}");
        Ok(socket)
    }

    /// Sends `request` and reads exactly one datagram back.
    fn round_trip(&self, socket: &UdpSocket, request: &[u8]) -> Result<Vec<u8>, CommandError> {
        socket.send(request).map_err(CommandError::Io)?;

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let len = socket.recv(&mut buf).map_err(|e| match self.timeout {
            Some(after) if is_timeout_error(&e) => CommandError::Timeout {
                addr: self.addr(),
                after,
            },
            _ => CommandError::Io(e),
        })?;
        buf.truncate(len);
        Ok(buf)
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("sid", &self.sid)
            .field("key", &if self.has_key() { "<set>" } else { "<empty>" })
            .field("interface", &self.interface)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
