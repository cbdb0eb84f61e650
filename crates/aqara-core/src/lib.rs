//! # aqara-core
//!
//! Shared library for the Aqara gateway LAN protocol: wire constants, the
//! two-layer JSON envelope codec, the open per-device field model, and the
//! write-key derivation.
//!
//! This crate has zero dependencies on network sockets.  Everything that
//! touches the LAN lives in `aqara-gateway`.
//!
//! # Protocol overview (for beginners)
//!
//! An Aqara gateway is a hub that bridges Zigbee sensors (door magnets,
//! motion sensors, smart plugs, ...) onto the local network.  It speaks a
//! small JSON-over-UDP protocol:
//!
//! - **`protocol`** – How bytes travel over the network.  Every message is a
//!   JSON object whose `data` field is *itself* a JSON document stored as a
//!   string.  The codec decodes both layers and rejects anything malformed.
//!
//! - **`domain`** – The decoded, application-level view: a [`ReportMessage`]
//!   carries a device model, a device id and an open field mapping of
//!   [`FieldValue`]s, because every device model reports different fields.
//!
//! - **`auth`** – Writes must carry a `key` derived from the gateway's
//!   pre-shared password and the most recent session token.

pub mod auth;
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `aqara_core::ReportMessage` instead of `aqara_core::domain::report::ReportMessage`.
pub use auth::derive_auth_token;
pub use domain::field::{FieldMap, FieldValue};
pub use domain::report::ReportMessage;
pub use protocol::envelope::{decode_envelope, decode_report, encode_envelope, DecodedEnvelope};
pub use protocol::messages::{IamMessage, Request};
pub use protocol::ProtocolError;
