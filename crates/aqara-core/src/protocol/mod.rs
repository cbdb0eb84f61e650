//! Protocol module containing wire constants, request shapes and the envelope codec.

pub mod constants;
pub mod envelope;
pub mod messages;

use thiserror::Error;

pub use envelope::{decode_envelope, decode_report, encode_envelope, DecodedEnvelope};
pub use messages::{IamMessage, Request};

/// Errors that can occur while encoding or decoding a gateway message.
///
/// Every variant except [`ProtocolError::Device`] is a *format* error: the
/// datagram is malformed and should be discarded.  `Device` means the
/// message was well-formed but the gateway refused the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The outer document is not valid JSON, or not a JSON object.
    #[error("malformed envelope: {0}")]
    InvalidJson(String),

    /// A field the message shape requires is absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// The string-encoded `data` field is not valid JSON text.
    #[error("payload is not valid JSON: {0}")]
    InvalidPayload(String),

    /// The payload decoded, but not into the shape this message needs.
    #[error("unexpected payload: expected {expected}")]
    UnexpectedPayload { expected: &'static str },

    /// The payload carried an `error` field.
    #[error("device error: {message}")]
    Device { message: String },

    /// A request could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Returns `true` for the gateway-reported [`ProtocolError::Device`] variant.
    pub fn is_device_error(&self) -> bool {
        matches!(self, ProtocolError::Device { .. })
    }
}
