//! Codec for the two-layer JSON envelope.
//!
//! Wire format of every gateway response and report:
//! ```text
//! {"cmd":"report","model":"magnet","sid":"158d0001","short_id":4343,
//!  "token":"1234567890abcdef","data":"{\"status\":\"open\"}"}
//! ```
//! The `data` member is a JSON document *encoded as a string*.  Decoding
//! parses the outer object first, then parses `data` a second time.
//! `token` is optional and only present on some messages (`get_id_list_ack`,
//! `heartbeat`).
//!
//! # Error field
//!
//! A gateway refuses a request by answering with `{"error":"..."}` as the
//! inner payload.  [`decode_envelope`] still succeeds for such a message (so
//! the caller can pick up the token it carries); the conversions
//! [`DecodedEnvelope::into_report`] and [`DecodedEnvelope::into_id_list`]
//! turn it into [`ProtocolError::Device`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::constants::ERROR_FIELD;
use super::ProtocolError;
use crate::domain::field::fields_from_object;
use crate::domain::report::ReportMessage;

/// Outer document as it arrives on the wire.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    cmd: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    sid: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Outer document as written by [`encode_envelope`].
#[derive(Debug, Serialize)]
struct OutboundEnvelope<'a> {
    cmd: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sid: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

/// Both layers of one decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEnvelope {
    pub cmd: String,
    pub model: Option<String>,
    pub sid: Option<String>,
    /// Session token, if the message carried a non-empty one.
    pub token: Option<String>,
    /// The inner document, already parsed.
    pub payload: Value,
}

impl DecodedEnvelope {
    /// Returns the device's message text if the payload carries an `error` field.
    pub fn device_error(&self) -> Option<String> {
        self.payload.get(ERROR_FIELD).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Converts a status payload into a [`ReportMessage`].
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Device`] if the payload embeds an `error` field.
    /// - [`ProtocolError::MissingField`] if the envelope has no `sid`.
    /// - [`ProtocolError::UnexpectedPayload`] if the payload is not an object.
    pub fn into_report(self) -> Result<ReportMessage, ProtocolError> {
        if let Some(message) = self.device_error() {
            return Err(ProtocolError::Device { message });
        }
        let sid = self.sid.ok_or(ProtocolError::MissingField("sid"))?;
        let Value::Object(object) = self.payload else {
            return Err(ProtocolError::UnexpectedPayload {
                expected: "a JSON object",
            });
        };
        Ok(ReportMessage {
            model: self.model.unwrap_or_default(),
            sid,
            data: fields_from_object(object),
        })
    }

    /// Converts a `get_id_list_ack` payload into the ordered list of device ids.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Device`] for an error payload, and
    /// [`ProtocolError::UnexpectedPayload`] unless the payload is an array of strings.
    pub fn into_id_list(self) -> Result<Vec<String>, ProtocolError> {
        if let Some(message) = self.device_error() {
            return Err(ProtocolError::Device { message });
        }
        serde_json::from_value(self.payload).map_err(|_| ProtocolError::UnexpectedPayload {
            expected: "an array of device ids",
        })
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an envelope, string-encoding `payload` into the `data` field.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use aqara_core::{decode_envelope, encode_envelope};
/// use serde_json::json;
///
/// let bytes = encode_envelope("report", Some("158d0001"), None, Some(&json!({"status":"open"}))).unwrap();
/// let decoded = decode_envelope(&bytes).unwrap();
/// assert_eq!(decoded.payload, json!({"status":"open"}));
/// ```
pub fn encode_envelope(
    cmd: &str,
    sid: Option<&str>,
    token: Option<&str>,
    payload: Option<&Value>,
) -> Result<Vec<u8>, ProtocolError> {
    let data = payload
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    let envelope = OutboundEnvelope {
        cmd,
        sid,
        token,
        data,
    };
    serde_json::to_vec(&envelope).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decodes both layers of a datagram.
///
/// # Errors
///
/// Returns a format error if the outer document is not a JSON object, if
/// `cmd` or `data` is absent, or if `data` is not valid JSON text.
pub fn decode_envelope(bytes: &[u8]) -> Result<DecodedEnvelope, ProtocolError> {
    let raw: RawEnvelope =
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let cmd = raw.cmd.ok_or(ProtocolError::MissingField("cmd"))?;
    let payload = match raw.data.ok_or(ProtocolError::MissingField("data"))? {
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?,
        _ => {
            return Err(ProtocolError::InvalidPayload(
                "`data` must be a string-encoded JSON document".to_string(),
            ))
        }
    };

    Ok(DecodedEnvelope {
        cmd,
        model: raw.model,
        sid: raw.sid,
        token: raw.token.filter(|t| !t.is_empty()),
        payload,
    })
}

/// Decodes a datagram straight into a [`ReportMessage`].
///
/// # Errors
///
/// Any error of [`decode_envelope`] or [`DecodedEnvelope::into_report`].
pub fn decode_report(bytes: &[u8]) -> Result<ReportMessage, ProtocolError> {
    decode_envelope(bytes)?.into_report()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
