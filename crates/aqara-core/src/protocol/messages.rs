//! Request shapes sent to a gateway and the `iam` discovery announcement.
//!
//! Requests are small enough that each one is a fixed JSON shape:
//!
//! ```text
//! {"cmd":"whois"}
//! {"cmd":"get_id_list"}
//! {"cmd":"read","sid":"158d0001"}
//! {"cmd":"write","sid":"158d0001","data":{"status":"on","key":"3eb43e37..."}}
//! ```
//!
//! A `write` carries its fields inline (not string-encoded) with the derived
//! write key added under `key`.

use serde::Deserialize;
use serde_json::{json, Value};

use super::constants::{cmd, KEY_FIELD};
use super::ProtocolError;
use crate::domain::field::{fields_to_object, FieldMap};

/// A command sent to a gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum Request<'a> {
    /// Discovery query, multicast to every gateway.
    WhoIs,
    /// Ask the gateway for the ids of its sub-devices.
    GetIdList,
    /// Ask for one device's current status.
    Read { sid: &'a str },
    /// Change attributes of one device.  `key` is the derived write key,
    /// empty when no password is configured.
    Write {
        sid: &'a str,
        data: &'a FieldMap,
        key: &'a str,
    },
}

impl Request<'_> {
    /// The `cmd` value of this request.
    pub fn command(&self) -> &'static str {
        match self {
            Request::WhoIs => cmd::WHOIS,
            Request::GetIdList => cmd::GET_ID_LIST,
            Request::Read { .. } => cmd::READ,
            Request::Write { .. } => cmd::WRITE,
        }
    }

    /// Builds the JSON document for this request.
    pub fn to_json(&self) -> Value {
        match self {
            Request::WhoIs | Request::GetIdList => json!({ "cmd": self.command() }),
            Request::Read { sid } => json!({ "cmd": self.command(), "sid": sid }),
            Request::Write { sid, data, key } => {
                let mut fields = fields_to_object(data);
                fields.insert(KEY_FIELD.to_string(), Value::String((*key).to_string()));
                json!({ "cmd": self.command(), "sid": sid, "data": fields })
            }
        }
    }

    /// Serializes the request to datagram bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(&self.to_json()).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// Reply to a `whois` query.
///
/// ```text
/// {"cmd":"iam","port":"9898","sid":"f0b429aa1463","model":"gateway",
///  "proto_version":"1.0.9","ip":"192.168.1.20"}
/// ```
///
/// The `ip` member is informational only; callers use the datagram's source
/// address instead.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IamMessage {
    #[serde(default)]
    pub cmd: Option<String>,
    pub sid: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub port: Option<String>,
    #[serde(default)]
    pub proto_version: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

impl IamMessage {
    /// Decodes an announcement datagram.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::InvalidJson`] for non-JSON input and
    /// [`ProtocolError::MissingField`] if `sid` is absent.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        if value.get("sid").and_then(Value::as_str).is_none() {
            return Err(ProtocolError::MissingField("sid"));
        }
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
    }
}

/// Firmware versions disagree on whether `port` is `"9898"` or `9898`.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
