//! Open field mapping for device payloads.
//!
//! A door magnet reports `{"status":"open"}`, a plug reports
//! `{"status":"on","load_power":"3.20"}`, a gateway reports
//! `{"rgb":0,"illumination":320}`.  Instead of one record type per model we
//! keep a map from field name to a tagged scalar.
//!
//! # Numbers encoded as strings
//!
//! Some firmware sends numeric readings as JSON strings (`"battery":"3000"`).
//! The value is stored as received so re-encoding is lossless; the
//! [`FieldValue::as_i64`] / [`FieldValue::as_f64`] accessors parse either form.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Field name → value mapping of one device payload.
///
/// A `BTreeMap` keeps iteration (and therefore log and JSON output) order
/// stable.  An absent field is simply not in the map.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// One decoded payload value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Arrays and nested objects, kept verbatim.
    Json(Value),
}

impl FieldValue {
    /// Converts a JSON value.  `null` maps to `None` (field absent).
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(FieldValue::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(FieldValue::Int(i)),
                None => n.as_f64().map(FieldValue::Float),
            },
            Value::String(s) => Some(FieldValue::Str(s)),
            other => Some(FieldValue::Json(other)),
        }
    }

    /// Converts back to the JSON value it was decoded from.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Str(s) => Value::String(s.clone()),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Json(v) => v.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; numeric strings are parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float view; integers widen and numeric strings are parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Infers a value from command-line text: integer, then float, then
    /// `true`/`false`, otherwise a string.
    pub fn parse_lossy(text: &str) -> Self {
        if let Ok(i) = text.parse::<i64>() {
            FieldValue::Int(i)
        } else if let Ok(f) = text.parse::<f64>() {
            FieldValue::Float(f)
        } else if let Ok(b) = text.parse::<bool>() {
            FieldValue::Bool(b)
        } else {
            FieldValue::Str(text.to_string())
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<u32> for FieldValue {
    fn from(i: u32) -> Self {
        FieldValue::Int(i64::from(i))
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Builds a [`FieldMap`] from a JSON object, dropping `null` members.
pub fn fields_from_object(object: serde_json::Map<String, Value>) -> FieldMap {
    object
        .into_iter()
        .filter_map(|(name, value)| FieldValue::from_json(value).map(|v| (name, v)))
        .collect()
}

/// Builds the JSON object for a [`FieldMap`].
pub fn fields_to_object(fields: &FieldMap) -> serde_json::Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
