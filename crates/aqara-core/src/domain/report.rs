//! Decoded device status event.

use serde::Serialize;

use super::field::{FieldMap, FieldValue};

/// A device status, produced by command responses and by the multicast
/// report stream alike.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMessage {
    /// Device model tag, e.g. `"magnet"`, `"plug"`, `"gateway"`.
    pub model: String,
    /// Device identifier (`sid` on the wire).
    pub sid: String,
    /// Model-specific fields.
    pub data: FieldMap,
}

impl ReportMessage {
    pub fn new(model: impl Into<String>, sid: impl Into<String>, data: FieldMap) -> Self {
        Self {
            model: model.into(),
            sid: sid.into(),
            data,
        }
    }

    /// Looks up one payload field.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.data.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_present_field_and_none_for_absent() {
        // Arrange
        let mut data = FieldMap::new();
        data.insert("status".into(), "open".into());
        let report = ReportMessage::new("magnet", "158d0001", data);

        // Act / Assert
        assert_eq!(report.get("status").and_then(FieldValue::as_str), Some("open"));
        assert!(report.get("battery").is_none());
    }
}
