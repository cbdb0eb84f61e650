//! Integration tests for the aqara-core envelope codec.
//!
//! These tests drive the public API with datagrams shaped like real gateway
//! traffic and check that the open field mapping survives a decode followed
//! by a re-encode of the inner payload.

use aqara_core::domain::field::fields_to_object;
use aqara_core::protocol::constants::cmd;
use aqara_core::{
    decode_envelope, decode_report, derive_auth_token, encode_envelope, FieldValue, ProtocolError,
    Request,
};
use serde_json::{json, Value};

/// Decodes `bytes`, re-encodes the decoded fields as a new report envelope,
/// decodes that again and returns both payload objects.
fn reencode(bytes: &[u8]) -> (Value, Value) {
    let first = decode_report(bytes).expect("first decode");
    let payload = Value::Object(fields_to_object(&first.data));
    let again = encode_envelope(cmd::REPORT, Some(first.sid.as_str()), None, Some(&payload)).expect("encode");
    let second = decode_report(&again).expect("second decode");
    (
        Value::Object(fields_to_object(&first.data)),
        Value::Object(fields_to_object(&second.data)),
    )
}

#[test]
fn test_plug_status_round_trips() {
    let bytes = br#"{"cmd":"read_ack","model":"plug","sid":"158d0002","short_id":1,"data":"{\"voltage\":3600,\"status\":\"on\",\"inuse\":\"1\",\"power_consumed\":\"48\",\"load_power\":\"3.20\"}"}"#;

    let (first, second) = reencode(bytes);

    assert_eq!(first, second);
    assert_eq!(
        first,
        json!({"voltage":3600,"status":"on","inuse":"1","power_consumed":"48","load_power":"3.20"})
    );
}

#[test]
fn test_gateway_heartbeat_round_trips() {
    let bytes = br#"{"cmd":"heartbeat","model":"gateway","sid":"f0b429aa1463","short_id":"0","token":"1234567890abcdef","data":"{\"ip\":\"192.168.1.20\",\"rgb\":0,\"illumination\":1292}"}"#;

    let (first, second) = reencode(bytes);

    assert_eq!(first, second);
    assert_eq!(first["illumination"], 1292);
}

#[test]
fn test_float_and_bool_fields_round_trip() {
    let payload = json!({"temperature": 21.5, "alarm": false, "ids": ["a", "b"]});
    let bytes = encode_envelope(cmd::REPORT, Some("x"), None, Some(&payload)).unwrap();

    let (first, second) = reencode(&bytes);

    assert_eq!(first, payload);
    assert_eq!(second, payload);
}

#[test]
fn test_magnet_scenario() {
    // Arrange
    let bytes = br#"{"cmd":"report","model":"magnet","sid":"158d000123","data":"{\"status\":\"open\"}"}"#;

    // Act
    let report = decode_report(bytes).unwrap();

    // Assert
    assert_eq!(report.model, "magnet");
    assert_eq!(report.sid, "158d000123");
    assert_eq!(report.data.len(), 1);
    assert_eq!(report.get("status"), Some(&FieldValue::Str("open".into())));
}

#[test]
fn test_invalid_key_scenario_is_a_device_error_not_a_report() {
    let bytes = br#"{"cmd":"write_ack","model":"gateway","sid":"f0b4","data":"{\"error\":\"invalid_key\"}"}"#;

    let result = decode_report(bytes);

    assert_eq!(
        result,
        Err(ProtocolError::Device {
            message: "invalid_key".into()
        })
    );
}

#[test]
fn test_double_encoding_is_preserved_on_the_wire() {
    // The outer `data` member must be a JSON string whose content is JSON.
    let bytes = encode_envelope(cmd::REPORT, Some("x"), None, Some(&json!({"status":"close"}))).unwrap();
    let text = String::from_utf8(bytes).unwrap();

    assert!(text.contains(r#""data":"{\"status\":\"close\"}""#), "got {text}");
}

#[test]
fn test_id_list_keeps_order() {
    let bytes = br#"{"cmd":"get_id_list_ack","sid":"f0b4","token":"t","data":"[\"c\",\"a\",\"b\"]"}"#;

    let ids = decode_envelope(bytes).unwrap().into_id_list().unwrap();

    assert_eq!(ids, ["c", "a", "b"]);
}

#[test]
fn test_write_request_carries_derived_key() {
    // Arrange
    let key = derive_auth_token("0987654321qwerty", "1234567890abcdef");
    let mut data = aqara_core::FieldMap::new();
    data.insert("status".into(), "on".into());

    // Act
    let bytes = Request::Write {
        sid: "158d0002",
        data: &data,
        key: &key,
    }
    .encode()
    .unwrap();
    let sent: Value = serde_json::from_slice(&bytes).unwrap();

    // Assert
    assert_eq!(sent["cmd"], "write");
    assert_eq!(sent["data"]["key"], "3eb43e37c20aff4c5872cc0d04d81314");
    assert_eq!(sent["data"]["status"], "on");
}
