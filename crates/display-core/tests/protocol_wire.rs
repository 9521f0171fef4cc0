//! Wire-shape tests for the JSON protocol.
//!
//! The control server is not written in Rust, so these tests pin the exact
//! JSON produced for each outbound message rather than relying on our own
//! decoder to agree with our own encoder.

use std::collections::BTreeMap;

use display_core::protocol::messages::{RegisterMessage, StateReport};
use display_core::{
    decode_inbound, encode_outbound, Bounds, Display, DisplayId, InboundMessage, OutboundMessage,
};
use serde_json::{json, Value};

fn to_value(msg: &OutboundMessage) -> Value {
    let text = encode_outbound(msg).expect("encode");
    serde_json::from_str(&text).expect("encoder must emit valid JSON")
}

#[test]
fn test_register_message_wire_shape() {
    // Arrange
    let msg = OutboundMessage::Register(RegisterMessage {
        device_id: "4c4c4544-0042".to_string(),
        device_name: "lobby-wall".to_string(),
        displays: vec![
            Display::new(1, Bounds::new(0, 0, 1920, 1080)),
            Display::new(2, Bounds::new(1920, 0, 1080, 1920)),
        ],
    });

    // Act
    let value = to_value(&msg);

    // Assert
    assert_eq!(
        value,
        json!({
            "type": "REGISTER",
            "deviceId": "4c4c4544-0042",
            "deviceName": "lobby-wall",
            "displays": [
                { "id": 1, "bounds": { "x": 0, "y": 0, "width": 1920, "height": 1080 } },
                { "id": 2, "bounds": { "x": 1920, "y": 0, "width": 1080, "height": 1920 } }
            ]
        })
    );
}

#[test]
fn test_state_report_wire_shape_uses_string_keys() {
    // Arrange
    let mut map = BTreeMap::new();
    map.insert(DisplayId(2), "https://b.example".to_string());
    map.insert(DisplayId(1), "https://a.example".to_string());
    let msg = OutboundMessage::OpenScreenReturn(StateReport {
        remote_display_url_map: map,
    });

    // Act
    let value = to_value(&msg);

    // Assert
    assert_eq!(
        value,
        json!({
            "type": "OPEN_SCREEN_RETURN",
            "remoteDisplayUrlMap": {
                "1": "https://a.example",
                "2": "https://b.example"
            }
        })
    );
}

#[test]
fn test_empty_state_report_still_carries_the_map() {
    let value = to_value(&OutboundMessage::OpenScreenReturn(StateReport::default()));
    assert_eq!(value["remoteDisplayUrlMap"], json!({}));
}

#[test]
fn test_server_side_parse_of_state_report_recovers_display_ids() {
    // The control server's view: read the map back and key it by display.
    let frame = r#"{"type":"OPEN_SCREEN_RETURN","remoteDisplayUrlMap":{"7":"https://x"}}"#;

    let parsed: OutboundMessage = serde_json::from_str(frame).expect("parse");

    match parsed {
        OutboundMessage::OpenScreenReturn(report) => {
            assert_eq!(
                report.remote_display_url_map.get(&DisplayId(7)).map(String::as_str),
                Some("https://x")
            );
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

#[test]
fn test_inbound_frames_ignore_extra_fields() {
    let frame = r#"{"type":"OPEN_SCREEN","displayId":1,"url":"https://a","sentAt":123}"#;
    let msg = decode_inbound(frame).expect("decode");
    assert!(matches!(msg, InboundMessage::OpenScreen(_)));
}
