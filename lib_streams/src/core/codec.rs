//! # Frame Codec
//!
//! Turns one inbound text frame into an ordered list of message objects.
//!
//! Venues emit three shapes on the same socket: the bare control token
//! `PONG`, a single JSON object, or a JSON array of objects. All of them are
//! normalized here so the dispatcher only ever sees `Map<String, Value>`
//! values in wire order. Anything else is reported as [`Frame::Dropped`] and
//! never treated as an error.

use serde_json::{Map, Value};

/// Liveness acknowledgement sent by the venue.
pub const PONG_TOKEN: &str = "PONG";

/// Liveness probe text. Some relays echo the probe back verbatim, so an
/// inbound `PING` is discarded like a `PONG`.
pub const PING_TOKEN: &str = "PING";

/// One JSON message object as received on the wire.
pub type RawMessage = Map<String, Value>;

/// The normalized form of a single inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A liveness token (`PONG`, `"PONG"` or `{"type":"PONG"}`); carries no data.
    Control,
    /// Zero or more message objects in arrival order.
    Messages(Vec<RawMessage>),
    /// The frame could not be interpreted; the reason is for diagnostics only.
    Dropped(&'static str),
}

/// Decodes a text frame.
///
/// Non-object elements inside an array are skipped individually, so an array
/// mixing objects and scalars still yields its objects.
pub fn decode_frame(text: &str) -> Frame {
    let trimmed = text.trim();
    if is_control_token(trimmed) {
        return Frame::Control;
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => return Frame::Dropped("unparseable JSON"),
    };

    match value {
        Value::String(s) if is_control_token(&s) => Frame::Control,
        Value::Object(map) => {
            if is_control_object(&map) {
                Frame::Control
            } else {
                Frame::Messages(vec![map])
            }
        }
        Value::Array(items) => {
            let messages: Vec<RawMessage> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) if !is_control_object(&map) => Some(map),
                    _ => None,
                })
                .collect();
            Frame::Messages(messages)
        }
        _ => Frame::Dropped("unexpected JSON shape"),
    }
}

/// Decodes a binary frame by treating it as UTF-8 text.
pub fn decode_binary_frame(bytes: &[u8]) -> Frame {
    match std::str::from_utf8(bytes) {
        Ok(text) => decode_frame(text),
        Err(_) => Frame::Dropped("binary frame is not UTF-8"),
    }
}

fn is_control_token(text: &str) -> bool {
    text == PONG_TOKEN || text == PING_TOKEN
}

fn is_control_object(map: &RawMessage) -> bool {
    map.get("type")
        .and_then(Value::as_str)
        .is_some_and(is_control_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_pong_is_control() {
        assert_eq!(decode_frame("PONG"), Frame::Control);
        assert_eq!(decode_frame("  PONG\n"), Frame::Control);
    }

    #[test]
    fn test_control_tokens_match_exactly() {
        assert_eq!(decode_frame("PING"), Frame::Control);
        assert_eq!(decode_frame("\"PING\""), Frame::Control);
        assert!(matches!(decode_frame("pong"), Frame::Dropped(_)));
        assert!(matches!(decode_frame("\"Pong\""), Frame::Dropped(_)));
        assert!(matches!(
            decode_frame(r#"{"type":"pong","n":1}"#),
            Frame::Messages(ref msgs) if msgs.len() == 1
        ));
    }

    #[test]
    fn test_json_string_and_object_pong_are_control() {
        assert_eq!(decode_frame("\"PONG\""), Frame::Control);
        assert_eq!(decode_frame(r#"{"type":"PONG"}"#), Frame::Control);
    }

    #[test]
    fn test_object_and_single_element_array_normalize_identically() {
        let object = decode_frame(r#"{"event_type":"book","asset_id":"1"}"#);
        let array = decode_frame(r#"[{"event_type":"book","asset_id":"1"}]"#);
        assert_eq!(object, array);
        match object {
            Frame::Messages(msgs) => {
                assert_eq!(msgs.len(), 1);
                assert_eq!(msgs[0].get("asset_id"), Some(&json!("1")));
            }
            other => panic!("expected messages, got {:?}", other),
        }
    }

    #[test]
    fn test_array_keeps_order_and_skips_non_objects() {
        let frame = decode_frame(r#"[{"n":1}, 7, "x", null, {"n":2}, {"type":"PONG"}, {"n":3}]"#);
        let Frame::Messages(msgs) = frame else {
            panic!("expected messages");
        };
        let ns: Vec<i64> = msgs.iter().map(|m| m["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![1, 2, 3]);
    }

    #[test]
    fn test_malformed_and_scalar_frames_are_dropped() {
        assert!(matches!(decode_frame("{not json"), Frame::Dropped(_)));
        assert!(matches!(decode_frame("42"), Frame::Dropped(_)));
        assert!(matches!(decode_frame("\"HELLO\""), Frame::Dropped(_)));
        assert!(matches!(decode_frame(""), Frame::Dropped(_)));
    }

    #[test]
    fn test_empty_array_yields_no_messages() {
        assert_eq!(decode_frame("[]"), Frame::Messages(vec![]));
    }

    #[test]
    fn test_binary_frame_decodes_as_text() {
        assert_eq!(decode_binary_frame(b"PONG"), Frame::Control);
        assert!(matches!(decode_binary_frame(&[0xff, 0xfe]), Frame::Dropped(_)));
    }
}
