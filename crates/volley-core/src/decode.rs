//! Two-stage payload decoding.
//!
//! The endpoint answers with a JSON *string* whose contents are themselves a
//! JSON object, e.g. `"{\"a\":1}"`. Stage one parses the body into that
//! string, stage two parses the string into a [`Record`]. An inner `{}` is
//! the "no data" sentinel.

use thiserror::Error;

use crate::models::{Payload, Record};

/// Why a payload could not be turned into a record.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Body is not valid JSON at all.
    #[error("outer payload is not valid JSON: {0}")]
    OuterNotJson(#[source] serde_json::Error),

    /// Body is JSON, but not a string wrapping the record.
    #[error("outer payload is not a JSON string (found {found})")]
    OuterNotString { found: String },

    /// Wrapped string is not valid JSON.
    #[error("inner payload is not valid JSON: {0}")]
    InnerNotJson(#[source] serde_json::Error),

    /// Wrapped JSON is not an object.
    #[error("inner payload is not a JSON object (found {found})")]
    InnerNotObject { found: String },
}

/// Result of decoding one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Record(Record),
    Sentinel,
}

/// Decode a double-encoded payload.
pub fn decode_payload(payload: &Payload) -> Result<Decoded, DecodeError> {
    let outer: serde_json::Value =
        serde_json::from_slice(payload.as_bytes()).map_err(DecodeError::OuterNotJson)?;

    let inner_text = match outer {
        serde_json::Value::String(text) => text,
        other => {
            return Err(DecodeError::OuterNotString {
                found: kind(&other).to_string(),
            });
        }
    };

    let inner: serde_json::Value =
        serde_json::from_str(&inner_text).map_err(DecodeError::InnerNotJson)?;

    match inner {
        serde_json::Value::Object(map) if map.is_empty() => Ok(Decoded::Sentinel),
        serde_json::Value::Object(map) => Ok(Decoded::Record(map)),
        other => Err(DecodeError::InnerNotObject {
            found: kind(&other).to_string(),
        }),
    }
}

/// Encode a record the way the endpoint does. Handy for fixtures.
pub fn encode_record(record: &serde_json::Value) -> Payload {
    let inner = record.to_string();
    // A `String` always serializes.
    let outer = serde_json::Value::String(inner).to_string();
    Payload(outer.into_bytes())
}

fn kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_double_encoded_object() {
        let payload = Payload::from(r#""{\"a\":1,\"b\":\"two\"}""#);
        let Decoded::Record(record) = decode_payload(&payload).unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(record.get("a"), Some(&json!(1)));
        assert_eq!(record.get("b"), Some(&json!("two")));
    }

    #[test]
    fn test_inner_key_order_is_preserved() {
        let payload = encode_record(&json!({"uptime": 1.5, "boot_id": "x", "cpu": 4}));
        let Decoded::Record(record) = decode_payload(&payload).unwrap() else {
            panic!("expected a record");
        };
        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        assert_eq!(keys, ["uptime", "boot_id", "cpu"]);
    }

    #[test]
    fn test_empty_object_is_sentinel() {
        assert_eq!(
            decode_payload(&Payload::from(r#""{}""#)).unwrap(),
            Decoded::Sentinel
        );
        assert_eq!(
            decode_payload(&Payload::from(r#""{ }""#)).unwrap(),
            Decoded::Sentinel
        );
    }

    #[test]
    fn test_outer_garbage_is_rejected() {
        let err = decode_payload(&Payload::from("<html>502</html>")).unwrap_err();
        assert!(matches!(err, DecodeError::OuterNotJson(_)));
    }

    #[test]
    fn test_single_encoded_object_is_rejected() {
        let err = decode_payload(&Payload::from(r#"{"a":1}"#)).unwrap_err();
        assert!(matches!(err, DecodeError::OuterNotString { ref found } if found == "object"));
    }

    #[test]
    fn test_inner_garbage_is_rejected() {
        let err = decode_payload(&Payload::from(r#""not json""#)).unwrap_err();
        assert!(matches!(err, DecodeError::InnerNotJson(_)));
    }

    #[test]
    fn test_inner_array_is_rejected() {
        let err = decode_payload(&Payload::from(r#""[1,2]""#)).unwrap_err();
        assert!(matches!(err, DecodeError::InnerNotObject { ref found } if found == "array"));
    }
}
