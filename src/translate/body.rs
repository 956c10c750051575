//! Inbound body normalization.
//!
//! Clients post JSON with a proper content type, or send the same JSON as
//! `text/plain`, or double-encode it as a JSON string. All three are resolved
//! here, once, into a single `serde_json::Value`. Anything undecodable becomes
//! an empty object.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum InboundBody {
    /// Body decoded as JSON because the content type said so.
    Parsed(Value),
    /// Body kept as text: non-JSON content type, or JSON that failed to decode.
    Raw(String),
}

impl InboundBody {
    pub fn from_bytes(content_type: Option<&str>, bytes: &[u8]) -> Self {
        let is_json = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));

        if is_json {
            if let Ok(value) = serde_json::from_slice(bytes) {
                return Self::Parsed(value);
            }
        }

        Self::Raw(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn resolve(self) -> Value {
        match self {
            Self::Parsed(Value::String(text)) | Self::Raw(text) => parse_or_empty(&text),
            Self::Parsed(value) => value,
        }
    }
}

fn parse_or_empty(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::Object(Map::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const JSON: Option<&str> = Some("application/json");

    #[test]
    fn test_json_content_type_parsed() {
        let body = InboundBody::from_bytes(JSON, br#"{"messages":[]}"#);
        assert_eq!(body, InboundBody::Parsed(json!({"messages": []})));
        assert_eq!(body.resolve(), json!({"messages": []}));
    }

    #[test]
    fn test_content_type_with_charset() {
        let body = InboundBody::from_bytes(Some("Application/JSON; charset=utf-8"), b"{}");
        assert!(matches!(body, InboundBody::Parsed(_)));
    }

    #[test]
    fn test_plain_text_body_is_decoded() {
        let body = InboundBody::from_bytes(Some("text/plain"), br#"{"messages":[{"role":"user"}]}"#);
        assert!(matches!(body, InboundBody::Raw(_)));
        assert_eq!(body.resolve(), json!({"messages": [{"role": "user"}]}));
    }

    #[test]
    fn test_double_encoded_string() {
        let body = InboundBody::from_bytes(JSON, br#""{\"messages\":[]}""#);
        assert_eq!(body.resolve(), json!({"messages": []}));
    }

    #[test]
    fn test_malformed_bodies_resolve_to_empty_object() {
        for (ct, bytes) in [
            (JSON, &b"{not json"[..]),
            (None, &b"hello"[..]),
            (JSON, &br#""still not json""#[..]),
            (None, &b""[..]),
            (None, &[0xff, 0xfe][..]),
        ] {
            assert_eq!(InboundBody::from_bytes(ct, bytes).resolve(), json!({}));
        }
    }
}
