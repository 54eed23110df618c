//! Data model shared by storage, the matcher, the forwarder, and the admin plane.
//!
//! Bodies are modeled as the three-way tagged sum the design notes call for:
//! absent, raw bytes/string, or a decoded JSON tree. `null` inside a JSON tree
//! is a `Body::Json(Value::Null)`, distinct from `Body::Absent`.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Body {
    Absent,
    Raw(String),
    Json(serde_json::Value),
}

impl Body {
    pub fn is_absent(&self) -> bool {
        matches!(self, Body::Absent)
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Body::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Re-serializes the body for wire emission; JSON trees are re-encoded
    /// (no byte-exact guarantee, per the documented wire semantics).
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Body::Absent => Vec::new(),
            Body::Raw(s) => s.clone().into_bytes(),
            Body::Json(v) => serde_json::to_vec(v).unwrap_or_default(),
        }
    }

    /// Decodes a raw byte buffer according to its declared content type.
    /// JSON and URL-encoded payloads both decode to `Body::Json`; anything
    /// else, or a JSON/form body that fails to parse, falls back to raw text.
    pub fn decode(bytes: &[u8], content_type: Option<&str>) -> Body {
        if bytes.is_empty() {
            return Body::Absent;
        }
        let ct = content_type.unwrap_or("").to_ascii_lowercase();
        if ct.contains("application/json") {
            if let Ok(v) = serde_json::from_slice::<serde_json::Value>(bytes) {
                return Body::Json(v);
            }
        } else if ct.contains("application/x-www-form-urlencoded") {
            let pairs: Vec<(String, String)> =
                serde_urlencoded::from_bytes(bytes).unwrap_or_default();
            if !pairs.is_empty() {
                let mut map = serde_json::Map::new();
                for (k, v) in pairs {
                    map.insert(k, serde_json::Value::String(v));
                }
                return Body::Json(serde_json::Value::Object(map));
            }
        }
        match std::str::from_utf8(bytes) {
            Ok(s) => Body::Raw(s.to_owned()),
            Err(_) => Body::Raw(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub method: String,
    pub url: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: Body,
    pub id: String,
    pub captured_at: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Body,
    pub captured_at: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedEntry {
    pub id: String,
    pub request: RequestRecord,
    pub response: ResponseRecord,
    pub created_at: i64,
}

/// Monotonic-prefixed identifier: millisecond epoch followed by a random
/// suffix, so ids sort lexicographically in insertion order while staying
/// unique across rapid successive calls within the same millisecond.
pub fn generate_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: String = {
        let mut rng = rand::thread_rng();
        (0..8)
            .map(|_| {
                const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
                ALPHABET[rng.gen_range(0..ALPHABET.len())] as char
            })
            .collect()
    };
    format!("{millis:x}-{suffix}")
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Lowercases a header name and comma-joins repeated values, per §3.
pub fn headers_to_map(headers: &http::HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers.iter() {
        let v = value.to_str().unwrap_or("").to_owned();
        map.entry(name.as_str().to_ascii_lowercase())
            .or_default()
            .push(v);
    }
    map.into_iter()
        .map(|(k, vs)| (k, vs.join(", ")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_json_body() {
        let b = Body::decode(br#"{"a":1}"#, Some("application/json"));
        assert_eq!(b, Body::Json(serde_json::json!({"a": 1})));
    }

    #[test]
    fn decode_empty_is_absent() {
        assert_eq!(Body::decode(b"", Some("application/json")), Body::Absent);
    }

    #[test]
    fn decode_form_urlencoded() {
        let b = Body::decode(b"a=1&b=two", Some("application/x-www-form-urlencoded"));
        assert_eq!(b, Body::Json(serde_json::json!({"a": "1", "b": "two"})));
    }

    #[test]
    fn decode_invalid_json_falls_back_to_raw() {
        let b = Body::decode(b"not json", Some("application/json"));
        assert_eq!(b, Body::Raw("not json".to_string()));
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
    }
}
