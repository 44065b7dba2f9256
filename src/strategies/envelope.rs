//! # Peer wire format.
//!
//! Messages between peers are JSON objects, told apart by their keys:
//!
//! ```text
//! publication : {"event": "a:x", "payload": 42, "sync": false}
//! request     : {"query": "q:sum", "params": [2, 3], "id": "…"}
//! response    : {"queryResponse": "q:sum", "payload": 5, "id": "…"}
//! ```
//!
//! `id` is optional in both directions. Responses echo the request's `id`;
//! peers that send none are matched by query name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TramError;

/// One publication of an event, as passed to strategies and over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    /// `true` for `publish_sync`.
    #[serde(default)]
    pub sync: bool,
}

impl Publication {
    pub fn new(event: impl Into<String>, payload: Value, sync: bool) -> Self {
        Self {
            event: event.into(),
            payload,
            sync,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(rename = "queryResponse")]
    pub query_response: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Any message a peer can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Publication(Publication),
    Request(QueryRequest),
    Response(QueryResponse),
}

impl Envelope {
    pub fn encode(&self) -> Result<String, TramError> {
        serde_json::to_string(self).map_err(|e| TramError::codec("envelope", e))
    }

    pub fn decode(text: &str) -> Result<Self, TramError> {
        serde_json::from_str(text).map_err(|e| TramError::codec("envelope", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shapes_are_told_apart_by_keys() {
        let p = Envelope::decode(r#"{"event":"a:x","payload":1,"sync":true}"#).unwrap();
        assert_eq!(p, Envelope::Publication(Publication::new("a:x", json!(1), true)));

        let q = Envelope::decode(r#"{"query":"q:sum","params":[2,3]}"#).unwrap();
        assert!(matches!(q, Envelope::Request(QueryRequest { ref query, id: None, .. }) if query == "q:sum"));

        let r = Envelope::decode(r#"{"queryResponse":"q:sum","payload":5,"id":"t1"}"#).unwrap();
        match r {
            Envelope::Response(resp) => {
                assert_eq!(resp.query_response, "q:sum");
                assert_eq!(resp.payload, json!(5));
                assert_eq!(resp.id.as_deref(), Some("t1"));
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn missing_payload_and_sync_default() {
        let p = Envelope::decode(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(p, Envelope::Publication(Publication::new("ping", Value::Null, false)));
    }

    #[test]
    fn encoding_uses_wire_keys() {
        let text = Envelope::Response(QueryResponse {
            query_response: "q".into(),
            payload: json!([1]),
            id: None,
        })
        .encode()
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({ "queryResponse": "q", "payload": [1] }));
    }

    #[test]
    fn garbage_is_a_codec_error() {
        assert_eq!(Envelope::decode("{\"nope\":1}").unwrap_err().as_label(), "codec_error");
        assert_eq!(Envelope::decode("not json").unwrap_err().as_label(), "codec_error");
    }
}
