//! Encoding and decoding of JSON-RPC messages
//!
//! Decoding never fails: inbound text is sorted into one of the three shapes the
//! processor cares about (object, array, or anything else), and the "anything else"
//! bucket covers both malformed JSON and top-level scalars.
//!
//! # Example
//!
//! ```rust
//! use jduo_core::codec::{self, Decoded};
//!
//! assert!(matches!(codec::decode(r#"{"jsonrpc":"2.0","method":"ping"}"#), Decoded::Object(_)));
//! assert!(matches!(codec::decode("[1, 2]"), Decoded::Array(_)));
//! assert!(matches!(codec::decode("42"), Decoded::Invalid));
//! assert!(matches!(codec::decode("not json"), Decoded::Invalid));
//! ```

use crate::error::Result;
use crate::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use serde::Serialize;
use serde_json::{Map, Value};

/// Top-level shape of an inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A single call or response
    Object(Map<String, Value>),
    /// A batch
    Array(Vec<Value>),
    /// Malformed JSON, or a JSON value that is neither an object nor an array
    Invalid,
}

/// Sort raw text into its top-level shape
pub fn decode(data: &str) -> Decoded {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(object)) => Decoded::Object(object),
        Ok(Value::Array(items)) => Decoded::Array(items),
        _ => Decoded::Invalid,
    }
}

/// Serialize any message to compact JSON text
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    Ok(serde_json::to_string(msg)?)
}

pub fn encode_request(req: &JsonRpcRequest) -> Result<String> {
    encode(req)
}

pub fn encode_notification(notif: &JsonRpcNotification) -> Result<String> {
    encode(notif)
}

pub fn encode_response(resp: &JsonRpcResponse) -> Result<String> {
    encode(resp)
}

pub fn encode_batch_responses(responses: &[JsonRpcResponse]) -> Result<String> {
    encode(&responses)
}

/// Serialized params handed to handlers: compact JSON, or the empty string when absent
pub fn params_text(params: Option<&Value>) -> String {
    params.map(Value::to_string).unwrap_or_default()
}

/// Whether an object is a reply rather than a call
///
/// A reply never names a method and always carries `result` or `error`.
pub fn is_response_shaped(object: &Map<String, Value>) -> bool {
    !object.contains_key("method") && (object.contains_key("result") || object.contains_key("error"))
}

/// Whether a whole message consists of replies (a single reply, or a batch of them)
pub fn is_reply(decoded: &Decoded) -> bool {
    match decoded {
        Decoded::Object(object) => is_response_shaped(object),
        Decoded::Array(items) => {
            !items.is_empty()
                && items
                    .iter()
                    .all(|item| item.as_object().is_some_and(is_response_shaped))
        }
        Decoded::Invalid => false,
    }
}
