//! JSON-RPC 2.0 message types
//!
//! Both ends of a jduo connection speak the same four shapes:
//!
//! - **Request**: a call that expects a reply (`{"jsonrpc":"2.0","method":..,"id":..}`)
//! - **Notification**: a call without an id, which never produces a reply
//! - **Wire response**: `result` or `error`, echoing the id of the call
//! - **Response**: the handler-facing outcome, `{result, error}` with `error == 0` on success
//!
//! Inbound envelopes are validated against the raw `serde_json::Value` by the processor, so
//! only the outbound shapes are typed structs here.

use crate::error::{Error, ErrorCode, ErrorObject, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Protocol version literal carried by every envelope
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation id of a request
///
/// jduo generates numeric ids for its own requests; string ids are accepted from peers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    String(String),
    Number(i64),
    Null,
}

impl Id {
    /// Read an id from a wire value
    ///
    /// Returns `None` for values that cannot be a correlation id we issued or echoed
    /// (objects, arrays, booleans, fractional numbers).
    pub fn from_value(value: &Value) -> Option<Id> {
        match value {
            Value::String(s) => Some(Id::String(s.clone())),
            Value::Number(n) => n.as_i64().map(Id::Number),
            Value::Null => Some(Id::Null),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Id::String(s) => Value::String(s.clone()),
            Id::Number(n) => Value::from(*n),
            Id::Null => Value::Null,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Number(n) => write!(f, "{}", n),
            Id::Null => write!(f, "null"),
        }
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n)
    }
}

/// Outbound request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: Id,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Id) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: normalize_params(params),
            id,
        }
    }
}

/// Outbound notification envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: normalize_params(params),
        }
    }
}

/// Wire response envelope
///
/// Exactly one of `result` and `error` is present. The id is kept as a raw value so that
/// whatever the caller sent (including fractional numbers) is echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(result: Value, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(error: ErrorObject, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome of a method call, as seen by handlers and by callers of `request`
///
/// On success `result` holds the serialized JSON result. On failure `error` holds the
/// non-zero error code and `result` carries the error message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub result: String,
    pub error: i32,
}

impl Response {
    /// Successful response from serialized JSON text
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            error: 0,
        }
    }

    /// Successful response from any serializable value
    pub fn from_value<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::ok(serde_json::to_string(value)?))
    }

    /// Failed response with an application or reserved error code
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            result: message.into(),
            error: code,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error == 0
    }

    pub fn is_error(&self) -> bool {
        self.error != 0
    }

    /// The result as a JSON value
    ///
    /// Text that is not valid JSON is taken as a plain string.
    pub fn result_value(&self) -> Value {
        serde_json::from_str(&self.result).unwrap_or_else(|_| Value::String(self.result.clone()))
    }

    /// Deserialize a successful result, or surface the error object
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        if self.is_error() {
            return Err(Error::Rpc(ErrorObject::new(self.error, self.result.clone())));
        }
        Ok(serde_json::from_value(self.result_value())?)
    }

    /// Build the caller-facing outcome from a wire response object
    ///
    /// `error` wins when present; otherwise the `result` member is serialized back to text.
    pub fn from_wire(object: &Map<String, Value>) -> Self {
        if let Some(error) = object.get("error").filter(|e| !e.is_null()) {
            // a zero code would read as success
            let code = error
                .get("code")
                .and_then(Value::as_i64)
                .and_then(|c| i32::try_from(c).ok())
                .filter(|c| *c != 0)
                .unwrap_or(ErrorCode::INTERNAL_ERROR);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Self::error(code, message);
        }
        let result = object.get("result").cloned().unwrap_or(Value::Null);
        Self::ok(result.to_string())
    }
}

/// Shape params for an outbound envelope
///
/// Objects and arrays pass through, `null` is omitted, and a scalar is wrapped in a
/// one-element array so that the envelope stays valid.
pub fn normalize_params(params: Option<Value>) -> Option<Value> {
    match params {
        None | Some(Value::Null) => None,
        Some(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        Some(scalar) => Some(Value::Array(vec![scalar])),
    }
}
