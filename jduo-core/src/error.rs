//! Error types for jduo
//!
//! Two layers of errors live here:
//!
//! - **Error**: what jduo operations return to Rust callers (uses thiserror)
//! - **ErrorObject**: the `error` member of a JSON-RPC 2.0 response on the wire
//!
//! # Error Codes
//!
//! The reserved codes are named in [`ErrorCode`]:
//! - `-32700`: Parse error (the message is not a JSON object or array)
//! - `-32600`: Invalid Request (envelope violation or empty batch)
//! - `-32601`: Method not found
//! - `-32602`: Invalid params (for handler use)
//! - `-32603`: Internal error
//!
//! Any other code is application-defined and passes through the engine verbatim.
//!
//! # Examples
//!
//! ```rust
//! use jduo_core::{Error, ErrorCode, ErrorObject};
//!
//! let wire = ErrorObject::method_not_found();
//! assert_eq!(wire.code, ErrorCode::METHOD_NOT_FOUND);
//!
//! let error = Error::InvalidParams("expected an object".into());
//! assert_eq!(error.to_error_object().code, ErrorCode::INVALID_PARAMS);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for jduo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reserved JSON-RPC 2.0 error codes
#[derive(Debug, Clone, Copy)]
pub struct ErrorCode;

impl ErrorCode {
    /// The top-level message is neither a JSON object nor a JSON array
    pub const PARSE_ERROR: i32 = -32700;
    /// The envelope violates the request invariants, or the batch is empty
    pub const INVALID_REQUEST: i32 = -32600;
    /// No handler is bound under the requested name
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Reserved for handlers rejecting their params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Reserved for failures inside the engine or a handler
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Application-level error type for jduo operations
///
/// # Error Categories
///
/// - **Protocol errors**: Rpc, InvalidParams
/// - **Transport errors**: WebSocket, Io, ConnectionClosed
/// - **Processing errors**: Serialization, Internal
/// - **Request lifecycle**: Timeout, Cancelled
/// - **Configuration errors**: ReservedMethod, BatchSizeExceeded, EmptyBatch
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// An error object received from (or destined for) the remote peer
    #[error("JSON-RPC error: {0}")]
    Rpc(#[from] ErrorObject),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(String),

    /// A handler could not make sense of its params
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Internal failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Attempt to bind a method under the reserved `rpc.` prefix
    ///
    /// Raised synchronously by every registration entry point; it never reaches the wire.
    #[error("Method names starting with 'rpc.' are reserved: {0}")]
    ReservedMethod(String),

    /// The request did not receive a response in time
    #[error("Request timeout")]
    Timeout,

    /// The pending request was cancelled locally
    #[error("Request cancelled")]
    Cancelled,

    /// The connection closed while the request was outstanding
    #[error("Connection closed")]
    ConnectionClosed,

    /// A batch exceeds the configured maximum size
    #[error("Batch size limit exceeded: limit={limit}, actual={actual}")]
    BatchSizeExceeded {
        /// Maximum allowed batch size
        limit: usize,
        /// Actual batch size
        actual: usize,
    },

    /// An outbound batch with no calls in it
    #[error("Batch must contain at least one call")]
    EmptyBatch,
}

impl Error {
    /// Map this error onto the wire error object sent back to a caller
    ///
    /// Error objects carried by [`Error::Rpc`] pass through unchanged. Everything that is not a
    /// params problem becomes an internal error.
    pub fn to_error_object(&self) -> ErrorObject {
        match self {
            Error::Rpc(object) => object.clone(),
            Error::InvalidParams(msg) => ErrorObject::new(ErrorCode::INVALID_PARAMS, msg.clone()),
            Error::BatchSizeExceeded { limit, actual } => {
                ErrorObject::batch_size_exceeded(*limit, *actual)
            }
            other => ErrorObject::new(ErrorCode::INTERNAL_ERROR, other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// JSON-RPC 2.0 error object
///
/// ```json
/// {"code": -32601, "message": "Method not found"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Error code
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Optional structured detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorObject {
    /// Create an error object with a code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error object carrying structured detail
    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn parse_error() -> Self {
        Self::new(ErrorCode::PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(ErrorCode::INVALID_REQUEST, "Invalid Request")
    }

    pub fn method_not_found() -> Self {
        Self::new(ErrorCode::METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params() -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, "Invalid params")
    }

    pub fn internal_error() -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, "Internal error")
    }

    /// Invalid Request raised for a batch above the configured limit
    pub fn batch_size_exceeded(limit: usize, actual: usize) -> Self {
        Self::new(
            ErrorCode::INVALID_REQUEST,
            format!("Batch size limit exceeded: limit={}, actual={}", limit, actual),
        )
    }
}

impl std::fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorObject {}
