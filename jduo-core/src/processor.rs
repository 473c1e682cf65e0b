//! Inbound request processing
//!
//! [`Processor`] turns one inbound text message into at most one reply:
//!
//! 1. Text that is not a JSON object or array gets a Parse error with a null id
//! 2. An object is validated as a single call and dispatched to the registry
//! 3. An array is handed to the [`BatchProcessor`]
//!
//! Calls without an id are notifications. Their handlers still run, but nothing is
//! sent back, whatever the outcome. The one exception is an object so malformed that it
//! does not even name a method: it gets an Invalid Request reply with a null id.
//!
//! # Example
//!
//! ```rust
//! use jduo_core::{Processor, Registry, Response};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let registry = Registry::new();
//! registry.bind("double", |params| {
//!     let n: i64 = serde_json::from_str::<Vec<i64>>(params).ok()
//!         .and_then(|v| v.first().copied())
//!         .unwrap_or_default();
//!     Response::ok((n * 2).to_string())
//! }).unwrap();
//!
//! let processor = Processor::new(registry);
//! let reply = processor
//!     .process(r#"{"jsonrpc":"2.0","method":"double","params":[21],"id":1}"#)
//!     .await;
//! assert_eq!(reply.as_deref(), Some(r#"{"jsonrpc":"2.0","result":42,"id":1}"#));
//! # }
//! ```

use crate::batch::{BatchMode, BatchProcessor};
use crate::codec::{self, Decoded};
use crate::error::{ErrorCode, ErrorObject, Result};
use crate::handler::{Caller, Handler, Responder};
use crate::metrics::RpcMetrics;
use crate::registry::Registry;
use crate::types::{JsonRpcResponse, Response, JSONRPC_VERSION};
use serde_json::{Map, Value};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Reply to one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

impl Reply {
    pub fn encode(&self) -> Result<String> {
        match self {
            Reply::Single(response) => codec::encode_response(response),
            Reply::Batch(responses) => codec::encode_batch_responses(responses),
        }
    }
}

/// A call that passed envelope validation
struct Call<'a> {
    method: &'a str,
    params: Option<&'a Value>,
    id: Value,
}

/// Check the envelope invariants of a single call
///
/// `Err(None)` means the call is invalid but notification-shaped and gets no reply;
/// `Err(Some(id))` means an Invalid Request reply is owed under `id`.
fn validate(command: &Map<String, Value>) -> std::result::Result<Call<'_>, Option<Value>> {
    let id = command.get("id").cloned().unwrap_or(Value::Null);
    let id_valid = matches!(id, Value::Null | Value::String(_) | Value::Number(_));
    let version_valid = command.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION);
    let params = command.get("params");
    let params_valid = matches!(params, None | Some(Value::Object(_)) | Some(Value::Array(_)));

    match command.get("method").and_then(Value::as_str) {
        Some(method) if version_valid && params_valid && id_valid => Ok(Call { method, params, id }),
        Some(_) if id.is_null() => Err(None),
        _ if id_valid => Err(Some(id)),
        _ => Err(Some(Value::Null)),
    }
}

/// Hand a call to its handler, reporting whether it returned without panicking
///
/// A panicking handler drops its responder while unwinding.
fn dispatch(handler: &dyn Handler, params: String, responder: Responder) -> bool {
    panic::catch_unwind(AssertUnwindSafe(|| handler.handle(params, responder))).is_ok()
}

fn into_wire(response: Response, id: Value) -> JsonRpcResponse {
    if response.is_error() {
        JsonRpcResponse::error(ErrorObject::new(response.error, response.result), id)
    } else {
        JsonRpcResponse::success(response.result_value(), id)
    }
}

/// Request processor bound to a method registry
///
/// Cheap to clone; clones share the registry and metrics.
#[derive(Clone)]
pub struct Processor {
    registry: Registry,
    batch: BatchProcessor,
    metrics: Option<Arc<RpcMetrics>>,
    caller: Option<Caller>,
}

impl Processor {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            batch: BatchProcessor::default(),
            metrics: None,
            caller: None,
        }
    }

    pub fn with_batch_mode(mut self, mode: BatchMode) -> Self {
        self.batch = BatchProcessor::with_limit(mode, self.batch.max_size());
        self
    }

    /// Answer batches larger than `limit` with a single Invalid Request
    pub fn with_max_batch_size(mut self, limit: usize) -> Self {
        self.batch = BatchProcessor::with_limit(self.batch.mode(), Some(limit));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<RpcMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attach the connection end calls arrive on; handlers see it through their responder
    pub fn with_caller(mut self, caller: Caller) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn caller(&self) -> Option<&Caller> {
        self.caller.as_ref()
    }

    fn bind_caller(&self, responder: Responder) -> Responder {
        match &self.caller {
            Some(caller) => responder.with_caller(caller.clone()),
            None => responder,
        }
    }

    pub(crate) fn metrics(&self) -> Option<&RpcMetrics> {
        self.metrics.as_deref()
    }

    /// Process one inbound message, returning the serialized reply if one is owed
    pub async fn process(&self, message: &str) -> Option<String> {
        let reply = self.process_decoded(codec::decode(message)).await?;
        match reply.encode() {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode reply");
                None
            }
        }
    }

    /// Process one inbound message on a new task and hand the outcome to `done`
    ///
    /// `done` is called exactly once, with `None` when no reply is owed.
    pub fn process_with<F>(&self, message: String, done: F)
    where
        F: FnOnce(Option<String>) + Send + 'static,
    {
        let processor = self.clone();
        tokio::spawn(async move {
            done(processor.process(&message).await);
        });
    }

    pub async fn process_decoded(&self, decoded: Decoded) -> Option<Reply> {
        match decoded {
            Decoded::Object(command) => self.process_command(command).await.map(Reply::Single),
            Decoded::Array(items) => self.batch.process_batch(items, self).await,
            Decoded::Invalid => {
                tracing::warn!("Inbound message is not a JSON object or array");
                Some(Reply::Single(self.protocol_error(
                    ErrorObject::parse_error(),
                    Value::Null,
                )))
            }
        }
    }

    /// Validate and dispatch a single call
    pub async fn process_command(&self, command: Map<String, Value>) -> Option<JsonRpcResponse> {
        let Call { method, params, id } = match validate(&command) {
            Ok(call) => call,
            Err(None) => {
                tracing::debug!("Dropping invalid notification");
                return None;
            }
            Err(Some(id)) => {
                tracing::warn!(id = %id, "Invalid request envelope");
                return Some(self.protocol_error(ErrorObject::invalid_request(), id));
            }
        };

        let Some(handler) = self.registry.get(method) else {
            if id.is_null() {
                tracing::debug!(method, "Notification for unknown method dropped");
                return None;
            }
            tracing::debug!(method, id = %id, "Method not found");
            return Some(self.protocol_error(ErrorObject::method_not_found(), id));
        };

        let params = codec::params_text(params);
        let started = Instant::now();

        if id.is_null() {
            tracing::debug!(method, "Dispatching notification");
            if !dispatch(handler.as_ref(), params, self.bind_caller(Responder::detached())) {
                tracing::error!(method, "Notification handler panicked");
            }
            if let Some(metrics) = self.metrics() {
                metrics.record_call(method, "notification", started.elapsed().as_secs_f64());
            }
            return None;
        }

        tracing::debug!(method, id = %id, "Dispatching request");
        let (responder, completion) = Responder::channel(id.clone());
        let response = if dispatch(handler.as_ref(), params, self.bind_caller(responder)) {
            match completion.await {
                Ok(response) => response,
                Err(_) => {
                    tracing::warn!(method, id = %id, "Handler dropped its responder");
                    Response::error(
                        ErrorCode::INTERNAL_ERROR,
                        "Handler finished without responding",
                    )
                }
            }
        } else {
            tracing::error!(method, id = %id, "Handler panicked");
            let error = ErrorObject::internal_error();
            Response::error(error.code, error.message)
        };

        if let Some(metrics) = self.metrics() {
            let outcome = if response.is_ok() { "success" } else { "error" };
            metrics.record_call(method, outcome, started.elapsed().as_secs_f64());
        }
        Some(into_wire(response, id))
    }

    /// Process one element of a batch
    pub(crate) async fn process_element(&self, element: Value) -> Option<JsonRpcResponse> {
        match element {
            Value::Object(command) => self.process_command(command).await,
            _ => Some(self.protocol_error(ErrorObject::invalid_request(), Value::Null)),
        }
    }

    pub(crate) fn protocol_error(&self, error: ErrorObject, id: Value) -> JsonRpcResponse {
        if let Some(metrics) = self.metrics() {
            metrics.record_protocol_error(error.code);
        }
        JsonRpcResponse::error(error, id)
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("registry", &self.registry)
            .field("batch", &self.batch)
            .field("caller", &self.caller)
            .finish()
    }
}
