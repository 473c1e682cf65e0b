//! Handler shapes for JSON-RPC methods
//!
//! Every method is stored behind one call shape, [`Handler::handle`], which receives the
//! serialized params and a single-use [`Responder`]. Whatever form a method was bound in,
//! it is adapted to that shape before it reaches the registry:
//!
//! 1. **Synchronous**: `Fn(&str) -> Response`, answered on the calling stack
//! 2. **Callback**: `Fn(String, Responder)`, answered whenever and wherever the handler likes
//! 3. **Future**: [`from_fn`] wraps an async closure over raw JSON values
//! 4. **Typed**: [`from_typed_fn`] adds serde conversion of params and result
//!
//! Params arrive as compact JSON text, or as the empty string when the call had none.
//! A handler that panics while being called is answered with an Internal error.
//!
//! When the processor knows which connection a call arrived on, the responder carries a
//! [`Caller`]: the connection id plus an emitter back to that end, used among other
//! things for [`Responder::progress`] reports.
//!
//! # Examples
//!
//! ```rust
//! use jduo_core::handler::{from_fn, from_typed_fn};
//! use serde::Deserialize;
//!
//! let status = from_fn(|_params| async move {
//!     Ok(serde_json::json!({"status": "ok"}))
//! });
//!
//! #[derive(Deserialize)]
//! struct SumParams { a: i64, b: i64 }
//!
//! let sum = from_typed_fn(|p: SumParams| async move { Ok(p.a + p.b) });
//! ```

use crate::emitter::Emitter;
use crate::error::{Error, Result};
use crate::types::Response;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Acknowledgement returned by handlers bound with `notify`
pub const NOTIFY_ACK: &str = "\"OK\"";

/// A bound JSON-RPC method
pub trait Handler: Send + Sync {
    /// Start handling a call
    ///
    /// The handler owns `responder` and must eventually call [`Responder::respond`] for the
    /// caller to receive a reply. It may do so before returning, from another task or thread,
    /// or not at all.
    fn handle(&self, params: String, responder: Responder);
}

/// The connection end a call arrived on
///
/// Lets a handler tell connections apart and talk back to the caller while it works.
#[derive(Clone, Debug)]
pub struct Caller {
    connection_id: Option<u64>,
    emitter: Emitter,
}

impl Caller {
    pub fn new(emitter: Emitter) -> Self {
        Self {
            connection_id: None,
            emitter,
        }
    }

    pub fn with_connection_id(mut self, connection_id: u64) -> Self {
        self.connection_id = Some(connection_id);
        self
    }

    /// Id the transport gave this connection, if it numbers its connections
    pub fn connection_id(&self) -> Option<u64> {
        self.connection_id
    }

    /// Outbound channel back to the caller
    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }
}

/// Single-use completion handle for one call
///
/// Consuming `respond` guarantees at most one reply. Dropping the responder without
/// responding resolves a request with an internal error.
pub struct Responder {
    id: Value,
    slot: Option<oneshot::Sender<Response>>,
    caller: Option<Caller>,
}

impl Responder {
    /// Create a responder together with the receiving half of its completion slot
    pub fn channel(id: Value) -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                id,
                slot: Some(tx),
                caller: None,
            },
            rx,
        )
    }

    /// A responder whose reply goes nowhere, for notifications
    pub fn detached() -> Self {
        Self {
            id: Value::Null,
            slot: None,
            caller: None,
        }
    }

    pub fn with_caller(mut self, caller: Caller) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Id of the call being answered, `null` for notifications
    pub fn id(&self) -> &Value {
        &self.id
    }

    /// Whether the reply will be discarded
    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }

    pub fn caller(&self) -> Option<&Caller> {
        self.caller.as_ref()
    }

    /// Connection the call arrived on, when the transport numbers its connections
    pub fn connection_id(&self) -> Option<u64> {
        self.caller.as_ref().and_then(Caller::connection_id)
    }

    /// Tell the caller how far this call has got
    ///
    /// Sends a `progress` notification carrying the call id. Does nothing for
    /// notifications, which the caller is not waiting on.
    pub fn progress(&self, operation: &str, amount: f64) -> Result<()> {
        if self.is_notification() {
            return Ok(());
        }
        let caller = self
            .caller
            .as_ref()
            .ok_or_else(|| Error::Internal("No caller to report progress to".into()))?;
        caller.emitter.progress(&self.id, operation, amount)
    }

    pub fn respond(mut self, response: Response) {
        if let Some(slot) = self.slot.take() {
            // the caller may have gone away; nothing to do then
            let _ = slot.send(response);
        }
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("id", &self.id)
            .field("pending", &self.slot.is_some())
            .field("connection_id", &self.connection_id())
            .finish()
    }
}

/// Adapter for synchronous closures
pub struct SyncHandler<F> {
    func: F,
}

impl<F> SyncHandler<F>
where
    F: Fn(&str) -> Response + Send + Sync + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Handler for SyncHandler<F>
where
    F: Fn(&str) -> Response + Send + Sync + 'static,
{
    fn handle(&self, params: String, responder: Responder) {
        responder.respond((self.func)(&params));
    }
}

/// Adapter for closures that complete through the responder
pub struct CallbackHandler<F> {
    func: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(String, Responder) + Send + Sync + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Handler for CallbackHandler<F>
where
    F: Fn(String, Responder) + Send + Sync + 'static,
{
    fn handle(&self, params: String, responder: Responder) {
        (self.func)(params, responder);
    }
}

/// Adapter for async closures over raw JSON values
///
/// The future runs on its own tokio task, so a runtime must be available when the
/// method is called.
pub struct FutureHandler<F> {
    func: Arc<F>,
}

impl<F, Fut> Handler for FutureHandler<F>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn handle(&self, params: String, responder: Responder) {
        let params = match parse_params(&params) {
            Ok(params) => params,
            Err(e) => {
                let error = e.to_error_object();
                responder.respond(Response::error(error.code, error.message));
                return;
            }
        };
        let fut = (self.func)(params);
        tokio::spawn(async move {
            let response = match fut.await {
                Ok(value) => Response::ok(value.to_string()),
                Err(e) => {
                    let error = e.to_error_object();
                    Response::error(error.code, error.message)
                }
            };
            responder.respond(response);
        });
    }
}

fn parse_params(params: &str) -> Result<Option<Value>> {
    if params.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(params)
        .map(Some)
        .map_err(|e| Error::InvalidParams(e.to_string()))
}

/// Create a handler from an async closure over raw JSON params
pub fn from_fn<F, Fut>(func: F) -> Box<dyn Handler>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Box::new(FutureHandler {
        func: Arc::new(func),
    })
}

/// Create a handler from an async closure with typed params and result
///
/// Params that do not deserialize into `P` are answered with Invalid params (-32602).
/// A call without params is deserialized from `null`, which suits `()` and `Option<_>`.
pub fn from_typed_fn<P, R, F, Fut>(func: F) -> Box<dyn Handler>
where
    P: serde::de::DeserializeOwned + Send + 'static,
    R: serde::Serialize + Send + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let func = Arc::new(func);

    from_fn(move |params: Option<Value>| {
        let func = Arc::clone(&func);
        async move {
            let typed: P = serde_json::from_value(params.unwrap_or(Value::Null))
                .map_err(|e| Error::InvalidParams(e.to_string()))?;
            let result = func(typed).await?;
            Ok(serde_json::to_value(result)?)
        }
    })
}
