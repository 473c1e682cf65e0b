//! Symmetric JSON-RPC 2.0 engine for jduo
//!
//! Every connection end in jduo is both a server and a client: it answers the calls its
//! peer makes and issues calls of its own over the same channel. This crate holds that
//! engine, independent of any transport:
//!
//! - **Types and codec**: wire envelopes, ids, handler results
//! - **Registry**: named handlers in synchronous, callback and future-returning shapes
//! - **Processor**: envelope validation, dispatch, batches, error replies
//! - **Requester**: outbound request ids, correlation, timeouts and cancellation
//! - **Peer**: the three roles combined over one [`Transport`]
//! - **Observability**: `tracing` setup and OpenTelemetry metrics
//!
//! The `jduo-server` and `jduo-client` crates put WebSocket transports underneath.
//!
//! # Example
//!
//! ```rust
//! use jduo_core::{Processor, Registry, Response};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let registry = Registry::new();
//! registry.bind("add", |params| {
//!     let v: Vec<i64> = serde_json::from_str(params).unwrap_or_default();
//!     Response::ok(v.iter().sum::<i64>().to_string())
//! }).unwrap();
//!
//! let processor = Processor::new(registry);
//! let reply = processor
//!     .process(r#"{"jsonrpc":"2.0","method":"add","params":[2,3],"id":1}"#)
//!     .await;
//! assert_eq!(reply.as_deref(), Some(r#"{"jsonrpc":"2.0","result":5,"id":1}"#));
//! # }
//! ```

pub mod batch;
pub mod blocking;
pub mod codec;
pub mod emitter;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod observability;
pub mod peer;
pub mod processor;
pub mod registry;
pub mod requester;
pub mod transport;
pub mod types;

pub use batch::{BatchMode, BatchProcessor};
pub use blocking::BlockingProcessor;
pub use emitter::Emitter;
pub use error::{Error, ErrorCode, ErrorObject, Result};
pub use handler::{from_fn, from_typed_fn, Caller, Handler, Responder, NOTIFY_ACK};
pub use metrics::RpcMetrics;
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use peer::Peer;
pub use processor::{Processor, Reply};
pub use registry::Registry;
pub use requester::{BatchCall, Progress, Requester, CANCEL_METHOD, PROGRESS_METHOD};
pub use transport::Transport;
pub use types::{Id, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Response};
