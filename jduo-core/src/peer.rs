//! One end of a duplex JSON-RPC channel
//!
//! A [`Peer`] combines the three roles every connection end plays:
//!
//! - **Receiver**: inbound calls go through the [`Processor`] and replies go back out
//! - **Emitter**: outbound notifications
//! - **Requester**: outbound requests correlated with their replies
//!
//! Inbound text is offered to the requester first. Only when it is not a reply to one of
//! our pending requests, or a progress report for one, is it processed as a call.
//! Handlers reach the calling end through [`Responder::caller`](crate::Responder::caller).
//!
//! # Example
//!
//! Two peers wired back to back through in-memory channels:
//!
//! ```rust
//! use jduo_core::{Peer, Processor, Registry, Response};
//! use tokio::sync::mpsc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (to_server, mut server_inbox) = mpsc::unbounded_channel::<String>();
//! let (to_client, mut client_inbox) = mpsc::unbounded_channel::<String>();
//!
//! let registry = Registry::new();
//! registry.bind("sum", |params| {
//!     let v: serde_json::Value = serde_json::from_str(params).unwrap_or_default();
//!     Response::ok((v["a"].as_i64().unwrap_or(0) + v["b"].as_i64().unwrap_or(0)).to_string())
//! }).unwrap();
//! let server = Peer::new(to_client, Processor::new(registry));
//! let client = Peer::new(to_server, Processor::new(Registry::new()));
//!
//! tokio::spawn({
//!     let server = server.clone();
//!     async move {
//!         while let Some(text) = server_inbox.recv().await {
//!             let _ = server.handle_text(&text).await;
//!         }
//!     }
//! });
//! tokio::spawn({
//!     let client = client.clone();
//!     async move {
//!         while let Some(text) = client_inbox.recv().await {
//!             let _ = client.handle_text(&text).await;
//!         }
//!     }
//! });
//!
//! let response = client.request("sum", Some(serde_json::json!({"a": 2, "b": 3}))).await.unwrap();
//! assert_eq!(response, Response::ok("5"));
//! # }
//! ```

use crate::codec;
use crate::emitter::Emitter;
use crate::error::Result;
use crate::handler::Caller;
use crate::processor::Processor;
use crate::registry::Registry;
use crate::requester::{BatchCall, Progress, Requester};
use crate::transport::Transport;
use crate::types::{Id, Response};
use serde::Serialize;
use serde_json::Value;

/// Duplex JSON-RPC endpoint over a [`Transport`]
#[derive(Clone, Debug)]
pub struct Peer {
    processor: Processor,
    requester: Requester,
}

impl Peer {
    pub fn new(transport: impl Transport, processor: Processor) -> Self {
        Self::from_parts(processor, Requester::new(Emitter::new(transport)))
    }

    /// Assemble a peer from a configured processor and requester
    ///
    /// Replies to inbound calls leave through the requester's emitter.
    pub fn from_parts(processor: Processor, requester: Requester) -> Self {
        let caller = Caller::new(requester.emitter().clone());
        Self {
            processor: processor.with_caller(caller),
            requester,
        }
    }

    /// Number this connection; handlers read it from their responder
    pub fn with_connection_id(mut self, connection_id: u64) -> Self {
        let caller = Caller::new(self.requester.emitter().clone()).with_connection_id(connection_id);
        self.processor = self.processor.with_caller(caller);
        self
    }

    pub fn connection_id(&self) -> Option<u64> {
        self.processor.caller().and_then(Caller::connection_id)
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    pub fn emitter(&self) -> &Emitter {
        self.requester.emitter()
    }

    pub fn registry(&self) -> &Registry {
        self.processor.registry()
    }

    /// Send a notification to the remote end
    pub fn emit<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        self.emitter().emit(method, params)
    }

    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Response> {
        self.requester.request(method, params).await
    }

    /// Send a request, passing the remote end's progress reports to `on_progress`
    pub async fn request_with_progress<F>(
        &self,
        method: &str,
        params: Option<Value>,
        on_progress: F,
    ) -> Result<Response>
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.requester
            .request_with_progress(method, params, on_progress)
            .await
    }

    pub fn request_with<F>(&self, method: &str, params: Option<Value>, continuation: F) -> Result<Id>
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        self.requester.request_with(method, params, continuation)
    }

    pub async fn batch(&self, calls: Vec<BatchCall>) -> Result<Vec<Result<Response>>> {
        self.requester.batch(calls).await
    }

    /// Handle one inbound text message
    ///
    /// Replies to our requests resolve their callers and progress reports reach theirs.
    /// Everything else is processed, and a reply is sent back when one is owed. Replies
    /// that match no pending request are processed too, but whatever the processor says
    /// about them is not sent back: that answer would itself be an unmatched reply, and
    /// two peers would bounce it back and forth.
    pub async fn handle_text(&self, message: &str) -> Result<()> {
        let decoded = codec::decode(message);
        if self.requester.try_resolve(&decoded) || self.requester.try_progress(&decoded) {
            return Ok(());
        }

        let unmatched_reply = codec::is_reply(&decoded);
        let Some(reply) = self.processor.process_decoded(decoded).await else {
            return Ok(());
        };
        if unmatched_reply {
            tracing::warn!("Discarding reply to an unmatched response");
            return Ok(());
        }

        let text = reply.encode()?;
        self.emitter().send_text(text)
    }

    /// Connection-close sweep: fail every pending request
    pub fn close(&self) {
        self.requester.close();
    }
}
