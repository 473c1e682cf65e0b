//! Composition of outbound notifications and requests

use crate::codec;
use crate::error::Result;
use crate::requester::PROGRESS_METHOD;
use crate::transport::Transport;
use crate::types::{JsonRpcNotification, JsonRpcRequest};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Serializes outbound calls and hands them to a transport
#[derive(Clone)]
pub struct Emitter {
    transport: Arc<dyn Transport>,
}

impl Emitter {
    pub fn new(transport: impl Transport) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub fn from_arc(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send a notification; no reply is expected and nothing is tracked
    ///
    /// `params` serializing to `null` are omitted; scalars are wrapped in an array.
    pub fn emit<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        let params = serde_json::to_value(params)?;
        let notification = JsonRpcNotification::new(method, Some(params));
        tracing::debug!(method, "Emitting notification");
        self.send_text(codec::encode_notification(&notification)?)
    }

    /// Report how far the request with `id` has got
    ///
    /// The peer that sent the request matches the report by `params.id`.
    pub fn progress(&self, id: &Value, operation: &str, amount: f64) -> Result<()> {
        self.emit(
            PROGRESS_METHOD,
            json!({"id": id, "operation": operation, "amount": amount}),
        )
    }

    pub fn send_request(&self, request: &JsonRpcRequest) -> Result<()> {
        self.send_text(codec::encode_request(request)?)
    }

    /// Send several envelopes as one batch
    pub fn send_batch(&self, envelopes: &[Value]) -> Result<()> {
        self.send_text(codec::encode(&envelopes)?)
    }

    pub fn send_text(&self, message: String) -> Result<()> {
        self.transport.send_text(message)
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter").finish_non_exhaustive()
    }
}
