//! Outbound request correlation
//!
//! The [`Requester`] gives every outbound request a correlation id, keeps a pending
//! entry for it, and resolves the caller when a reply carrying that id comes back over
//! the same channel that also carries the peer's own calls.
//!
//! # Request Lifecycle
//!
//! 1. **Allocate**: draw the next id, skipping any id still pending
//! 2. **Register**: store the continuation under that id
//! 3. **Send**: hand the serialized request to the emitter
//! 4. **Correlate**: an inbound reply with a matching id removes the entry
//! 5. **Resolve**: the continuation runs, exactly once
//!
//! An entry can also leave the table without a reply: on timeout, on local
//! cancellation, when the awaiting future is dropped, or when the connection closes.
//! In the first three cases the peer is sent a `cancel` notification naming the id.
//!
//! Only reply-shaped messages (no `method`, with `result` or `error`) are considered for
//! correlation, so an inbound request that happens to reuse one of our ids is still
//! processed as a request.
//!
//! A peer that rejects a whole batch (too large, say) answers with one error whose id is
//! null. That error fails every entry of the oldest batch still waiting.
//!
//! Requests sent with a progress callback also match `progress` notifications whose
//! `params.id` names them, for as long as they are pending.

use crate::codec::{self, Decoded};
use crate::emitter::Emitter;
use crate::error::{Error, ErrorObject, Result};
use crate::metrics::RpcMetrics;
use crate::types::{Id, JsonRpcNotification, JsonRpcRequest, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Notification sent to the peer when we stop waiting for a reply
pub const CANCEL_METHOD: &str = "cancel";

/// Notification a handler sends while a request is still running
pub const PROGRESS_METHOD: &str = "progress";

/// How far a pending request has got, as reported by the peer working on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub operation: String,
    pub amount: f64,
}

type Continuation = Box<dyn FnOnce(Result<Response>) + Send>;
type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

struct PendingRequest {
    method: String,
    sequence: u64,
    sent_at: Instant,
    continuation: Continuation,
    on_progress: Option<ProgressCallback>,
}

#[derive(Default)]
struct PendingTable {
    entries: HashMap<Id, PendingRequest>,
    // outstanding batches, oldest first
    batches: Vec<(u64, Vec<Id>)>,
    next_id: i64,
    next_sequence: u64,
    next_batch: u64,
}

impl PendingTable {
    fn allocate(&mut self) -> Id {
        loop {
            let candidate = Id::Number(self.next_id);
            self.next_id = if self.next_id == i64::MAX {
                0
            } else {
                self.next_id + 1
            };
            if !self.entries.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn insert(
        &mut self,
        id: Id,
        method: &str,
        continuation: Continuation,
        on_progress: Option<ProgressCallback>,
    ) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.entries.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                sequence,
                sent_at: Instant::now(),
                continuation,
                on_progress,
            },
        );
    }

    fn track_batch(&mut self, ids: Vec<Id>) -> u64 {
        let batch = self.next_batch;
        self.next_batch = self.next_batch.wrapping_add(1);
        self.batches.push((batch, ids));
        batch
    }

    /// Remove the oldest batch that still has pending entries, along with those entries
    fn take_oldest_batch(&mut self) -> Vec<(Id, PendingRequest)> {
        while !self.batches.is_empty() {
            let (_, ids) = self.batches.remove(0);
            let taken: Vec<_> = ids
                .into_iter()
                .filter_map(|id| self.entries.remove(&id).map(|pending| (id, pending)))
                .collect();
            if !taken.is_empty() {
                return taken;
            }
        }
        Vec::new()
    }
}

/// One call of an outbound batch
#[derive(Debug, Clone)]
pub enum BatchCall {
    Request { method: String, params: Option<Value> },
    Notification { method: String, params: Option<Value> },
}

impl BatchCall {
    pub fn request(method: impl Into<String>, params: Option<Value>) -> Self {
        BatchCall::Request {
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        BatchCall::Notification {
            method: method.into(),
            params,
        }
    }
}

/// Correlation engine for outbound requests
///
/// Cheap to clone; clones share the pending table.
#[derive(Clone)]
pub struct Requester {
    emitter: Emitter,
    table: Arc<Mutex<PendingTable>>,
    timeout: Option<Duration>,
    metrics: Option<Arc<RpcMetrics>>,
}

impl Requester {
    pub fn new(emitter: Emitter) -> Self {
        Self {
            emitter,
            table: Arc::new(Mutex::new(PendingTable::default())),
            timeout: None,
            metrics: None,
        }
    }

    /// Give up on requests that are not answered within `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<RpcMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(
        &self,
        method: &str,
        continuation: Continuation,
        on_progress: Option<ProgressCallback>,
    ) -> Id {
        let id = {
            let mut table = self.lock();
            let id = table.allocate();
            table.insert(id.clone(), method, continuation, on_progress);
            id
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_request_sent();
        }
        id
    }

    fn take(&self, id: &Id) -> Option<PendingRequest> {
        self.lock().entries.remove(id)
    }

    /// Run a continuation outside the table lock
    fn settle(&self, id: &Id, pending: PendingRequest, outcome: Result<Response>, label: &'static str) {
        tracing::debug!(
            method = %pending.method,
            id = %id,
            elapsed_ms = pending.sent_at.elapsed().as_millis() as u64,
            outcome = label,
            "Request settled"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_request_settled(label);
        }
        (pending.continuation)(outcome);
    }

    /// Drop a pending entry whose caller stopped waiting
    fn abandon(&self, id: &Id, label: &'static str, notify_peer: bool) {
        let Some(pending) = self.take(id) else {
            return;
        };
        tracing::debug!(method = %pending.method, id = %id, outcome = label, "Request abandoned");
        if let Some(metrics) = &self.metrics {
            metrics.record_request_settled(label);
        }
        if notify_peer {
            if let Err(e) = self.emitter.emit(CANCEL_METHOD, json!({"id": id.to_value()})) {
                tracing::debug!(id = %id, error = %e, "Could not send cancel notification");
            }
        }
    }

    /// Send a request and run `continuation` with its outcome
    ///
    /// The continuation runs exactly once if this returns `Ok`. If the request cannot be
    /// sent, the entry is removed, the continuation is dropped unrun and the send error
    /// is returned.
    pub fn request_with<F>(&self, method: &str, params: Option<Value>, continuation: F) -> Result<Id>
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        self.send_tracked(method, params, Box::new(continuation), None)
    }

    fn send_tracked(
        &self,
        method: &str,
        params: Option<Value>,
        continuation: Continuation,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Id> {
        let id = self.register(method, continuation, on_progress);
        let request = JsonRpcRequest::new(method, params, id.clone());

        if let Err(e) = self.emitter.send_request(&request) {
            tracing::warn!(method, id = %id, error = %e, "Failed to send request");
            self.abandon(&id, "failed", false);
            return Err(e);
        }
        tracing::debug!(method, id = %id, "Request sent");
        Ok(id)
    }

    /// Send a request and wait for its reply
    ///
    /// Wire errors come back as an `Ok` [`Response`] with a non-zero `error`; `Err` is
    /// reserved for the request itself failing (send failure, timeout, closed connection).
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Response> {
        self.await_reply(method, params, None).await
    }

    /// Send a request and wait for its reply, passing progress reports to `on_progress`
    ///
    /// `on_progress` runs for each `progress` notification naming this request that
    /// arrives before the reply.
    pub async fn request_with_progress<F>(
        &self,
        method: &str,
        params: Option<Value>,
        on_progress: F,
    ) -> Result<Response>
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.await_reply(method, params, Some(Arc::new(on_progress))).await
    }

    async fn await_reply(
        &self,
        method: &str,
        params: Option<Value>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        let continuation: Continuation = Box::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        let id = self.send_tracked(method, params, continuation, on_progress)?;

        let mut guard = AbandonGuard::new(self, vec![id]);
        let received = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    guard.fire("timeout");
                    return Err(Error::Timeout);
                }
            },
            None => rx.await,
        };
        guard.disarm();
        received.unwrap_or(Err(Error::ConnectionClosed))
    }

    /// Send several calls as one batch and wait for every request among them
    ///
    /// Outcomes are returned in call order, one per [`BatchCall::Request`].
    pub async fn batch(&self, calls: Vec<BatchCall>) -> Result<Vec<Result<Response>>> {
        if calls.is_empty() {
            return Err(Error::EmptyBatch);
        }

        let mut guard = AbandonGuard::new(self, Vec::with_capacity(calls.len()));
        guard.sent = false;
        let mut envelopes = Vec::with_capacity(calls.len());
        let mut receivers = Vec::new();

        for call in calls {
            match call {
                BatchCall::Request { method, params } => {
                    let (tx, rx) = oneshot::channel();
                    let id = self.register(
                        &method,
                        Box::new(move |outcome| {
                            let _ = tx.send(outcome);
                        }),
                        None,
                    );
                    guard.ids.push(id.clone());
                    receivers.push(rx);
                    envelopes.push(serde_json::to_value(JsonRpcRequest::new(method, params, id))?);
                }
                BatchCall::Notification { method, params } => {
                    envelopes.push(serde_json::to_value(JsonRpcNotification::new(method, params))?);
                }
            }
        }

        if !guard.ids.is_empty() {
            guard.batch = Some(self.lock().track_batch(guard.ids.clone()));
        }
        self.emitter.send_batch(&envelopes)?;
        guard.sent = true;
        tracing::debug!(size = envelopes.len(), requests = receivers.len(), "Batch sent");

        let all = futures::future::join_all(receivers);
        let received = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, all).await {
                Ok(received) => received,
                Err(_) => {
                    guard.fire("timeout");
                    return Err(Error::Timeout);
                }
            },
            None => all.await,
        };
        guard.disarm();

        Ok(received
            .into_iter()
            .map(|outcome| outcome.unwrap_or(Err(Error::ConnectionClosed)))
            .collect())
    }

    /// Correlate one inbound text message
    ///
    /// Returns `true` if the message was consumed as a reply. Anything else, including
    /// replies with an unknown or absent id, is left for the processor.
    pub fn process_response(&self, message: &str) -> bool {
        self.try_resolve(&codec::decode(message))
    }

    /// Correlate an already decoded message
    pub fn try_resolve(&self, decoded: &Decoded) -> bool {
        match decoded {
            Decoded::Object(object) => self.resolve(object) || self.fail_batch(object),
            Decoded::Array(items) if codec::is_reply(decoded) => {
                let mut matched = false;
                for item in items {
                    if let Some(object) = item.as_object() {
                        matched |= self.resolve(object);
                    }
                }
                matched
            }
            _ => false,
        }
    }

    fn resolve(&self, object: &Map<String, Value>) -> bool {
        if !codec::is_response_shaped(object) {
            return false;
        }
        let Some(id) = object.get("id").and_then(Id::from_value) else {
            return false;
        };
        let Some(pending) = self.take(&id) else {
            tracing::debug!(id = %id, "Reply does not match a pending request");
            return false;
        };
        self.settle(&id, pending, Ok(Response::from_wire(object)), "resolved");
        true
    }

    /// Settle the oldest outstanding batch with an error reply that names no request
    fn fail_batch(&self, object: &Map<String, Value>) -> bool {
        let unnamed = object.get("id").map_or(true, Value::is_null);
        let has_error = object.get("error").is_some_and(|e| !e.is_null());
        if !codec::is_response_shaped(object) || !unnamed || !has_error {
            return false;
        }
        let taken = self.lock().take_oldest_batch();
        if taken.is_empty() {
            return false;
        }

        let response = Response::from_wire(object);
        let error = ErrorObject::new(response.error, response.result);
        tracing::warn!(
            code = error.code,
            message = %error.message,
            requests = taken.len(),
            "Peer rejected a batch"
        );
        for (id, pending) in taken {
            self.settle(&id, pending, Err(Error::Rpc(error.clone())), "rejected");
        }
        true
    }

    /// Pass a `progress` notification to the pending request it names
    ///
    /// Returns `false`, leaving the message for the processor, when it is not a progress
    /// report or names no pending request that asked for them.
    pub fn try_progress(&self, decoded: &Decoded) -> bool {
        let Decoded::Object(object) = decoded else {
            return false;
        };
        if object.get("method").and_then(Value::as_str) != Some(PROGRESS_METHOD)
            || object.contains_key("id")
        {
            return false;
        }
        let Some(params) = object.get("params") else {
            return false;
        };
        let Some(id) = params.get("id").and_then(Id::from_value) else {
            return false;
        };
        let callback = self
            .lock()
            .entries
            .get(&id)
            .and_then(|pending| pending.on_progress.clone());
        let Some(callback) = callback else {
            return false;
        };
        match serde_json::from_value::<Progress>(params.clone()) {
            Ok(progress) => {
                tracing::trace!(id = %id, operation = %progress.operation, amount = progress.amount, "Progress");
                callback(progress);
                true
            }
            Err(e) => {
                tracing::debug!(id = %id, error = %e, "Malformed progress notification");
                false
            }
        }
    }

    /// Fail a pending request with [`Error::Cancelled`] and tell the peer
    pub fn cancel(&self, id: &Id) -> bool {
        let Some(pending) = self.take(id) else {
            return false;
        };
        if let Err(e) = self.emitter.emit(CANCEL_METHOD, json!({"id": id.to_value()})) {
            tracing::debug!(id = %id, error = %e, "Could not send cancel notification");
        }
        self.settle(id, pending, Err(Error::Cancelled), "cancelled");
        true
    }

    /// Fail every pending request with [`Error::ConnectionClosed`]
    pub fn close(&self) {
        let mut drained: Vec<(Id, PendingRequest)> = self.lock().entries.drain().collect();
        if drained.is_empty() {
            return;
        }
        tracing::debug!(count = drained.len(), "Failing pending requests on close");
        drained.sort_by_key(|(_, pending)| pending.sequence);
        for (id, pending) in drained {
            self.settle(&id, pending, Err(Error::ConnectionClosed), "closed");
        }
    }

    pub fn pending_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Ids of pending requests, oldest first
    pub fn pending_ids(&self) -> Vec<Id> {
        let table = self.lock();
        let mut entries: Vec<(&Id, u64)> = table
            .entries
            .iter()
            .map(|(id, pending)| (id, pending.sequence))
            .collect();
        entries.sort_by_key(|(_, sequence)| *sequence);
        entries.into_iter().map(|(id, _)| id.clone()).collect()
    }
}

impl std::fmt::Debug for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester")
            .field("pending", &self.pending_count())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Removes entries whose awaiting future went away
struct AbandonGuard<'a> {
    requester: &'a Requester,
    ids: Vec<Id>,
    batch: Option<u64>,
    armed: bool,
    sent: bool,
}

impl<'a> AbandonGuard<'a> {
    fn new(requester: &'a Requester, ids: Vec<Id>) -> Self {
        Self {
            requester,
            ids,
            batch: None,
            armed: true,
            sent: true,
        }
    }

    fn fire(&mut self, label: &'static str) {
        if !self.armed {
            return;
        }
        self.armed = false;
        let label = if self.sent { label } else { "failed" };
        for id in &self.ids {
            self.requester.abandon(id, label, self.sent);
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        self.fire("cancelled");
        if let Some(batch) = self.batch.take() {
            self.requester.lock().batches.retain(|(b, _)| *b != batch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn requester() -> (Requester, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Requester::new(Emitter::new(tx)), rx)
    }

    fn sent(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[test]
    fn test_ids_are_sequential() {
        let (requester, mut rx) = requester();
        let first = requester.request_with("a", None, |_| {}).unwrap();
        let second = requester.request_with("b", None, |_| {}).unwrap();

        assert_eq!(first, Id::Number(0));
        assert_eq!(second, Id::Number(1));
        assert_eq!(sent(&mut rx)["id"], 0);
        assert_eq!(sent(&mut rx)["id"], 1);
        assert_eq!(requester.pending_ids(), vec![Id::Number(0), Id::Number(1)]);
    }

    #[test]
    fn test_wraparound_skips_pending_ids() {
        let (requester, _rx) = requester();
        let zero = requester.request_with("a", None, |_| {}).unwrap();
        assert_eq!(zero, Id::Number(0));

        requester.lock().next_id = i64::MAX;
        let max = requester.request_with("b", None, |_| {}).unwrap();
        let after_wrap = requester.request_with("c", None, |_| {}).unwrap();

        assert_eq!(max, Id::Number(i64::MAX));
        assert_eq!(after_wrap, Id::Number(1));
    }

    #[test]
    fn test_matching_reply_resolves_once() {
        let (requester, _rx) = requester();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));
        let (counter, slot) = (Arc::clone(&calls), Arc::clone(&seen));
        requester
            .request_with("sum", Some(json!({"a": 2, "b": 3})), move |outcome| {
                counter.fetch_add(1, Ordering::SeqCst);
                *slot.lock().unwrap() = Some(outcome.unwrap());
            })
            .unwrap();

        let reply = r#"{"jsonrpc":"2.0","result":5,"id":0}"#;
        assert!(requester.process_response(reply));
        assert!(!requester.process_response(reply));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().unwrap().clone(), Some(Response::ok("5")));
        assert_eq!(requester.pending_count(), 0);
    }

    #[test]
    fn test_unmatched_messages_fall_through() {
        let (requester, _rx) = requester();
        requester.request_with("echo", None, |_| panic!("must not resolve")).unwrap();

        assert!(!requester.process_response(r#"{"jsonrpc":"2.0","result":1,"id":42}"#));
        assert!(!requester.process_response(r#"{"jsonrpc":"2.0","result":1}"#));
        assert!(!requester.process_response(r#"{"jsonrpc":"2.0","result":1,"id":null}"#));
        assert!(!requester.process_response(r#"{"jsonrpc":"2.0","result":1,"id":"0"}"#));
        assert!(!requester.process_response(r#"{"jsonrpc":"2.0","method":"echo","id":0}"#));
        assert!(!requester.process_response("garbage"));
        assert_eq!(requester.pending_count(), 1);
    }

    #[test]
    fn test_error_reply_surfaces_code_and_message() {
        let (requester, _rx) = requester();
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        requester
            .request_with("missing", None, move |outcome| {
                *slot.lock().unwrap() = Some(outcome.unwrap());
            })
            .unwrap();

        assert!(requester.process_response(
            r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":0}"#
        ));
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(Response::error(-32601, "Method not found"))
        );
    }

    #[test]
    fn test_batch_reply_resolves_each_entry() {
        let (requester, _rx) = requester();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let counter = Arc::clone(&hits);
            requester
                .request_with("m", None, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        assert!(requester.process_response(
            r#"[{"jsonrpc":"2.0","result":"b","id":1},{"jsonrpc":"2.0","result":"a","id":0}]"#
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let (requester, mut rx) = requester();
        let caller = requester.clone();
        let call = tokio::spawn(async move { caller.request("sum", Some(json!({"a": 2, "b": 3}))).await });

        let outgoing: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(outgoing["method"], "sum");
        assert_eq!(outgoing["params"], json!({"a": 2, "b": 3}));

        let reply = json!({"jsonrpc": "2.0", "result": 5, "id": outgoing["id"]});
        assert!(requester.process_response(&reply.to_string()));

        let response = call.await.unwrap().unwrap();
        assert_eq!(response, Response::ok("5"));
        assert_eq!(requester.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_request_timeout_sends_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let requester = Requester::new(Emitter::new(tx)).with_timeout(Duration::from_millis(20));

        let result = requester.request("slow", None).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(requester.pending_count(), 0);

        assert_eq!(sent(&mut rx)["method"], "slow");
        let cancel = sent(&mut rx);
        assert_eq!(cancel["method"], CANCEL_METHOD);
        assert_eq!(cancel["params"], json!({"id": 0}));
    }

    #[tokio::test]
    async fn test_dropped_request_future_is_abandoned() {
        let (requester, mut rx) = requester();
        let caller = requester.clone();
        let call = tokio::spawn(async move { caller.request("never", None).await });

        rx.recv().await.unwrap();
        assert_eq!(requester.pending_count(), 1);
        call.abort();
        let _ = call.await;

        assert_eq!(requester.pending_count(), 0);
        let cancel: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(cancel["method"], CANCEL_METHOD);
    }

    #[tokio::test]
    async fn test_cancel_fails_continuation() {
        let (requester, mut rx) = requester();
        let caller = requester.clone();
        let call = tokio::spawn(async move { caller.request("long", None).await });

        let outgoing: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        let id = Id::from_value(&outgoing["id"]).unwrap();
        assert!(requester.cancel(&id));
        assert!(!requester.cancel(&id));

        assert!(matches!(call.await.unwrap(), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_close_fails_all_pending() {
        let (requester, mut rx) = requester();
        let first = {
            let caller = requester.clone();
            tokio::spawn(async move { caller.request("a", None).await })
        };
        let second = {
            let caller = requester.clone();
            tokio::spawn(async move { caller.request("b", None).await })
        };
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        requester.close();

        assert!(matches!(first.await.unwrap(), Err(Error::ConnectionClosed)));
        assert!(matches!(second.await.unwrap(), Err(Error::ConnectionClosed)));
        assert_eq!(requester.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_leaves_nothing_pending() {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        drop(rx);
        let requester = Requester::new(Emitter::new(tx));

        let result = requester.request("lost", None).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert_eq!(requester.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_outcomes_follow_call_order() {
        let (requester, mut rx) = requester();
        let caller = requester.clone();
        let call = tokio::spawn(async move {
            caller
                .batch(vec![
                    BatchCall::request("first", None),
                    BatchCall::notification("log", Some(json!({"msg": "hi"}))),
                    BatchCall::request("second", None),
                ])
                .await
        });

        let outgoing: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        let items = outgoing.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert!(items[1].get("id").is_none());

        let reply = json!([
            {"jsonrpc": "2.0", "result": "two", "id": items[2]["id"]},
            {"jsonrpc": "2.0", "error": {"code": -32000, "message": "nope"}, "id": items[0]["id"]}
        ]);
        assert!(requester.process_response(&reply.to_string()));

        let outcomes = call.await.unwrap().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].as_ref().unwrap(), &Response::error(-32000, "nope"));
        assert_eq!(outcomes[1].as_ref().unwrap(), &Response::ok("\"two\""));
    }

    #[tokio::test]
    async fn test_batch_rejection_fails_oldest_batch() {
        let (requester, mut rx) = requester();
        let first = {
            let caller = requester.clone();
            tokio::spawn(async move {
                caller
                    .batch(vec![BatchCall::request("a", None), BatchCall::request("b", None)])
                    .await
            })
        };
        rx.recv().await.unwrap();
        let second = {
            let caller = requester.clone();
            tokio::spawn(async move { caller.batch(vec![BatchCall::request("c", None)]).await })
        };
        rx.recv().await.unwrap();

        let rejection = r#"{"jsonrpc":"2.0","error":{"code":-32600,"message":"Batch size limit exceeded: limit=1, actual=2"},"id":null}"#;
        assert!(requester.process_response(rejection));

        let outcomes = first.await.unwrap().unwrap();
        assert_eq!(outcomes.len(), 2);
        for outcome in outcomes {
            match outcome {
                Err(Error::Rpc(e)) => {
                    assert_eq!(e.code, -32600);
                    assert_eq!(e.message, "Batch size limit exceeded: limit=1, actual=2");
                }
                other => panic!("expected a batch rejection, got {:?}", other),
            }
        }
        assert_eq!(requester.pending_count(), 1);

        assert!(requester.process_response(r#"{"jsonrpc":"2.0","result":"c","id":2}"#));
        assert_eq!(second.await.unwrap().unwrap()[0].as_ref().unwrap(), &Response::ok("\"c\""));
        assert!(!requester.process_response(rejection));
        assert!(requester.lock().batches.is_empty());
    }

    #[test]
    fn test_null_id_error_without_batch_falls_through() {
        let (requester, _rx) = requester();
        requester.request_with("single", None, |_| panic!("must not resolve")).unwrap();

        assert!(!requester.process_response(
            r#"{"jsonrpc":"2.0","error":{"code":-32600,"message":"Invalid Request"},"id":null}"#
        ));
        assert_eq!(requester.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_progress_reaches_pending_request() {
        let (requester, mut rx) = requester();
        let reports = Arc::new(Mutex::new(Vec::new()));
        let call = {
            let caller = requester.clone();
            let reports = Arc::clone(&reports);
            tokio::spawn(async move {
                caller
                    .request_with_progress("render", None, move |progress| {
                        reports.lock().unwrap().push(progress);
                    })
                    .await
            })
        };
        let outgoing: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        let id = outgoing["id"].clone();

        let report = json!({"jsonrpc": "2.0", "method": PROGRESS_METHOD,
            "params": {"id": id, "operation": "Loading", "amount": 0.25}});
        assert!(requester.try_progress(&codec::decode(&report.to_string())));
        assert!(requester.process_response(&json!({"jsonrpc": "2.0", "result": true, "id": id}).to_string()));

        assert_eq!(call.await.unwrap().unwrap(), Response::ok("true"));
        assert_eq!(
            *reports.lock().unwrap(),
            vec![Progress {
                operation: "Loading".to_string(),
                amount: 0.25
            }]
        );
        assert!(!requester.try_progress(&codec::decode(&report.to_string())));
    }

    #[test]
    fn test_progress_without_listener_falls_through() {
        let (requester, _rx) = requester();
        requester.request_with("plain", None, |_| {}).unwrap();

        let naming_plain = r#"{"jsonrpc":"2.0","method":"progress","params":{"id":0,"operation":"x","amount":1}}"#;
        let naming_nobody = r#"{"jsonrpc":"2.0","method":"progress","params":{"id":9,"operation":"x","amount":1}}"#;
        let other_method = r#"{"jsonrpc":"2.0","method":"status","params":{"id":0}}"#;

        assert!(!requester.try_progress(&codec::decode(naming_plain)));
        assert!(!requester.try_progress(&codec::decode(naming_nobody)));
        assert!(!requester.try_progress(&codec::decode(other_method)));
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let (requester, _rx) = requester();
        assert!(matches!(requester.batch(Vec::new()).await, Err(Error::EmptyBatch)));
    }
}
