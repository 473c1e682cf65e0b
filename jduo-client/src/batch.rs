//! Batch request building and response handling
//!
//! Ids are assigned by the connection's requester when the batch is sent, so requests in a
//! batch are addressed by the index [`BatchRequest::add_request`] hands back.
//!
//! # Examples
//!
//! ```rust,no_run
//! use jduo_client::{JduoClient, BatchRequest};
//!
//! # async fn example(client: &JduoClient) -> jduo_core::Result<()> {
//! let mut batch = BatchRequest::new();
//!
//! let sum = batch.add_request("sum", serde_json::json!([1, 2]));
//! let echo = batch.add_request("echo", serde_json::json!({"text": "hi"}));
//! batch.add_notification("log", serde_json::json!({"event": "batch"}));
//!
//! let responses = client.batch(batch).await?;
//!
//! let total: i64 = responses.get(sum)?;
//! let text: serde_json::Value = responses.get(echo)?;
//! # Ok(())
//! # }
//! ```

use jduo_core::{BatchCall, Error, Response, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Builder for an outbound batch
#[derive(Debug, Default)]
pub struct BatchRequest {
    calls: Vec<BatchCall>,
    requests: usize,
}

impl BatchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request and return its index in the [`BatchResponse`]
    pub fn add_request<P>(&mut self, method: impl Into<String>, params: P) -> usize
    where
        P: Serialize,
    {
        let params_value = serde_json::to_value(params).ok();
        self.calls.push(BatchCall::request(method, params_value));
        self.requests += 1;
        self.requests - 1
    }

    /// Add a notification; it gets no entry in the response
    pub fn add_notification<P>(&mut self, method: impl Into<String>, params: P)
    where
        P: Serialize,
    {
        let params_value = serde_json::to_value(params).ok();
        self.calls.push(BatchCall::notification(method, params_value));
    }

    /// Number of calls in the batch
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn request_count(&self) -> usize {
        self.requests
    }

    pub(crate) fn into_calls(self) -> Vec<BatchCall> {
        self.calls
    }
}

/// Outcomes of a batch, one per request, in the order the requests were added
#[derive(Debug)]
pub struct BatchResponse {
    outcomes: Vec<Result<Response>>,
}

impl BatchResponse {
    pub fn new(outcomes: Vec<Result<Response>>) -> Self {
        Self { outcomes }
    }

    /// Typed result of one request
    ///
    /// Wire error replies surface as `Error::Rpc`.
    pub fn get<R: DeserializeOwned>(&self, index: usize) -> Result<R> {
        match self.outcomes.get(index) {
            Some(Ok(response)) => response.parse(),
            Some(Err(e)) => Err(e.clone()),
            None => Err(Error::Internal(format!("No request at batch index {}", index))),
        }
    }

    pub fn response(&self, index: usize) -> Option<&Result<Response>> {
        self.outcomes.get(index)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Whether every request got a successful reply
    pub fn all_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|outcome| matches!(outcome, Ok(response) if response.is_ok()))
    }

    /// Indices of the requests that did not succeed, with their error codes
    ///
    /// A batch the server rejected as a whole reports the server's code for every request.
    /// Requests that failed locally (timeout, closed connection) are reported with code 0.
    pub fn errors(&self) -> Vec<(usize, i32)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| match outcome {
                Ok(response) if response.is_ok() => None,
                Ok(response) => Some((index, response.error)),
                Err(Error::Rpc(e)) => Some((index, e.code)),
                Err(_) => Some((index, 0)),
            })
            .collect()
    }

    pub fn into_outcomes(self) -> Vec<Result<Response>> {
        self.outcomes
    }
}
