//! Batch request processing
//!
//! A JSON array of calls is answered with a JSON array of replies:
//!
//! - an empty array is itself an Invalid Request, answered with a single error object
//! - each element that is not an object contributes an Invalid Request (id null)
//! - each object element is processed as a single call; notifications contribute nothing
//! - if nothing is owed at all, there is no reply, not an empty array
//!
//! Replies are always assembled in input order, whichever [`BatchMode`] dispatches them.

use crate::error::{Error, ErrorObject};
use crate::processor::{Processor, Reply};
use crate::types::JsonRpcResponse;
use serde_json::Value;

/// How the elements of a batch are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Every element runs on its own task
    #[default]
    Parallel,

    /// Each element completes before the next starts
    Sequential,
}

impl BatchMode {
    fn as_str(self) -> &'static str {
        match self {
            BatchMode::Parallel => "parallel",
            BatchMode::Sequential => "sequential",
        }
    }
}

/// Batch dispatch policy
#[derive(Debug, Clone, Default)]
pub struct BatchProcessor {
    mode: BatchMode,
    max_size: Option<usize>,
}

impl BatchProcessor {
    pub fn new(mode: BatchMode) -> Self {
        Self {
            mode,
            max_size: None,
        }
    }

    pub fn with_limit(mode: BatchMode, max_size: Option<usize>) -> Self {
        Self { mode, max_size }
    }

    pub fn mode(&self) -> BatchMode {
        self.mode
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// Process a batch, returning the reply if one is owed
    #[tracing::instrument(skip(self, items, processor), fields(batch_size = items.len(), mode = ?self.mode))]
    pub async fn process_batch(&self, items: Vec<Value>, processor: &Processor) -> Option<Reply> {
        if items.is_empty() {
            tracing::warn!("Empty batch");
            return Some(Reply::Single(
                processor.protocol_error(ErrorObject::invalid_request(), Value::Null),
            ));
        }

        if let Some(max_size) = self.max_size {
            if items.len() > max_size {
                tracing::warn!(
                    batch_size = items.len(),
                    max_size = max_size,
                    "Batch size exceeded"
                );
                let error = Error::BatchSizeExceeded {
                    limit: max_size,
                    actual: items.len(),
                };
                return Some(Reply::Single(
                    processor.protocol_error(error.to_error_object(), Value::Null),
                ));
            }
        }

        if let Some(metrics) = processor.metrics() {
            metrics.record_batch(items.len() as u64, self.mode.as_str());
        }

        let responses = match self.mode {
            BatchMode::Parallel => self.process_parallel(items, processor).await,
            BatchMode::Sequential => self.process_sequential(items, processor).await,
        };

        tracing::debug!(response_count = responses.len(), "Batch processing completed");
        if responses.is_empty() {
            None
        } else {
            Some(Reply::Batch(responses))
        }
    }

    async fn process_parallel(
        &self,
        items: Vec<Value>,
        processor: &Processor,
    ) -> Vec<JsonRpcResponse> {
        let tasks: Vec<_> = items
            .into_iter()
            .map(|item| {
                let owed_id = reply_id(&item);
                let processor = processor.clone();
                let task = tokio::spawn(async move { processor.process_element(item).await });
                (owed_id, task)
            })
            .collect();

        let mut responses = Vec::new();
        for (owed_id, task) in tasks {
            match task.await {
                Ok(Some(response)) => responses.push(response),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Batch element task failed");
                    if let Some(id) = owed_id {
                        responses.push(processor.protocol_error(
                            ErrorObject::internal_error(),
                            id,
                        ));
                    }
                }
            }
        }
        responses
    }

    async fn process_sequential(
        &self,
        items: Vec<Value>,
        processor: &Processor,
    ) -> Vec<JsonRpcResponse> {
        let mut responses = Vec::new();
        for item in items {
            if let Some(response) = processor.process_element(item).await {
                responses.push(response);
            }
        }
        responses
    }
}

/// Id a reply would be owed under, if the element is a request
fn reply_id(item: &Value) -> Option<Value> {
    item.get("id")
        .filter(|id| matches!(id, Value::String(_) | Value::Number(_)))
        .cloned()
}
