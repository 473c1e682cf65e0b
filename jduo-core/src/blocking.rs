//! Blocking front end for the request processor
//!
//! For callers on plain threads that want a reply as a return value. Processing still
//! happens on the tokio runtime; the outcome crosses back through a oneshot channel,
//! which tolerates the reply being ready before the caller starts waiting.

use crate::processor::Processor;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Synchronous wrapper around a [`Processor`]
#[derive(Clone, Debug)]
pub struct BlockingProcessor {
    processor: Processor,
    runtime: Handle,
}

impl BlockingProcessor {
    pub fn new(processor: Processor, runtime: Handle) -> Self {
        Self { processor, runtime }
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    /// Process one message and block until its reply, if any, is ready
    ///
    /// Blocks for as long as the handler takes to respond, so a handler that never
    /// responds blocks forever.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn process(&self, message: &str) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        let processor = self.processor.clone();
        let message = message.to_string();

        self.runtime.spawn(async move {
            let _ = tx.send(processor.process(&message).await);
        });

        match rx.blocking_recv() {
            Ok(reply) => reply,
            Err(_) => {
                tracing::error!("Processing task ended without a result");
                None
            }
        }
    }
}
