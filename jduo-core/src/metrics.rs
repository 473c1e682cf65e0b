//! OpenTelemetry metrics for the RPC engine
//!
//! Instruments are created from the global meter, so they export through whatever
//! provider [`crate::init_observability`] installed, and are no-ops otherwise.
//!
//! # Metrics
//!
//! - `jduo.calls.total`: inbound calls handled, by method and outcome
//! - `jduo.call.duration`: handler latency in seconds, by method
//! - `jduo.batch.size`: elements per inbound batch, by mode
//! - `jduo.protocol_errors.total`: error replies produced by the engine itself, by code
//! - `jduo.requests.pending`: outbound requests awaiting a reply
//! - `jduo.requests.total`: outbound requests settled, by outcome

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, UpDownCounter},
    KeyValue,
};

/// Metrics collector shared by processors and requesters
pub struct RpcMetrics {
    pub calls_total: Counter<u64>,
    pub call_duration: Histogram<f64>,
    pub batch_size: Histogram<u64>,
    pub protocol_errors_total: Counter<u64>,
    pub requests_pending: UpDownCounter<i64>,
    pub requests_total: Counter<u64>,
}

impl RpcMetrics {
    /// Create instruments on the global meter named after the service
    pub fn new(service_name: impl Into<String>) -> Self {
        // the global meter registry wants a 'static scope name
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            calls_total: meter
                .u64_counter("jduo.calls.total")
                .with_description("Inbound calls handled")
                .build(),
            call_duration: meter
                .f64_histogram("jduo.call.duration")
                .with_description("Handler latency in seconds")
                .build(),
            batch_size: meter
                .u64_histogram("jduo.batch.size")
                .with_description("Number of elements in inbound batches")
                .build(),
            protocol_errors_total: meter
                .u64_counter("jduo.protocol_errors.total")
                .with_description("Error replies produced by the engine")
                .build(),
            requests_pending: meter
                .i64_up_down_counter("jduo.requests.pending")
                .with_description("Outbound requests awaiting a reply")
                .build(),
            requests_total: meter
                .u64_counter("jduo.requests.total")
                .with_description("Outbound requests settled")
                .build(),
        }
    }

    /// Record a dispatched call; `outcome` is "success", "error" or "notification"
    pub fn record_call(&self, method: &str, outcome: &'static str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("outcome", outcome),
        ];
        self.calls_total.add(1, attributes);
        self.call_duration
            .record(duration_secs, &[KeyValue::new("method", method.to_string())]);
    }

    pub fn record_batch(&self, size: u64, mode: &'static str) {
        self.batch_size.record(size, &[KeyValue::new("mode", mode)]);
    }

    pub fn record_protocol_error(&self, code: i32) {
        self.protocol_errors_total
            .add(1, &[KeyValue::new("code", i64::from(code))]);
    }

    pub fn record_request_sent(&self) {
        self.requests_pending.add(1, &[]);
    }

    /// Record a settled request; `outcome` is "resolved", "timeout", "cancelled" or "closed"
    pub fn record_request_settled(&self, outcome: &'static str) {
        self.requests_pending.add(-1, &[]);
        self.requests_total.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}
