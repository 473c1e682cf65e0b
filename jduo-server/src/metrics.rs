//! Connection-level metrics for the WebSocket server
//!
//! Call-level instruments live in [`jduo_core::RpcMetrics`]; this module only tracks the
//! transport.
//!
//! - `jduo.server.connections.active`: open WebSocket connections (gauge)
//! - `jduo.server.connections.total`: connections accepted since startup
//! - `jduo.server.messages.total`: inbound text frames
//! - `jduo.server.errors.total`: transport errors, by kind

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Meter},
    KeyValue,
};

/// Server transport metrics
pub struct ServerMetrics {
    pub connections_active: Gauge<i64>,
    pub connections_total: Counter<u64>,
    pub messages_total: Counter<u64>,
    pub errors_total: Counter<u64>,
}

impl ServerMetrics {
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connections_active: meter
                .i64_gauge("jduo.server.connections.active")
                .with_description("Number of open WebSocket connections")
                .build(),
            connections_total: meter
                .u64_counter("jduo.server.connections.total")
                .with_description("Connections accepted since startup")
                .build(),
            messages_total: meter
                .u64_counter("jduo.server.messages.total")
                .with_description("Inbound text messages")
                .build(),
            errors_total: meter
                .u64_counter("jduo.server.errors.total")
                .with_description("Transport errors")
                .build(),
        }
    }

    pub fn record_connection(&self, active: i64) {
        self.connections_active.record(active, &[]);
        self.connections_total.add(1, &[]);
    }

    pub fn record_disconnection(&self, active: i64) {
        self.connections_active.record(active, &[]);
    }

    pub fn record_message(&self) {
        self.messages_total.add(1, &[]);
    }

    pub fn record_error(&self, kind: &'static str) {
        self.errors_total.add(1, &[KeyValue::new("kind", kind)]);
    }
}

impl std::fmt::Debug for ServerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerMetrics").finish_non_exhaustive()
    }
}
