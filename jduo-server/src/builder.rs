//! Server builder
//!
//! Method registration on the builder fails immediately for names under the reserved
//! `rpc.` prefix, so those calls return `Result<Self>`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use jduo_server::{JduoServer, BatchMode, Response};
//! use std::time::Duration;
//!
//! # async fn example() -> jduo_core::Result<()> {
//! let server = JduoServer::builder()
//!     .bind_str("127.0.0.1:8080")?
//!     .bind_method("ping", |_| Response::ok("\"pong\""))?
//!     .batch_mode(BatchMode::Sequential)
//!     .max_batch_size(100)
//!     .request_timeout(Duration::from_secs(10))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::connection::ConnectionContext;
use crate::{JduoServer, ServerMetrics};
use jduo_core::{
    BatchMode, Error, Handler, ObservabilityConfig, Processor, Registry, Responder, Response,
    Result, RpcMetrics,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Builder for [`JduoServer`]
pub struct ServerBuilder {
    addr: Option<SocketAddr>,
    registry: Registry,
    batch_mode: BatchMode,
    max_batch_size: Option<usize>,
    request_timeout: Option<Duration>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            addr: None,
            registry: Registry::new(),
            batch_mode: BatchMode::default(),
            max_batch_size: None,
            request_timeout: None,
            observability_config: None,
            service_name: None,
        }
    }

    pub fn bind(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    /// Set the bind address from a string such as `"127.0.0.1:8080"`
    pub fn bind_str(mut self, addr: &str) -> Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::Io(format!("Invalid address: {}", e)))?;
        self.addr = Some(addr);
        Ok(self)
    }

    /// Use an existing registry, replacing any methods bound so far
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn handler(self, method: impl Into<String>, handler: Box<dyn Handler>) -> Result<Self> {
        self.registry.register(method, handler)?;
        Ok(self)
    }

    pub fn bind_method<F>(self, method: impl Into<String>, func: F) -> Result<Self>
    where
        F: Fn(&str) -> Response + Send + Sync + 'static,
    {
        self.registry.bind(method, func)?;
        Ok(self)
    }

    pub fn bind_async<F>(self, method: impl Into<String>, func: F) -> Result<Self>
    where
        F: Fn(String, Responder) + Send + Sync + 'static,
    {
        self.registry.bind_async(method, func)?;
        Ok(self)
    }

    pub fn notify<F>(self, method: impl Into<String>, func: F) -> Result<Self>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.registry.notify(method, func)?;
        Ok(self)
    }

    pub fn batch_mode(mut self, mode: BatchMode) -> Self {
        self.batch_mode = mode;
        self
    }

    /// Answer larger batches with a single Invalid Request
    pub fn max_batch_size(mut self, max_size: usize) -> Self {
        self.max_batch_size = Some(max_size);
        self
    }

    /// Timeout for requests the server sends to its clients
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Service name reported by observability, if enabled
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Bind the listener and assemble the server
    pub async fn build(self) -> Result<JduoServer> {
        let addr = self
            .addr
            .ok_or_else(|| Error::Io("No bind address specified".to_string()))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;

        let (rpc_metrics, metrics) = match self.observability_config {
            Some(mut config) => {
                if let Some(name) = self.service_name {
                    config.service_name = name;
                }
                jduo_core::init_observability(config.clone()).map_err(|e| {
                    Error::Internal(format!("Failed to initialize observability: {}", e))
                })?;
                (
                    Some(Arc::new(RpcMetrics::new(config.service_name.clone()))),
                    Some(Arc::new(ServerMetrics::new(config.service_name))),
                )
            }
            None => (None, None),
        };

        let mut processor = Processor::new(self.registry).with_batch_mode(self.batch_mode);
        if let Some(limit) = self.max_batch_size {
            processor = processor.with_max_batch_size(limit);
        }
        if let Some(m) = &rpc_metrics {
            processor = processor.with_metrics(Arc::clone(m));
        }

        tracing::info!(addr = %addr, "Server listening");

        Ok(JduoServer {
            listener,
            context: ConnectionContext {
                processor,
                registry: Arc::new(Mutex::new(HashMap::new())),
                request_timeout: self.request_timeout,
                rpc_metrics,
                metrics,
            },
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
