//! Client builder
//!
//! # Examples
//!
//! ```rust,no_run
//! use jduo_client::ClientBuilder;
//! use jduo_core::Response;
//! use std::time::Duration;
//!
//! # async fn example() -> jduo_core::Result<()> {
//! let client = ClientBuilder::new("localhost:8080")
//!     .request_timeout(Duration::from_secs(5))
//!     .bind_method("whoami", |_| Response::ok("\"desktop\""))?
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::JduoClient;
use jduo_core::{
    BatchMode, Error, Handler, ObservabilityConfig, Processor, Registry, Responder, Response,
    Result, RpcMetrics,
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`JduoClient`]
pub struct ClientBuilder {
    url: String,
    registry: Registry,
    batch_mode: BatchMode,
    max_batch_size: Option<usize>,
    request_timeout: Option<Duration>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            registry: Registry::new(),
            batch_mode: BatchMode::default(),
            max_batch_size: None,
            request_timeout: None,
            observability_config: None,
            service_name: None,
        }
    }

    /// Give up on requests not answered within `timeout`
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// How batches sent by the server are processed
    pub fn batch_mode(mut self, mode: BatchMode) -> Self {
        self.batch_mode = mode;
        self
    }

    pub fn max_batch_size(mut self, max_size: usize) -> Self {
        self.max_batch_size = Some(max_size);
        self
    }

    /// Use an existing registry for the methods the server may call
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

    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Open the connection
    pub async fn connect(self) -> Result<JduoClient> {
        let metrics = match self.observability_config {
            Some(mut config) => {
                if let Some(name) = self.service_name {
                    config.service_name = name;
                }
                jduo_core::init_observability(config.clone()).map_err(|e| {
                    Error::Internal(format!("Failed to initialize observability: {}", e))
                })?;
                Some(Arc::new(RpcMetrics::new(config.service_name)))
            }
            None => None,
        };

        let mut processor = Processor::new(self.registry).with_batch_mode(self.batch_mode);
        if let Some(limit) = self.max_batch_size {
            processor = processor.with_max_batch_size(limit);
        }
        if let Some(m) = &metrics {
            processor = processor.with_metrics(Arc::clone(m));
        }

        JduoClient::establish(&self.url, processor, self.request_timeout, metrics).await
    }
}
