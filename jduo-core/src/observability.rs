//! Logging, tracing and metrics bootstrap
//!
//! jduo logs through `tracing` everywhere. Applications that want those events (and the
//! engine's metrics) exported call [`init_observability`] once at startup:
//!
//! - a JSON `tracing-subscriber` formatter filtered by `RUST_LOG` or the configured level
//! - an OTLP span exporter bridged through `tracing-opentelemetry`
//! - an OTLP metric exporter behind the global meter used by [`crate::RpcMetrics`]
//!
//! ```rust,no_run
//! use jduo_core::ObservabilityConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ObservabilityConfig::new("rpc-gateway")
//!         .with_endpoint("http://localhost:4317")
//!         .with_log_level("debug");
//!
//!     jduo_core::init_observability(config).expect("Failed to init observability");
//!
//!     // ... run the application ...
//!
//!     jduo_core::shutdown_observability();
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: collector endpoint used when none is configured
//! - `RUST_LOG`: log filter, takes precedence over the configured level

use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Installed providers, kept so that shutdown can flush them
#[derive(Default)]
struct Providers {
    tracer: Option<SdkTracerProvider>,
    meter: Option<SdkMeterProvider>,
}

static PROVIDERS: OnceLock<Mutex<Providers>> = OnceLock::new();

/// Observability settings
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Reported as `service.name`
    pub service_name: String,

    /// Reported as `service.version`
    pub service_version: String,

    /// OTLP/gRPC collector endpoint
    pub otlp_endpoint: String,

    pub enable_traces: bool,

    pub enable_metrics: bool,

    /// Emit JSON log lines locally
    pub enable_logs: bool,

    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "jduo".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            enable_traces: true,
            enable_metrics: true,
            enable_logs: true,
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl ObservabilityConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    pub fn with_traces(mut self, enable: bool) -> Self {
        self.enable_traces = enable;
        self
    }

    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    pub fn with_logs(mut self, enable: bool) -> Self {
        self.enable_logs = enable;
        self
    }

    fn resource(&self) -> Resource {
        Resource::builder_empty()
            .with_attributes(vec![
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                    self.service_name.clone(),
                ),
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                    self.service_version.clone(),
                ),
            ])
            .build()
    }
}

/// Install the tracing subscriber and the OTLP pipelines
///
/// Must be called from within a tokio runtime. Fails if a global subscriber is already set.
pub fn init_observability(config: ObservabilityConfig) -> Result<(), BoxError> {
    let tracer_provider = if config.enable_traces {
        Some(init_tracer(&config)?)
    } else {
        None
    };

    let meter_provider = if config.enable_metrics {
        Some(init_metrics(&config)?)
    } else {
        None
    };

    init_tracing_subscriber(&config, tracer_provider.as_ref())?;

    let mut providers = PROVIDERS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    providers.tracer = tracer_provider;
    providers.meter = meter_provider;

    tracing::info!(
        service_name = %config.service_name,
        otlp_endpoint = %config.otlp_endpoint,
        traces = config.enable_traces,
        metrics = config.enable_metrics,
        logs = config.enable_logs,
        "Observability initialized"
    );

    Ok(())
}

fn init_tracer(config: &ObservabilityConfig) -> Result<SdkTracerProvider, BoxError> {
    use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(config.resource())
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .build();

    global::set_tracer_provider(provider.clone());
    Ok(provider)
}

fn init_metrics(config: &ObservabilityConfig) -> Result<SdkMeterProvider, BoxError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
        .with_interval(METRIC_EXPORT_INTERVAL)
        .build();

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(config.resource())
        .build();

    global::set_meter_provider(provider.clone());
    Ok(provider)
}

fn init_tracing_subscriber(
    config: &ObservabilityConfig,
    tracer_provider: Option<&SdkTracerProvider>,
) -> Result<(), BoxError> {
    use opentelemetry::trace::TracerProvider as _;

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let telemetry_layer = tracer_provider.map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    let fmt_layer = config.enable_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .json()
    });

    tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Flush and shut down the exporters installed by [`init_observability`]
pub fn shutdown_observability() {
    let Some(providers) = PROVIDERS.get() else {
        return;
    };
    let mut providers = providers.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(tracer) = providers.tracer.take() {
        if let Err(e) = tracer.shutdown() {
            tracing::warn!(error = %e, "Tracer provider shutdown failed");
        }
    }
    if let Some(meter) = providers.meter.take() {
        if let Err(e) = meter.shutdown() {
            tracing::warn!(error = %e, "Meter provider shutdown failed");
        }
    }
    tracing::info!("Observability shut down");
}
