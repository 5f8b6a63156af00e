//! Tracing subscriber setup for DepthLink processes.
//!
//! Call [`init_tracing`] once at startup and keep the returned guard alive
//! until exit.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `DEPTHLINK_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL. When set, spans such as the transport's `open` are exported over OTLP/HTTP. |
//!
//! ```rust,no_run
//! let _guard = depthlink_runtime::telemetry::init_tracing("depthlink");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FORMAT_VAR: &str = "DEPTHLINK_LOG_FORMAT";
const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Output format of the console log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Parse the value of `DEPTHLINK_LOG_FORMAT`.  Anything but `json`
    /// (case-insensitive) selects the compact format.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Subscriber settings, normally read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingOptions {
    pub format: LogFormat,
    /// OTLP/HTTP collector URL; `None` keeps spans local.
    pub otlp_endpoint: Option<String>,
}

impl TracingOptions {
    /// Build from raw variable values.  A blank endpoint disables export.
    pub fn from_values(format: Option<&str>, otlp_endpoint: Option<&str>) -> Self {
        Self {
            format: LogFormat::parse(format),
            otlp_endpoint: otlp_endpoint
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
        }
    }

    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var(LOG_FORMAT_VAR).ok().as_deref(),
            std::env::var(OTLP_ENDPOINT_VAR).ok().as_deref(),
        )
    }
}

/// [`init_tracing_with`] using [`TracingOptions::from_env`].
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    init_tracing_with(service_name, TracingOptions::from_env())
}

/// Install the global subscriber: env filter, optional OTLP export, and a
/// console layer in the requested format.
///
/// Calling this twice is harmless; the second call reports the conflict on
/// stderr and leaves the first subscriber in place.  An exporter that fails
/// to build is reported the same way and logging continues without it.
pub fn init_tracing_with(service_name: &str, options: TracingOptions) -> TracerProviderGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let provider = options
        .otlp_endpoint
        .and_then(|endpoint| {
            opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_endpoint(endpoint)
                .build()
                .map_err(|e| eprintln!("[depthlink] OTLP exporter init failed: {e}"))
                .ok()
        })
        .map(|exporter| {
            let resource = Resource::builder()
                .with_service_name(service_name.to_string())
                .build();
            // Simple exporter: the CLI initialises tracing before its runtime exists.
            SdkTracerProvider::builder()
                .with_resource(resource)
                .with_simple_exporter(exporter)
                .build()
        });

    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("depthlink")));
    let console_layer = match options.format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(console_layer)
        .try_init()
    {
        eprintln!("[depthlink] tracing already initialised: {e}");
    }

    TracerProviderGuard(provider)
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// Flushes and shuts down the OTLP provider (if any) on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[depthlink] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
