//! Tracing initialisation for the `rovos` binary.
//!
//! Console format and span export are driven by the `[log]` section of
//! `rovos.toml` (the config layer applies `ROVOS_LOG_FORMAT` and
//! `OTEL_EXPORTER_OTLP_ENDPOINT` overrides before this module sees the
//! values). `RUST_LOG` controls the filter, default `"info"`.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogConfig, LogFormat};

const SERVICE_NAME: &str = "rovos";

/// Install the global subscriber. Hold the returned guard until the process
/// exits; dropping it flushes pending spans.
pub fn init_tracing(log: &LogConfig) -> TelemetryGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let provider = log.otlp_endpoint.as_deref().and_then(build_provider);
    let spans = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(SERVICE_NAME)));

    let registry = tracing_subscriber::registry().with(filter).with(spans);
    match log.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
    }

    TelemetryGuard(provider)
}

/// Shuts the span exporter down on drop so buffered spans reach the
/// collector before exit. A no-op when export is not configured.
pub struct TelemetryGuard(Option<SdkTracerProvider>);

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(err) = provider.shutdown()
        {
            eprintln!("[rovos] span exporter shutdown failed: {err}");
        }
    }
}

/// A provider exporting to `endpoint`, or `None` when the exporter cannot be
/// built (the error goes to stderr and the console subscriber still comes up).
fn build_provider(endpoint: &str) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|err| eprintln!("[rovos] OTLP exporter init failed: {err}"))
        .ok()?;

    let resource = Resource::builder().with_service_name(SERVICE_NAME).build();
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // The simple (synchronous) exporter needs no Tokio runtime at
            // init time; the binary builds its runtime afterwards.
            .with_simple_exporter(exporter)
            .build(),
    )
}
