//! Tracing subscriber configuration.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use playground_core::config::TelemetryConfig;
use playground_core::{Error, Result};

const SERVICE_NAME: &str = "playground";

/// Filter directives: `RUST_LOG` wins over the configured filter.
fn env_filter(config: &TelemetryConfig) -> EnvFilter {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_filter.clone());
    EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{}': {}; using 'info'", directives, e);
        EnvFilter::new("info")
    })
}

/// Install the global subscriber: stderr logs (plain or JSON) plus an OTLP
/// exporter when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
pub fn configure_tracing(config: &TelemetryConfig) -> Result<()> {
    let json = config.json_logs;
    let registry = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)));

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        let provider = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint.clone()),
            )
            .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(vec![
                KeyValue::new("service.name", SERVICE_NAME),
            ])))
            .install_batch(runtime::Tokio)
            .map_err(|e| Error::operation(format!("Failed to install OTLP pipeline: {}", e)))?;

        let tracer = provider.tracer(SERVICE_NAME);
        opentelemetry::global::set_tracer_provider(provider);
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        registry
            .with(otel_layer)
            .try_init()
            .map_err(|e| Error::operation(format!("Failed to install subscriber: {}", e)))?;
        tracing::info!(endpoint = %endpoint, "OpenTelemetry tracing enabled");
    } else {
        registry
            .try_init()
            .map_err(|e| Error::operation(format!("Failed to install subscriber: {}", e)))?;
    }

    Ok(())
}

/// Flush pending spans before exit.
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}
