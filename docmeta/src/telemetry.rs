//! Telemetry initialization: the service log file, console output and optional OpenTelemetry
//! export.
//!
//! The subscriber is constructed explicitly from [`LoggingConfig`] by [`build_subscriber`] and
//! returned to the caller. The binary installs it globally with [`init_telemetry`]; tests scope
//! it to a thread with `tracing::subscriber::set_default`.
//!
//! Layers:
//!
//! - **File**: plain text, one line per event (timestamp, level, message, fields), appended to
//!   `logging.log_dir/logging.file_name`. The file is never rotated.
//! - **Console**: the same events on stdout, when `logging.console` is set.
//! - **OTLP**: span export, only when `enable_otel_export` is set. Configured through the
//!   standard OpenTelemetry environment variables:
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT` - The OTLP endpoint URL
//! - `OTEL_EXPORTER_OTLP_PROTOCOL` - Protocol (http/protobuf, http/json)
//! - `OTEL_EXPORTER_OTLP_HEADERS` - Headers as comma-separated key=value pairs, spaces encoded as %20
//! - `OTEL_SERVICE_NAME` - Service name for resource identification
//!
//! Filtering uses `logging.level` if set, otherwise `RUST_LOG`, otherwise `info`.

use crate::config::LoggingConfig;
use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{Subscriber, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Global tracer provider reference for shutdown.
///
/// `tracing-opentelemetry` clones the tracer, not the provider, so we keep our own reference to
/// flush pending spans on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Build the subscriber described by `logging`, creating the log directory if needed.
pub fn build_subscriber(logging: &LoggingConfig, enable_otel_export: bool) -> anyhow::Result<impl Subscriber + Send + Sync + 'static> {
    let env_filter = match &logging.level {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    std::fs::create_dir_all(&logging.log_dir)?;
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(&logging.file_name)
        .build(&logging.log_dir)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(file_appender);

    let console_layer = logging.console.then(tracing_subscriber::fmt::layer);

    let otel_layer = if enable_otel_export {
        // If env vars aren't usable, carry on without export
        match create_otlp_tracer() {
            Ok(tracer) => Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Err(e) => {
                eprintln!("[OTLP] Export disabled, failed to create tracer: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .with(otel_layer))
}

/// Build the subscriber and install it as the global default.
pub fn init_telemetry(logging: &LoggingConfig, enable_otel_export: bool) -> anyhow::Result<()> {
    build_subscriber(logging, enable_otel_export)?.try_init()?;

    info!(
        log_file = %logging.log_file().display(),
        otel_export = enable_otel_export,
        "Telemetry initialized"
    );
    Ok(())
}

/// Create an OpenTelemetry tracer with OTLP exporter
fn create_otlp_tracer() -> anyhow::Result<opentelemetry_sdk::trace::Tracer> {
    let service_name = std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "docmeta".to_string());
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|_| "http://localhost:4318".to_string());

    eprintln!("[OTLP] Service Name: {}", service_name);
    eprintln!("[OTLP] Endpoint: {}", endpoint);

    let headers = std::env::var("OTEL_EXPORTER_OTLP_HEADERS")
        .map(|raw| parse_otlp_headers(&raw))
        .unwrap_or_default();

    let protocol = match std::env::var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref().unwrap_or("http/protobuf") {
        "http/json" => Protocol::HttpJson,
        _ => Protocol::HttpBinary,
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(&endpoint)
        .with_protocol(protocol)
        .with_headers(headers)
        .build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_attribute(KeyValue::new("service.name", service_name.clone()))
                .build(),
        )
        .build();

    let tracer = tracer_provider.tracer(service_name);
    let _ = TRACER_PROVIDER.set(tracer_provider);

    Ok(tracer)
}

/// Parse comma-separated `key=value` pairs, decoding `%20` as a space.
fn parse_otlp_headers(raw: &str) -> HashMap<String, String> {
    raw.replace("%20", " ")
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Shutdown the global tracer provider gracefully
///
/// Should be called before application exit to flush any pending spans
pub fn shutdown_telemetry() {
    if let Some(provider) = TRACER_PROVIDER.get()
        && let Err(e) = provider.shutdown()
    {
        tracing::error!("Failed to shutdown tracer provider: {}", e);
    }
}
