//! Walks through the monitoring lifecycle end to end.
//!
//! Builds the aggregate handle, makes one simulated call across a process
//! boundary (client span, carrier, server span), logs with trace
//! correlation, records a counter and a histogram, then shuts down.
//!
//! # Configuration
//!
//! Configuration is loaded from (in order of priority):
//! 1. Default values
//! 2. Config file: `$MONITORING_CONFIG`, or `monitoring.toml`
//! 3. `OTEL_SERVICE_NAME` and `OTEL_TRACES_SAMPLER_ARG`
//! 4. Environment variables with `MONITORING_` prefix
//!
//! Without a configured service name the example calls itself
//! `monitoring-example`.

use anyhow::{Context as _, Result};
use opentelemetry::{Context, KeyValue};
use opentelemetry_monitoring::config::with_service_name;
use opentelemetry_monitoring::{Fields, Monitoring, MonitoringBuilder};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG_PATH: &str = "monitoring.toml";
const DEFAULT_SERVICE_NAME: &str = "monitoring-example";
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("failed to initialise tracing subscriber")?;

    let config_path =
        std::env::var("MONITORING_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config = MonitoringBuilder::new()
        .with_file(&config_path)
        .with_standard_env()
        .with_env()
        .config()
        .context("failed to load configuration")?;
    if config.service.name.is_empty() {
        config = config.with_mutators([with_service_name(DEFAULT_SERVICE_NAME)]);
    }
    tracing::debug!(?config, "Configuration loaded");

    let monitoring = Monitoring::from_config(&config).context("failed to initialise monitoring")?;

    handle_request(&monitoring);

    tokio::task::spawn_blocking(move || monitoring.shutdown(SHUTDOWN_TIMEOUT))
        .await
        .context("shutdown task panicked")?
        .context("failed to shut down monitoring")?;

    Ok(())
}

fn handle_request(monitoring: &Monitoring) {
    let tracer = monitoring.tracer();
    let metric = monitoring.metric();

    let requests = metric.create_counter("requests_total", "1", "Requests handled");
    let latency = metric.create_histogram("request_duration", "ms", "Request latency");

    // client side
    let client_cx = tracer.start_span(&Context::new(), "GET /inventory");
    let carrier = tracer.inject_context(&client_cx);

    // server side, on the other end of the carrier
    let started = Instant::now();
    let remote_cx = tracer.extract_context(&Context::new(), &carrier);
    let server_cx = tracer.start_span(&remote_cx, "inventory.lookup");
    let logger = monitoring
        .logger()
        .with_span_context(&tracer.span_context(&server_cx));

    logger.info("looking up inventory", &fields(json!({"sku": "A-1001"})));

    let attributes = [KeyValue::new("route", "/inventory")];
    metric.record_counter(&requests, 1, &attributes);
    metric.record_histogram(
        &latency,
        started.elapsed().as_millis() as u64,
        &attributes,
    );

    tracer.end_span(&server_cx);
    tracer.end_span(&client_cx);
    logger.info("request completed", &Fields::new());

    if let Err(e) = monitoring.flush() {
        tracing::warn!(error = %e, "Failed to flush logger");
    }
}

fn fields(value: serde_json::Value) -> Fields {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Fields::new(),
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,monitoring_lifecycle=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).without_time().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("failed to initialise tracing registry")?;

    Ok(())
}
