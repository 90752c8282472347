//! Metric backend on top of `SdkMeterProvider`.

use super::{ExportTarget, TargetError, build_resource, otlp_endpoint, tls_config};
use crate::config::{MetricConfig, ServiceConfig};
use crate::error::BoxError;
use crate::handle::Metric;
use opentelemetry::InstrumentationScope;
use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider as _};
use opentelemetry_otlp::{ExporterBuildError, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::error::OTelSdkError;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the metric backend.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MetricError {
    /// The provider kind is neither `stdout` nor `otlp`.
    #[error("invalid metric provider: {0:?}")]
    InvalidProvider(String),

    /// `otlp` was selected without a host.
    #[error("metric provider host is required")]
    ProviderHostRequired,

    /// `otlp` was selected without a port.
    #[error("metric provider port is required")]
    ProviderPortRequired,

    /// The export interval is zero.
    #[error("metric export interval must be greater than 0")]
    IntervalInvalid,

    /// An `otlp` exporter was requested outside a Tokio runtime.
    #[error("otlp metric exporter requires a Tokio runtime")]
    RuntimeRequired,

    /// The metric exporter could not be built.
    #[error("failed to create metric exporter")]
    Exporter(#[source] ExporterBuildError),

    /// The provider failed to shut down.
    #[error("failed to shutdown meter provider")]
    Shutdown(#[source] OTelSdkError),
}

impl From<TargetError> for MetricError {
    fn from(err: TargetError) -> Self {
        match err {
            TargetError::InvalidProvider(p) => Self::InvalidProvider(p),
            TargetError::HostRequired => Self::ProviderHostRequired,
            TargetError::PortRequired => Self::ProviderPortRequired,
        }
    }
}

/// Checks the fields the metric backend needs before anything is built.
pub fn validate(config: &MetricConfig) -> Result<(), MetricError> {
    export_target(config).map(drop)
}

fn export_target(config: &MetricConfig) -> Result<ExportTarget, MetricError> {
    let target = ExportTarget::parse(&config.provider, &config.host, config.port)?;
    if config.interval.is_zero() {
        return Err(MetricError::IntervalInvalid);
    }
    Ok(target)
}

fn require_runtime() -> Result<(), MetricError> {
    tokio::runtime::Handle::try_current()
        .map(drop)
        .map_err(|_| MetricError::RuntimeRequired)
}

/// Metric handle owning its own meter provider.
pub struct SdkMetric {
    provider: SdkMeterProvider,
    meter: Meter,
}

impl fmt::Debug for SdkMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkMetric").finish_non_exhaustive()
    }
}

impl SdkMetric {
    /// Builds a metric handle for `service`, exporting every
    /// `config.interval`.
    ///
    /// # Errors
    ///
    /// Returns a validation variant of [`MetricError`] for an unusable
    /// configuration, [`MetricError::RuntimeRequired`] for an `otlp` provider
    /// outside a Tokio runtime and [`MetricError::Exporter`] if the exporter
    /// fails to build.
    pub fn new(service: &ServiceConfig, config: &MetricConfig) -> Result<Self, MetricError> {
        let target = export_target(config)?;

        // PeriodicReader is generic over its exporter, so each arm finishes
        // its own builder.
        let builder = match target {
            ExportTarget::Stdout => SdkMeterProvider::builder().with_reader(
                PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
                    .with_interval(config.interval)
                    .build(),
            ),
            ExportTarget::Otlp { host, port } => {
                require_runtime()?;
                let mut builder = opentelemetry_otlp::MetricExporter::builder()
                    .with_tonic()
                    .with_endpoint(otlp_endpoint(&host, port, config.insecure));
                if !config.insecure {
                    builder = builder.with_tls_config(tls_config(&host));
                }
                let exporter = builder.build().map_err(MetricError::Exporter)?;
                SdkMeterProvider::builder().with_reader(
                    PeriodicReader::builder(exporter)
                        .with_interval(config.interval)
                        .build(),
                )
            }
        };

        let provider = builder.with_resource(build_resource(service)).build();

        let scope = InstrumentationScope::builder(service.name.clone()).build();
        let meter = provider.meter_with_scope(scope);

        Ok(Self { provider, meter })
    }
}

impl Metric for SdkMetric {
    fn create_counter(&self, name: &str, unit: &str, description: &str) -> Counter<u64> {
        self.meter
            .u64_counter(name.to_string())
            .with_unit(unit.to_string())
            .with_description(description.to_string())
            .build()
    }

    fn create_histogram(&self, name: &str, unit: &str, description: &str) -> Histogram<u64> {
        self.meter
            .u64_histogram(name.to_string())
            .with_unit(unit.to_string())
            .with_description(description.to_string())
            .build()
    }

    fn shutdown(&self, timeout: Duration) -> Result<(), BoxError> {
        match self.provider.shutdown_with_timeout(timeout) {
            Ok(()) | Err(OTelSdkError::AlreadyShutdown) => Ok(()),
            Err(err) => Err(MetricError::Shutdown(err).into()),
        }
    }
}
