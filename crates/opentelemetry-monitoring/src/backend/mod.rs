//! Concrete backends behind the capability traits.

pub mod logger;
pub mod metric;
pub mod tracer;

use crate::config::{LoggerConfig, MetricConfig, ServiceConfig, TracerConfig};
use crate::error::BoxError;
use crate::handle::{Logger, Metric, Tracer};
use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource as semconv_res;

/// Factory for component handles.
///
/// The orchestrator validates configuration before calling into a factory,
/// and never calls the factory for a later component once an earlier one has
/// failed.
pub trait Backends {
    /// Builds a logger.
    fn logger(&self, config: &LoggerConfig) -> Result<Box<dyn Logger>, BoxError>;

    /// Builds a tracer for `service`.
    fn tracer(
        &self,
        service: &ServiceConfig,
        config: &TracerConfig,
    ) -> Result<Box<dyn Tracer>, BoxError>;

    /// Builds a metric handle for `service`.
    fn metric(
        &self,
        service: &ServiceConfig,
        config: &MetricConfig,
    ) -> Result<Box<dyn Metric>, BoxError>;
}

/// Default factory: `tracing` for logs, the OpenTelemetry SDK for traces and
/// metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtelBackends;

impl Backends for OtelBackends {
    fn logger(&self, config: &LoggerConfig) -> Result<Box<dyn Logger>, BoxError> {
        Ok(Box::new(logger::TracingLogger::new(config)?))
    }

    fn tracer(
        &self,
        service: &ServiceConfig,
        config: &TracerConfig,
    ) -> Result<Box<dyn Tracer>, BoxError> {
        Ok(Box::new(tracer::SdkTracer::new(service, config)?))
    }

    fn metric(
        &self,
        service: &ServiceConfig,
        config: &MetricConfig,
    ) -> Result<Box<dyn Metric>, BoxError> {
        Ok(Box::new(metric::SdkMetric::new(service, config)?))
    }
}

/// Where a tracer or metric backend sends its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExportTarget {
    Stdout,
    Otlp { host: String, port: u16 },
}

/// Problems with a provider/host/port triple, shared by tracer and metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TargetError {
    InvalidProvider(String),
    HostRequired,
    PortRequired,
}

impl ExportTarget {
    pub(crate) fn parse(provider: &str, host: &str, port: u16) -> Result<Self, TargetError> {
        match provider.trim() {
            p if p.eq_ignore_ascii_case("stdout") => Ok(Self::Stdout),
            p if p.eq_ignore_ascii_case("otlp") => {
                let host = host.trim();
                if host.is_empty() {
                    return Err(TargetError::HostRequired);
                }
                if port == 0 {
                    return Err(TargetError::PortRequired);
                }
                Ok(Self::Otlp {
                    host: host.to_string(),
                    port,
                })
            }
            other => Err(TargetError::InvalidProvider(other.to_string())),
        }
    }
}

/// Collector endpoint URL for a remote target.
///
/// Plain `http` when `insecure`, otherwise `https` with TLS towards `host`.
pub(crate) fn otlp_endpoint(host: &str, port: u16, insecure: bool) -> String {
    let scheme = if insecure { "http" } else { "https" };
    format!("{scheme}://{host}:{port}")
}

pub(crate) fn tls_config(host: &str) -> tonic::transport::ClientTlsConfig {
    tonic::transport::ClientTlsConfig::new()
        .with_enabled_roots()
        .domain_name(host)
}

/// Resource describing the service, shared by traces and metrics.
///
/// Empty identity fields are omitted rather than exported as empty strings.
pub(crate) fn build_resource(service: &ServiceConfig) -> Resource {
    let attributes = [
        (semconv_res::DEPLOYMENT_ENVIRONMENT_NAME, &service.environment),
        (semconv_res::SERVICE_INSTANCE_ID, &service.instance_name),
        (semconv_res::HOST_NAME, &service.instance_host),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(key, value)| KeyValue::new(key, value.clone()));

    Resource::builder()
        .with_service_name(service.name.clone())
        .with_attributes(attributes)
        .build()
}
