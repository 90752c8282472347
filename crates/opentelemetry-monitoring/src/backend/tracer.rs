//! Tracer backend on top of `SdkTracerProvider`.

use super::{ExportTarget, TargetError, build_resource, otlp_endpoint, tls_config};
use crate::config::{ServiceConfig, TracerConfig};
use crate::error::BoxError;
use crate::handle::Tracer;
use crate::propagation::{self, Carrier};
use crate::sampler::select_sampler;
use opentelemetry::trace::{TraceContextExt, Tracer as _, TracerProvider as _};
use opentelemetry::{Context, InstrumentationScope};
use opentelemetry_otlp::{ExporterBuildError, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::error::OTelSdkError;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, Sampler, SdkTracerProvider,
};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the tracer backend.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TracerError {
    /// The provider kind is neither `stdout` nor `otlp`.
    #[error("invalid tracer provider: {0:?}")]
    InvalidProvider(String),

    /// `otlp` was selected without a host.
    #[error("tracer provider host is required")]
    ProviderHostRequired,

    /// `otlp` was selected without a port.
    #[error("tracer provider port is required")]
    ProviderPortRequired,

    /// The batch timeout is zero.
    #[error("tracer batch timeout must be greater than 0")]
    BatchTimeoutInvalid,

    /// An `otlp` exporter was requested outside a Tokio runtime.
    #[error("otlp span exporter requires a Tokio runtime")]
    RuntimeRequired,

    /// The span exporter could not be built.
    #[error("failed to create span exporter")]
    Exporter(#[source] ExporterBuildError),

    /// The provider failed to shut down.
    #[error("failed to shutdown tracer provider")]
    Shutdown(#[source] OTelSdkError),
}

impl From<TargetError> for TracerError {
    fn from(err: TargetError) -> Self {
        match err {
            TargetError::InvalidProvider(p) => Self::InvalidProvider(p),
            TargetError::HostRequired => Self::ProviderHostRequired,
            TargetError::PortRequired => Self::ProviderPortRequired,
        }
    }
}

/// Checks the fields the tracer needs before anything is built.
pub fn validate(config: &TracerConfig) -> Result<(), TracerError> {
    export_target(config).map(drop)
}

fn export_target(config: &TracerConfig) -> Result<ExportTarget, TracerError> {
    let target = ExportTarget::parse(&config.provider, &config.host, config.port)?;
    if config.batch_timeout.is_zero() {
        return Err(TracerError::BatchTimeoutInvalid);
    }
    Ok(target)
}

fn require_runtime() -> Result<(), TracerError> {
    tokio::runtime::Handle::try_current()
        .map(drop)
        .map_err(|_| TracerError::RuntimeRequired)
}

/// Tracer handle owning its own provider.
///
/// The provider is never registered globally, and the W3C propagator is held
/// per handle.
pub struct SdkTracer {
    provider: SdkTracerProvider,
    tracer: opentelemetry_sdk::trace::SdkTracer,
    propagator: TraceContextPropagator,
}

impl fmt::Debug for SdkTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkTracer").finish_non_exhaustive()
    }
}

impl SdkTracer {
    /// Builds a tracer for `service`.
    ///
    /// # Errors
    ///
    /// Returns a validation variant of [`TracerError`] for an unusable
    /// configuration, [`TracerError::RuntimeRequired`] for an `otlp` provider
    /// outside a Tokio runtime and [`TracerError::Exporter`] if the exporter
    /// fails to build.
    pub fn new(service: &ServiceConfig, config: &TracerConfig) -> Result<Self, TracerError> {
        let target = export_target(config)?;

        let batch_config = BatchConfigBuilder::default()
            .with_scheduled_delay(config.batch_timeout)
            .build();

        let processor = match target {
            ExportTarget::Stdout => {
                BatchSpanProcessor::builder(opentelemetry_stdout::SpanExporter::default())
                    .with_batch_config(batch_config)
                    .build()
            }
            ExportTarget::Otlp { host, port } => {
                require_runtime()?;
                let mut builder = opentelemetry_otlp::SpanExporter::builder()
                    .with_tonic()
                    .with_endpoint(otlp_endpoint(&host, port, config.insecure));
                if !config.insecure {
                    builder = builder.with_tls_config(tls_config(&host));
                }
                let exporter = builder.build().map_err(TracerError::Exporter)?;
                BatchSpanProcessor::builder(exporter)
                    .with_batch_config(batch_config)
                    .build()
            }
        };

        let provider = SdkTracerProvider::builder()
            .with_span_processor(processor)
            .with_sampler(Sampler::from(select_sampler(config.sample_ratio)))
            .with_resource(build_resource(service))
            .build();

        let scope = InstrumentationScope::builder(service.name.clone()).build();
        let tracer = provider.tracer_with_scope(scope);

        Ok(Self {
            provider,
            tracer,
            propagator: TraceContextPropagator::new(),
        })
    }
}

impl Tracer for SdkTracer {
    fn start_span(&self, parent: &Context, name: &str) -> Context {
        let span = self.tracer.start_with_context(name.to_string(), parent);
        parent.with_span(span)
    }

    fn inject_context(&self, cx: &Context) -> Carrier {
        propagation::inject_with(&self.propagator, cx)
    }

    fn extract_context(&self, base: &Context, carrier: &Carrier) -> Context {
        propagation::extract_with(&self.propagator, base, carrier)
    }

    fn shutdown(&self, timeout: Duration) -> Result<(), BoxError> {
        match self.provider.shutdown_with_timeout(timeout) {
            Ok(()) | Err(OTelSdkError::AlreadyShutdown) => Ok(()),
            Err(err) => Err(TracerError::Shutdown(err).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};

    fn service() -> ServiceConfig {
        ServiceConfig {
            name: "tracer-test".to_string(),
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn test_validate_defaults() {
        assert!(validate(&TracerConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let bogus = TracerConfig {
            provider: "bogus".to_string(),
            ..TracerConfig::default()
        };
        assert!(matches!(
            validate(&bogus),
            Err(TracerError::InvalidProvider(p)) if p == "bogus"
        ));

        let no_host = TracerConfig {
            provider: "otlp".to_string(),
            port: 4317,
            ..TracerConfig::default()
        };
        assert!(matches!(
            validate(&no_host),
            Err(TracerError::ProviderHostRequired)
        ));

        let no_port = TracerConfig {
            provider: "otlp".to_string(),
            host: "collector".to_string(),
            ..TracerConfig::default()
        };
        assert!(matches!(
            validate(&no_port),
            Err(TracerError::ProviderPortRequired)
        ));

        let zero_timeout = TracerConfig {
            batch_timeout: Duration::ZERO,
            ..TracerConfig::default()
        };
        assert!(matches!(
            validate(&zero_timeout),
            Err(TracerError::BatchTimeoutInvalid)
        ));
    }

    #[test]
    fn test_stdout_tracer_records_sampled_spans() {
        let tracer = SdkTracer::new(&service(), &TracerConfig::default()).unwrap();

        let cx = tracer.start_span(&Context::new(), "operation");
        let span_context = tracer.span_context(&cx);
        tracer.end_span(&cx);

        assert!(span_context.is_valid());
        assert!(span_context.is_sampled());
        tracer.shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_zero_ratio_never_samples() {
        let config = TracerConfig {
            sample_ratio: 0.0,
            ..TracerConfig::default()
        };
        let tracer = SdkTracer::new(&service(), &config).unwrap();

        let cx = tracer.start_span(&Context::new(), "operation");

        assert!(!tracer.span_context(&cx).is_sampled());
        tracer.shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_child_span_shares_trace_of_parent() {
        let tracer = SdkTracer::new(&service(), &TracerConfig::default()).unwrap();
        let parent = SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );

        let unrelated = tracer.start_span(&Context::new(), "unrelated");
        let child = tracer.start_child_span(&unrelated, "child", &parent);

        let child_context = tracer.span_context(&child);
        assert_eq!(child_context.trace_id(), parent.trace_id());
        assert_ne!(child_context.span_id(), parent.span_id());
        assert_ne!(
            child_context.trace_id(),
            tracer.span_context(&unrelated).trace_id()
        );
        tracer.shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_inject_extract_round_trip() {
        let tracer = SdkTracer::new(&service(), &TracerConfig::default()).unwrap();
        let cx = tracer.start_span(&Context::new(), "outbound");

        let carrier = tracer.inject_context(&cx);
        let extracted = tracer.extract_context(&Context::new(), &carrier);

        assert!(carrier.keys().all(|k| k == k.to_lowercase()));
        assert_eq!(
            tracer.span_context(&extracted).trace_id(),
            tracer.span_context(&cx).trace_id()
        );
        tracer.shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let tracer = SdkTracer::new(&service(), &TracerConfig::default()).unwrap();

        tracer.shutdown(Duration::from_secs(5)).unwrap();
        tracer.shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_new_validates_before_building() {
        let config = TracerConfig {
            provider: "otlp".to_string(),
            host: String::new(),
            port: 4317,
            ..TracerConfig::default()
        };

        assert!(matches!(
            SdkTracer::new(&service(), &config),
            Err(TracerError::ProviderHostRequired)
        ));
    }

    #[test]
    fn test_otlp_outside_runtime_is_an_error() {
        let config = TracerConfig {
            provider: "otlp".to_string(),
            host: "localhost".to_string(),
            port: 4317,
            ..TracerConfig::default()
        };

        assert!(matches!(
            SdkTracer::new(&service(), &config),
            Err(TracerError::RuntimeRequired)
        ));
    }
}
