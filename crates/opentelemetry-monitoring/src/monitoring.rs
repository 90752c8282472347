//! Component initializers and the lifecycle orchestrator.
//!
//! Initialization runs logger, then tracer, then metric. If a step fails,
//! whatever was already built is torn down in reverse order before the
//! error is returned, so callers either get all three handles or none.
//!
//! Lifecycle progress and discarded cleanup errors are reported via
//! `tracing` with target `monitoring_lifecycle`. To see them, enable the
//! target in your filter: `RUST_LOG=monitoring_lifecycle=debug`.

use crate::backend::logger::LogLevel;
use crate::backend::{Backends, OtelBackends, metric, tracer};
use crate::config::{
    ConfigMutator, LoggerConfig, MetricConfig, MonitoringConfig, ServiceConfig, TracerConfig,
    resolve,
};
use crate::error::{MonitoringError, Result, map_error};
use crate::handle::{Logger, Metric, Tracer};
use std::fmt;
use std::time::Duration;

const LIFECYCLE_TARGET: &str = "monitoring_lifecycle";

/// Deadline for shutting down the tracer while rolling back a failed
/// initialization.
pub const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(5);

const LOGGER_CONTEXT: &str = "failed to initialize logger";
const TRACER_CONTEXT: &str = "failed to initialize tracer";
const METRIC_CONTEXT: &str = "failed to initialize metric";

/// Validates `config` and builds a logger through `backends`.
///
/// # Errors
///
/// Validation and backend errors are translated with [`map_error`].
pub fn init_logger(config: &LoggerConfig, backends: &dyn Backends) -> Result<Box<dyn Logger>> {
    config
        .level
        .parse::<LogLevel>()
        .map_err(|e| map_error(Some(e.into()), LOGGER_CONTEXT))?;
    backends
        .logger(config)
        .map_err(|e| map_error(Some(e), LOGGER_CONTEXT))
}

/// Validates `config` and builds a tracer through `backends`.
///
/// # Errors
///
/// Validation and backend errors are translated with [`map_error`].
pub fn init_tracer(
    service: &ServiceConfig,
    config: &TracerConfig,
    backends: &dyn Backends,
) -> Result<Box<dyn Tracer>> {
    tracer::validate(config).map_err(|e| map_error(Some(e.into()), TRACER_CONTEXT))?;
    backends
        .tracer(service, config)
        .map_err(|e| map_error(Some(e), TRACER_CONTEXT))
}

/// Validates `config` and builds a metric handle through `backends`.
///
/// # Errors
///
/// Validation and backend errors are translated with [`map_error`].
pub fn init_metric(
    service: &ServiceConfig,
    config: &MetricConfig,
    backends: &dyn Backends,
) -> Result<Box<dyn Metric>> {
    metric::validate(config).map_err(|e| map_error(Some(e.into()), METRIC_CONTEXT))?;
    backends
        .metric(service, config)
        .map_err(|e| map_error(Some(e), METRIC_CONTEXT))
}

/// Aggregate handle owning a logger, a tracer and a metric handle.
///
/// # Example
///
/// ```no_run
/// use opentelemetry_monitoring::config::{with_service_name, with_tracer_sample_ratio};
/// use opentelemetry_monitoring::{Fields, Monitoring, MonitoringError};
/// use std::time::Duration;
///
/// fn main() -> Result<(), MonitoringError> {
///     let monitoring = Monitoring::new([
///         with_service_name("checkout"),
///         with_tracer_sample_ratio(0.1),
///     ])?;
///
///     monitoring.logger().info("service started", &Fields::new());
///
///     monitoring.shutdown(Duration::from_secs(5))
/// }
/// ```
pub struct Monitoring {
    logger: Box<dyn Logger>,
    tracer: Box<dyn Tracer>,
    metric: Box<dyn Metric>,
}

impl fmt::Debug for Monitoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitoring").finish_non_exhaustive()
    }
}

impl Monitoring {
    /// Resolves `mutators` over the defaults and builds all three components
    /// with the default backends.
    ///
    /// # Errors
    ///
    /// See [`Monitoring::with_backends`].
    pub fn new<I>(mutators: I) -> Result<Self>
    where
        I: IntoIterator<Item = ConfigMutator>,
    {
        Self::from_config(&resolve(mutators))
    }

    /// Builds all three components from an already resolved snapshot with
    /// the default backends.
    ///
    /// # Errors
    ///
    /// See [`Monitoring::with_backends`].
    pub fn from_config(config: &MonitoringConfig) -> Result<Self> {
        Self::with_backends(config, &OtelBackends)
    }

    /// Builds all three components through `backends`.
    ///
    /// # Errors
    ///
    /// - [`MonitoringError::ServiceNameRequired`] if the service name is
    ///   empty; no backend is called.
    /// - The mapped error of the first component that fails. Components
    ///   built before it are flushed or shut down first; errors from that
    ///   cleanup are discarded.
    pub fn with_backends(config: &MonitoringConfig, backends: &dyn Backends) -> Result<Self> {
        require_service_name(&config.service)?;

        let logger = init_logger(&config.logger, backends)?;

        let tracer = match init_tracer(&config.service, &config.tracer, backends) {
            Ok(tracer) => tracer,
            Err(err) => {
                flush_logger_for_rollback(logger.as_ref());
                return Err(err);
            }
        };

        let metric = match init_metric(&config.service, &config.metric, backends) {
            Ok(metric) => metric,
            Err(err) => {
                if let Err(e) = tracer.shutdown(ROLLBACK_TIMEOUT) {
                    tracing::warn!(
                        target: LIFECYCLE_TARGET,
                        error = %e,
                        "Failed to shutdown tracer during rollback"
                    );
                }
                flush_logger_for_rollback(logger.as_ref());
                return Err(err);
            }
        };

        tracing::debug!(
            target: LIFECYCLE_TARGET,
            service = %config.service.name,
            environment = %config.service.environment,
            "Monitoring initialised"
        );

        Ok(Self {
            logger,
            tracer,
            metric,
        })
    }

    /// Returns the logger.
    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    /// Returns the tracer.
    pub fn tracer(&self) -> &dyn Tracer {
        self.tracer.as_ref()
    }

    /// Returns the metric handle.
    pub fn metric(&self) -> &dyn Metric {
        self.metric.as_ref()
    }

    /// Splits the aggregate into its three handles.
    pub fn into_parts(self) -> (Box<dyn Logger>, Box<dyn Tracer>, Box<dyn Metric>) {
        (self.logger, self.tracer, self.metric)
    }

    /// Writes out buffered log lines.
    ///
    /// # Errors
    ///
    /// Returns [`MonitoringError::Component`] wrapping the logger error.
    pub fn flush(&self) -> Result<()> {
        self.logger
            .flush()
            .map_err(|source| MonitoringError::Component {
                context: "failed to flush logger",
                source,
            })
    }

    /// Shuts down the tracer, then the metric handle.
    ///
    /// Stops at the first failure: if the tracer fails to shut down, the
    /// metric handle is left running and the tracer error is returned.
    /// Calling this again after success is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`MonitoringError::Shutdown`] naming the failed component,
    /// with the backend error (e.g. the SDK's timeout) as its source.
    pub fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.tracer
            .shutdown(timeout)
            .map_err(|source| MonitoringError::Shutdown {
                component: "tracer",
                source,
            })?;

        self.metric
            .shutdown(timeout)
            .map_err(|source| MonitoringError::Shutdown {
                component: "metric",
                source,
            })?;

        tracing::debug!(target: LIFECYCLE_TARGET, "Monitoring shut down");
        Ok(())
    }
}

fn flush_logger_for_rollback(logger: &dyn Logger) {
    if let Err(e) = logger.flush() {
        tracing::warn!(
            target: LIFECYCLE_TARGET,
            error = %e,
            "Failed to flush logger during rollback"
        );
    }
}

/// Resolves `mutators` and builds a standalone logger.
///
/// # Errors
///
/// Returns the mapped logger error.
pub fn new_logger<I>(mutators: I) -> Result<Box<dyn Logger>>
where
    I: IntoIterator<Item = ConfigMutator>,
{
    let config = resolve(mutators);
    init_logger(&config.logger, &OtelBackends)
}

/// Resolves `mutators` and builds a standalone tracer.
///
/// # Errors
///
/// Returns [`MonitoringError::ServiceNameRequired`] without a service name,
/// otherwise the mapped tracer error.
pub fn new_tracer<I>(mutators: I) -> Result<Box<dyn Tracer>>
where
    I: IntoIterator<Item = ConfigMutator>,
{
    let config = resolve(mutators);
    require_service_name(&config.service)?;
    init_tracer(&config.service, &config.tracer, &OtelBackends)
}

/// Resolves `mutators` and builds a standalone metric handle.
///
/// # Errors
///
/// Returns [`MonitoringError::ServiceNameRequired`] without a service name,
/// otherwise the mapped metric error.
pub fn new_metric<I>(mutators: I) -> Result<Box<dyn Metric>>
where
    I: IntoIterator<Item = ConfigMutator>,
{
    let config = resolve(mutators);
    require_service_name(&config.service)?;
    init_metric(&config.service, &config.metric, &OtelBackends)
}

fn require_service_name(service: &ServiceConfig) -> Result<()> {
    if service.name.is_empty() {
        return Err(MonitoringError::ServiceNameRequired);
    }
    Ok(())
}
