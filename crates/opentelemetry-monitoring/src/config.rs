//! Configuration snapshot, mutators and layered loading.
//!
//! A [`MonitoringConfig`] is resolved once per orchestration call. Resolution
//! starts from [`MonitoringConfig::default`] (or from a snapshot loaded with
//! figment) and applies an ordered list of [`ConfigMutator`]s left to right;
//! a later mutator touching the same field wins.
//!
//! Layered loading follows the usual priority, later sources overriding
//! earlier ones:
//! 1. Default values (compiled in)
//! 2. An optional TOML file
//! 3. Standard OpenTelemetry environment variables (`OTEL_*`)
//! 4. Prefixed environment variables (`MONITORING_*`, nested keys split on `__`)
//!
//! | Variable | Config Path |
//! |----------|-------------|
//! | `OTEL_SERVICE_NAME` | `service.name` |
//! | `OTEL_TRACES_SAMPLER_ARG` | `tracer.sample_ratio` |
//! | `MONITORING_TRACER__PROVIDER` | `tracer.provider` |
//! | `MONITORING_METRIC__INTERVAL` | `metric.interval` (milliseconds) |

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "MONITORING_";

const DEFAULT_ENVIRONMENT: &str = "development";
const DEFAULT_LOGGER_LEVEL: &str = "info";
const DEFAULT_PROVIDER: &str = "stdout";
const DEFAULT_SAMPLE_RATIO: f64 = 1.0;
const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_METRIC_INTERVAL: Duration = Duration::from_secs(60);

/// Immutable configuration for the three components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Service identity shared by traces and metrics.
    pub service: ServiceConfig,
    /// Logger settings.
    pub logger: LoggerConfig,
    /// Tracer settings.
    pub tracer: TracerConfig,
    /// Metric settings.
    pub metric: MetricConfig,
}

/// Identity of the running service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service name. Required for orchestration.
    pub name: String,
    /// Deployment environment, e.g. `production`.
    pub environment: String,
    /// Unique identifier of this instance.
    pub instance_name: String,
    /// Host the instance runs on.
    pub instance_host: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            instance_name: String::new(),
            instance_host: String::new(),
        }
    }
}

/// Logger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Minimum level: debug, info, warn, error or fatal.
    pub level: String,
    /// Output destination. `None` writes to stdout.
    pub output_path: Option<PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOGGER_LEVEL.to_string(),
            output_path: None,
        }
    }
}

/// Tracer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Exporter kind: `stdout` or `otlp`.
    pub provider: String,
    /// Collector host for remote providers.
    pub host: String,
    /// Collector port for remote providers.
    pub port: u16,
    /// Fraction of traces to record.
    pub sample_ratio: f64,
    /// Maximum delay before a batch of spans is exported, in milliseconds.
    #[serde(with = "duration_ms")]
    pub batch_timeout: Duration,
    /// Disable TLS towards the collector.
    pub insecure: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            host: String::new(),
            port: 0,
            sample_ratio: DEFAULT_SAMPLE_RATIO,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            insecure: false,
        }
    }
}

/// Metric settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    /// Exporter kind: `stdout` or `otlp`.
    pub provider: String,
    /// Collector host for remote providers.
    pub host: String,
    /// Collector port for remote providers.
    pub port: u16,
    /// Time between exports, in milliseconds.
    #[serde(with = "duration_ms")]
    pub interval: Duration,
    /// Disable TLS towards the collector.
    pub insecure: bool,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            host: String::new(),
            port: 0,
            interval: DEFAULT_METRIC_INTERVAL,
            insecure: false,
        }
    }
}

impl MonitoringConfig {
    /// Returns a new snapshot with `mutators` applied in order.
    ///
    /// `self` is consumed as the working copy; callers holding a clone of the
    /// original snapshot never observe the changes.
    pub fn with_mutators<I>(self, mutators: I) -> Self
    where
        I: IntoIterator<Item = ConfigMutator>,
    {
        mutators
            .into_iter()
            .fold(self, |config, mutator| mutator.apply(config))
    }

    /// Loads configuration from defaults, `config_path` (if it exists) and
    /// the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if any layer fails to parse.
    #[allow(clippy::result_large_err)]
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(MonitoringConfig::default()));

        if config_path.as_ref().exists() {
            figment = figment.merge(Toml::file(config_path));
        }

        figment
            .merge(standard_otel_env())
            .merge(prefixed_env())
            .extract()
    }
}

/// Resolves a snapshot from the compiled-in defaults and `mutators`.
///
/// # Examples
///
/// ```
/// use opentelemetry_monitoring::config::{resolve, with_service_name, with_tracer_sample_ratio};
///
/// let config = resolve([
///     with_service_name("checkout"),
///     with_tracer_sample_ratio(0.5),
///     with_tracer_sample_ratio(0.1),
/// ]);
///
/// assert_eq!(config.service.name, "checkout");
/// assert_eq!(config.service.environment, "development");
/// assert_eq!(config.tracer.sample_ratio, 0.1);
/// ```
pub fn resolve<I>(mutators: I) -> MonitoringConfig
where
    I: IntoIterator<Item = ConfigMutator>,
{
    MonitoringConfig::default().with_mutators(mutators)
}

/// A single named change to a [`MonitoringConfig`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigMutator {
    /// Sets `service.name`.
    ServiceName(String),
    /// Sets `service.environment`.
    Environment(String),
    /// Sets `service.instance_name` and `service.instance_host`.
    Instance {
        /// Instance identifier.
        name: String,
        /// Instance host.
        host: String,
    },
    /// Sets `logger.level`.
    LoggerLevel(String),
    /// Sets `logger.output_path`.
    LoggerOutputPath(PathBuf),
    /// Sets the tracer provider kind and collector address.
    TracerProvider {
        /// Provider kind.
        provider: String,
        /// Collector host.
        host: String,
        /// Collector port.
        port: u16,
    },
    /// Sets `tracer.sample_ratio`.
    TracerSampleRatio(f64),
    /// Sets `tracer.batch_timeout`.
    TracerBatchTimeout(Duration),
    /// Sets `tracer.insecure`.
    TracerInsecure(bool),
    /// Sets the metric provider kind and collector address.
    MetricProvider {
        /// Provider kind.
        provider: String,
        /// Collector host.
        host: String,
        /// Collector port.
        port: u16,
    },
    /// Sets `metric.interval`.
    MetricInterval(Duration),
    /// Sets `metric.insecure`.
    MetricInsecure(bool),
}

impl ConfigMutator {
    /// Applies this change to `config` and returns the result.
    pub fn apply(&self, mut config: MonitoringConfig) -> MonitoringConfig {
        match self {
            Self::ServiceName(name) => config.service.name = name.clone(),
            Self::Environment(env) => config.service.environment = env.clone(),
            Self::Instance { name, host } => {
                config.service.instance_name = name.clone();
                config.service.instance_host = host.clone();
            }
            Self::LoggerLevel(level) => config.logger.level = level.clone(),
            Self::LoggerOutputPath(path) => {
                config.logger.output_path =
                    (!path.as_os_str().is_empty()).then(|| path.clone());
            }
            Self::TracerProvider {
                provider,
                host,
                port,
            } => {
                config.tracer.provider = provider.clone();
                config.tracer.host = host.clone();
                config.tracer.port = *port;
            }
            Self::TracerSampleRatio(ratio) => config.tracer.sample_ratio = *ratio,
            Self::TracerBatchTimeout(timeout) => config.tracer.batch_timeout = *timeout,
            Self::TracerInsecure(insecure) => config.tracer.insecure = *insecure,
            Self::MetricProvider {
                provider,
                host,
                port,
            } => {
                config.metric.provider = provider.clone();
                config.metric.host = host.clone();
                config.metric.port = *port;
            }
            Self::MetricInterval(interval) => config.metric.interval = *interval,
            Self::MetricInsecure(insecure) => config.metric.insecure = *insecure,
        }
        config
    }
}

/// Sets the service name.
pub fn with_service_name(name: impl Into<String>) -> ConfigMutator {
    ConfigMutator::ServiceName(name.into())
}

/// Sets the deployment environment.
pub fn with_environment(env: impl Into<String>) -> ConfigMutator {
    ConfigMutator::Environment(env.into())
}

/// Sets the instance name and host.
pub fn with_instance(name: impl Into<String>, host: impl Into<String>) -> ConfigMutator {
    ConfigMutator::Instance {
        name: name.into(),
        host: host.into(),
    }
}

/// Sets the minimum log level.
pub fn with_logger_level(level: impl Into<String>) -> ConfigMutator {
    ConfigMutator::LoggerLevel(level.into())
}

/// Sets the log output path. An empty path means stdout.
pub fn with_logger_output_path(path: impl Into<PathBuf>) -> ConfigMutator {
    ConfigMutator::LoggerOutputPath(path.into())
}

/// Sets the tracer provider kind and collector address.
pub fn with_tracer_provider(
    provider: impl Into<String>,
    host: impl Into<String>,
    port: u16,
) -> ConfigMutator {
    ConfigMutator::TracerProvider {
        provider: provider.into(),
        host: host.into(),
        port,
    }
}

/// Sets the fraction of traces to record.
pub fn with_tracer_sample_ratio(ratio: f64) -> ConfigMutator {
    ConfigMutator::TracerSampleRatio(ratio)
}

/// Sets the maximum delay before a batch of spans is exported.
pub fn with_tracer_batch_timeout(timeout: Duration) -> ConfigMutator {
    ConfigMutator::TracerBatchTimeout(timeout)
}

/// Disables or enables TLS towards the trace collector.
pub fn with_tracer_insecure(insecure: bool) -> ConfigMutator {
    ConfigMutator::TracerInsecure(insecure)
}

/// Sets the metric provider kind and collector address.
pub fn with_metric_provider(
    provider: impl Into<String>,
    host: impl Into<String>,
    port: u16,
) -> ConfigMutator {
    ConfigMutator::MetricProvider {
        provider: provider.into(),
        host: host.into(),
        port,
    }
}

/// Sets the time between metric exports.
pub fn with_metric_interval(interval: Duration) -> ConfigMutator {
    ConfigMutator::MetricInterval(interval)
}

/// Disables or enables TLS towards the metric collector.
pub fn with_metric_insecure(insecure: bool) -> ConfigMutator {
    ConfigMutator::MetricInsecure(insecure)
}

/// Partial service config for standard OTEL env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialServiceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

/// Partial tracer config for standard OTEL env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialTracerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_ratio: Option<f64>,
}

#[derive(Debug, Default, Serialize)]
struct PartialConfig {
    #[serde(skip_serializing_if = "is_partial_service_empty")]
    service: PartialServiceConfig,
    #[serde(skip_serializing_if = "is_partial_tracer_empty")]
    tracer: PartialTracerConfig,
}

fn is_partial_service_empty(config: &PartialServiceConfig) -> bool {
    config.name.is_none()
}

fn is_partial_tracer_empty(config: &PartialTracerConfig) -> bool {
    config.sample_ratio.is_none()
}

pub(crate) fn standard_otel_env() -> impl figment::Provider {
    let mut config = PartialConfig::default();

    if let Ok(name) = std::env::var("OTEL_SERVICE_NAME")
        && !name.trim().is_empty()
    {
        config.service.name = Some(name.trim().to_string());
    }

    if let Ok(arg) = std::env::var("OTEL_TRACES_SAMPLER_ARG") {
        config.tracer.sample_ratio = arg.trim().parse().ok();
    }

    Serialized::defaults(config)
}

pub(crate) fn prefixed_env() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
