//! Fluent builder combining layered loading with mutators.

use crate::backend::{Backends, OtelBackends};
use crate::config::{self, ConfigMutator, MonitoringConfig};
use crate::error::Result;
use crate::monitoring::Monitoring;
use figment::Figment;
use figment::providers::{Format, Serialized, Toml};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Builder for [`Monitoring`].
///
/// Sources are merged in the order their methods are called, on top of the
/// compiled-in defaults. Mutators added with [`mutate`](Self::mutate) or the
/// setter shorthands are applied last and therefore always win.
///
/// # Example
///
/// ```no_run
/// use opentelemetry_monitoring::{MonitoringBuilder, MonitoringError};
///
/// fn main() -> Result<(), MonitoringError> {
///     let monitoring = MonitoringBuilder::new()
///         .with_file("/etc/monitoring.toml")
///         .with_standard_env()
///         .with_env()
///         .service_name("checkout")
///         .tracer_sample_ratio(0.1)
///         .build()?;
///     # let _ = monitoring;
///     Ok(())
/// }
/// ```
#[must_use = "builders do nothing unless .build() is called"]
#[derive(Debug, Clone)]
pub struct MonitoringBuilder {
    figment: Figment,
    mutators: Vec<ConfigMutator>,
}

impl MonitoringBuilder {
    /// Starts from the compiled-in defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::from(Serialized::defaults(MonitoringConfig::default())),
            mutators: Vec::new(),
        }
    }

    /// Merges a TOML file. A missing file is skipped.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            self.figment = self.figment.merge(Toml::file(path));
        }
        self
    }

    /// Merges `OTEL_SERVICE_NAME` and `OTEL_TRACES_SAMPLER_ARG`.
    pub fn with_standard_env(mut self) -> Self {
        self.figment = self.figment.merge(config::standard_otel_env());
        self
    }

    /// Merges `MONITORING_*` variables, nested keys split on `__`.
    pub fn with_env(mut self) -> Self {
        self.figment = self.figment.merge(config::prefixed_env());
        self
    }

    /// Merges an arbitrary figment provider.
    pub fn with_provider<T: figment::Provider>(mut self, provider: T) -> Self {
        self.figment = self.figment.merge(provider);
        self
    }

    /// Queues a mutator, applied after every loaded source.
    pub fn mutate(mut self, mutator: ConfigMutator) -> Self {
        self.mutators.push(mutator);
        self
    }

    /// Sets the service name.
    pub fn service_name(self, name: impl Into<String>) -> Self {
        self.mutate(config::with_service_name(name))
    }

    /// Sets the deployment environment.
    pub fn environment(self, env: impl Into<String>) -> Self {
        self.mutate(config::with_environment(env))
    }

    /// Sets the instance name and host.
    pub fn instance(self, name: impl Into<String>, host: impl Into<String>) -> Self {
        self.mutate(config::with_instance(name, host))
    }

    /// Sets the minimum log level.
    pub fn logger_level(self, level: impl Into<String>) -> Self {
        self.mutate(config::with_logger_level(level))
    }

    /// Sets the log output path.
    pub fn logger_output_path(self, path: impl Into<PathBuf>) -> Self {
        self.mutate(config::with_logger_output_path(path))
    }

    /// Sets the tracer provider kind and collector address.
    pub fn tracer_provider(
        self,
        provider: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        self.mutate(config::with_tracer_provider(provider, host, port))
    }

    /// Sets the fraction of traces to record.
    pub fn tracer_sample_ratio(self, ratio: f64) -> Self {
        self.mutate(config::with_tracer_sample_ratio(ratio))
    }

    /// Sets the span batch timeout.
    pub fn tracer_batch_timeout(self, timeout: Duration) -> Self {
        self.mutate(config::with_tracer_batch_timeout(timeout))
    }

    /// Disables or enables TLS towards the trace collector.
    pub fn tracer_insecure(self, insecure: bool) -> Self {
        self.mutate(config::with_tracer_insecure(insecure))
    }

    /// Sets the metric provider kind and collector address.
    pub fn metric_provider(
        self,
        provider: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        self.mutate(config::with_metric_provider(provider, host, port))
    }

    /// Sets the metric export interval.
    pub fn metric_interval(self, interval: Duration) -> Self {
        self.mutate(config::with_metric_interval(interval))
    }

    /// Disables or enables TLS towards the metric collector.
    pub fn metric_insecure(self, insecure: bool) -> Self {
        self.mutate(config::with_metric_insecure(insecure))
    }

    /// Resolves the configuration snapshot without building anything.
    ///
    /// # Errors
    ///
    /// Returns [`MonitoringError::Config`](crate::MonitoringError::Config) if
    /// a source fails to parse.
    pub fn config(&self) -> Result<MonitoringConfig> {
        let loaded: MonitoringConfig = self.figment.extract()?;
        Ok(loaded.with_mutators(self.mutators.iter().cloned()))
    }

    /// Resolves the configuration and builds all three components.
    ///
    /// # Errors
    ///
    /// Returns a configuration error, or any error from
    /// [`Monitoring::with_backends`].
    pub fn build(self) -> Result<Monitoring> {
        self.build_with(&OtelBackends)
    }

    /// Like [`build`](Self::build), with custom backends.
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build).
    pub fn build_with(self, backends: &dyn Backends) -> Result<Monitoring> {
        let config = self.config()?;
        Monitoring::with_backends(&config, backends)
    }
}

impl Default for MonitoringBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, MonitoringError};
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builder_defaults() {
        let config = MonitoringBuilder::new().config().unwrap();
        assert_eq!(config, MonitoringConfig::default());
    }

    #[test]
    fn test_setters_apply_in_order() {
        let config = MonitoringBuilder::new()
            .service_name("first")
            .environment("staging")
            .instance("instance-1", "10.0.0.1")
            .logger_level("debug")
            .tracer_provider("otlp", "collector", 4317)
            .tracer_insecure(true)
            .metric_provider("otlp", "collector", 4317)
            .metric_interval(Duration::from_secs(10))
            .service_name("second")
            .config()
            .unwrap();

        assert_eq!(config.service.name, "second");
        assert_eq!(config.service.environment, "staging");
        assert_eq!(config.service.instance_host, "10.0.0.1");
        assert_eq!(config.logger.level, "debug");
        assert_eq!(config.tracer.provider, "otlp");
        assert!(config.tracer.insecure);
        assert_eq!(config.metric.port, 4317);
        assert_eq!(config.metric.interval, Duration::from_secs(10));
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let config = MonitoringBuilder::new()
            .with_file("/nonexistent/monitoring.toml")
            .config()
            .unwrap();
        assert_eq!(config, MonitoringConfig::default());
    }

    #[test]
    fn test_mutators_beat_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[service]\nname = \"from-file\"\nenvironment = \"staging\"\n")
            .unwrap();

        let config = MonitoringBuilder::new()
            .with_file(file.path())
            .service_name("from-code")
            .config()
            .unwrap();

        assert_eq!(config.service.name, "from-code");
        assert_eq!(config.service.environment, "staging");
    }

    #[test]
    #[serial]
    fn test_env_layers_follow_call_order() {
        temp_env::with_vars(
            [
                ("OTEL_SERVICE_NAME", Some("from-otel")),
                ("MONITORING_SERVICE__NAME", Some("from-prefixed")),
                ("MONITORING_LOGGER__LEVEL", Some("warn")),
            ],
            || {
                let config = MonitoringBuilder::new()
                    .with_env()
                    .with_standard_env()
                    .config()
                    .unwrap();

                assert_eq!(config.service.name, "from-otel");
                assert_eq!(config.logger.level, "warn");
            },
        );
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[tracer]\nsample_ratio = \"lots\"\n").unwrap();

        let err = MonitoringBuilder::new()
            .with_file(file.path())
            .config()
            .unwrap_err();

        assert!(matches!(err, MonitoringError::Config(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidField);
    }

    #[test]
    fn test_build_requires_service_name() {
        let err = MonitoringBuilder::new().build().unwrap_err();
        assert!(matches!(err, MonitoringError::ServiceNameRequired));
    }

    #[test]
    fn test_build_with_service_name() {
        let monitoring = MonitoringBuilder::new()
            .service_name("svc-a")
            .build()
            .unwrap();
        monitoring.shutdown(Duration::from_secs(5)).unwrap();
    }
}
