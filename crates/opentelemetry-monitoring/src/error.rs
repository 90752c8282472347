//! Public error taxonomy and the backend-to-public error mapper.

use crate::backend::logger::LoggerError;
use crate::backend::metric::MetricError;
use crate::backend::tracer::TracerError;
use std::error::Error as StdError;
use thiserror::Error;

/// Boxed error as produced by the backends behind the capability traits.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A specialised Result type for monitoring operations.
pub type Result<T> = std::result::Result<T, MonitoringError>;

/// Errors returned by the monitoring façade.
///
/// Every unit variant is a sentinel: callers compare against it with
/// `matches!` and never need to inspect the message. Errors that are not part
/// of the sentinel table are carried by [`MonitoringError::Component`] with
/// their original source intact.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MonitoringError {
    /// The service name was not configured.
    #[error("service name is required")]
    ServiceNameRequired,

    /// The logger level is not one of debug, info, warn, error, fatal.
    #[error("invalid logger level")]
    LoggerInvalidLevel,

    /// The tracer provider kind is not supported.
    #[error("invalid tracer provider")]
    TracerInvalidProvider,

    /// A remote tracer provider was configured without a host.
    #[error("tracer provider host is required")]
    TracerProviderHostRequired,

    /// A remote tracer provider was configured without a port.
    #[error("tracer provider port is required")]
    TracerProviderPortRequired,

    /// The tracer batch timeout is zero.
    #[error("tracer batch timeout must be greater than 0")]
    TracerBatchTimeoutInvalid,

    /// The metric provider kind is not supported.
    #[error("invalid metric provider")]
    MetricInvalidProvider,

    /// A remote metric provider was configured without a host.
    #[error("metric provider host is required")]
    MetricProviderHostRequired,

    /// A remote metric provider was configured without a port.
    #[error("metric provider port is required")]
    MetricProviderPortRequired,

    /// The metric export interval is zero.
    #[error("metric export interval must be greater than 0")]
    MetricIntervalInvalid,

    /// Layered configuration could not be loaded.
    #[error("failed to load configuration")]
    Config(#[source] Box<figment::Error>),

    /// An unrecognised backend error, wrapped with the step that produced it.
    #[error("{context}: {source}")]
    Component {
        /// What the façade was doing when the error occurred.
        context: &'static str,
        /// The backend error.
        source: BoxError,
    },

    /// The mapper was handed no error at all.
    #[error("{context}: unknown error")]
    Unknown {
        /// What the façade was doing when the mapper was invoked.
        context: &'static str,
    },

    /// A component failed to shut down.
    #[error("failed to shutdown {component}: {source}")]
    Shutdown {
        /// The component being shut down.
        component: &'static str,
        /// The backend error.
        source: BoxError,
    },
}

/// Coarse classification of [`MonitoringError`] values.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The service identity is absent.
    ConfigurationMissing,
    /// A subsystem was configured with an unsupported provider kind.
    InvalidProvider,
    /// A field is missing or outside its contract for the chosen provider,
    /// or configuration failed to load.
    InvalidField,
    /// A backend failed while building its resources.
    BackendConstruction,
    /// A component failed while tearing down.
    Shutdown,
}

impl MonitoringError {
    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ServiceNameRequired => ErrorKind::ConfigurationMissing,
            Self::TracerInvalidProvider | Self::MetricInvalidProvider => {
                ErrorKind::InvalidProvider
            }
            Self::LoggerInvalidLevel
            | Self::TracerProviderHostRequired
            | Self::TracerProviderPortRequired
            | Self::TracerBatchTimeoutInvalid
            | Self::MetricProviderHostRequired
            | Self::MetricProviderPortRequired
            | Self::MetricIntervalInvalid
            | Self::Config(_) => ErrorKind::InvalidField,
            Self::Component { .. } | Self::Unknown { .. } => ErrorKind::BackendConstruction,
            Self::Shutdown { .. } => ErrorKind::Shutdown,
        }
    }

    /// Searches the source chain for an error of type `E`.
    ///
    /// This is how callers reach an unrecognised backend error through the
    /// context wrapper, e.g. an SDK timeout behind a failed shutdown.
    pub fn find_source<E: StdError + 'static>(&self) -> Option<&E> {
        let mut current = self.source();
        while let Some(err) = current {
            if let Some(found) = err.downcast_ref::<E>() {
                return Some(found);
            }
            current = err.source();
        }
        None
    }
}

impl From<figment::Error> for MonitoringError {
    fn from(err: figment::Error) -> Self {
        MonitoringError::Config(Box::new(err))
    }
}

/// Translates a backend error into the public taxonomy.
///
/// Known backend sentinels anywhere in the source chain are replaced by their
/// public counterpart, returned bare so that callers can match on it
/// directly. Anything else is wrapped with `context` and stays reachable via
/// [`std::error::Error::source`].
pub fn map_error(err: Option<BoxError>, context: &'static str) -> MonitoringError {
    let Some(err) = err else {
        return MonitoringError::Unknown { context };
    };

    let root: &(dyn StdError + 'static) = &*err;
    let mut current = Some(root);
    while let Some(candidate) = current {
        if let Some(public) = sentinel_for(candidate) {
            return public;
        }
        current = candidate.source();
    }

    MonitoringError::Component {
        context,
        source: err,
    }
}

fn sentinel_for(err: &(dyn StdError + 'static)) -> Option<MonitoringError> {
    if let Some(err) = err.downcast_ref::<LoggerError>() {
        return match err {
            LoggerError::InvalidLevel(_) => Some(MonitoringError::LoggerInvalidLevel),
            _ => None,
        };
    }

    if let Some(err) = err.downcast_ref::<TracerError>() {
        return match err {
            TracerError::InvalidProvider(_) => Some(MonitoringError::TracerInvalidProvider),
            TracerError::ProviderHostRequired => Some(MonitoringError::TracerProviderHostRequired),
            TracerError::ProviderPortRequired => Some(MonitoringError::TracerProviderPortRequired),
            TracerError::BatchTimeoutInvalid => Some(MonitoringError::TracerBatchTimeoutInvalid),
            _ => None,
        };
    }

    if let Some(err) = err.downcast_ref::<MetricError>() {
        return match err {
            MetricError::InvalidProvider(_) => Some(MonitoringError::MetricInvalidProvider),
            MetricError::ProviderHostRequired => Some(MonitoringError::MetricProviderHostRequired),
            MetricError::ProviderPortRequired => Some(MonitoringError::MetricProviderPortRequired),
            MetricError::IntervalInvalid => Some(MonitoringError::MetricIntervalInvalid),
            _ => None,
        };
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::io;

    #[derive(Debug)]
    struct Wrapper(BoxError);

    impl fmt::Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "wrapped: {}", self.0)
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            let inner: &(dyn StdError + 'static) = &*self.0;
            Some(inner)
        }
    }

    fn known_sentinels() -> Vec<(BoxError, MonitoringError)> {
        vec![
            (
                Box::new(LoggerError::InvalidLevel("verbose".into())),
                MonitoringError::LoggerInvalidLevel,
            ),
            (
                Box::new(TracerError::InvalidProvider("bogus".into())),
                MonitoringError::TracerInvalidProvider,
            ),
            (
                Box::new(TracerError::ProviderHostRequired),
                MonitoringError::TracerProviderHostRequired,
            ),
            (
                Box::new(TracerError::ProviderPortRequired),
                MonitoringError::TracerProviderPortRequired,
            ),
            (
                Box::new(TracerError::BatchTimeoutInvalid),
                MonitoringError::TracerBatchTimeoutInvalid,
            ),
            (
                Box::new(MetricError::InvalidProvider("bogus".into())),
                MonitoringError::MetricInvalidProvider,
            ),
            (
                Box::new(MetricError::ProviderHostRequired),
                MonitoringError::MetricProviderHostRequired,
            ),
            (
                Box::new(MetricError::ProviderPortRequired),
                MonitoringError::MetricProviderPortRequired,
            ),
            (
                Box::new(MetricError::IntervalInvalid),
                MonitoringError::MetricIntervalInvalid,
            ),
        ]
    }

    #[test]
    fn test_known_sentinels_map_to_public_sentinels() {
        for (backend, expected) in known_sentinels() {
            let mapped = map_error(Some(backend), "failed to initialize");
            assert_eq!(
                std::mem::discriminant(&mapped),
                std::mem::discriminant(&expected),
                "{mapped:?} should be {expected:?}"
            );
        }
    }

    #[test]
    fn test_distinct_sentinels_never_cross_match() {
        let mapped: Vec<_> = known_sentinels()
            .into_iter()
            .map(|(backend, _)| std::mem::discriminant(&map_error(Some(backend), "ctx")))
            .collect();

        for (i, a) in mapped.iter().enumerate() {
            for (j, b) in mapped.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "sentinels {i} and {j} collide");
                }
            }
        }
    }

    #[test]
    fn test_sentinel_found_behind_wrapper() {
        let inner: BoxError = Box::new(TracerError::InvalidProvider("bogus".into()));
        let wrapped: BoxError = Box::new(Wrapper(inner));

        let mapped = map_error(Some(wrapped), "failed to initialize tracer");

        assert!(matches!(mapped, MonitoringError::TracerInvalidProvider));
    }

    #[test]
    fn test_unknown_error_is_wrapped_with_context() {
        let source: BoxError = Box::new(io::Error::other("disk on fire"));

        let mapped = map_error(Some(source), "failed to initialize logger");

        assert!(matches!(mapped, MonitoringError::Component { .. }));
        assert_eq!(mapped.to_string(), "failed to initialize logger: disk on fire");
        assert_eq!(mapped.kind(), ErrorKind::BackendConstruction);
        let io_err = mapped.find_source::<io::Error>().unwrap();
        assert_eq!(io_err.to_string(), "disk on fire");
    }

    #[test]
    fn test_non_sentinel_backend_variant_is_wrapped() {
        let source: BoxError = Box::new(LoggerError::OutputPath {
            path: "/nonexistent/dir/app.log".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such directory"),
        });

        let mapped = map_error(Some(source), "failed to initialize logger");

        assert!(matches!(mapped, MonitoringError::Component { .. }));
        assert!(mapped.find_source::<LoggerError>().is_some());
        assert!(mapped.find_source::<io::Error>().is_some());
    }

    #[test]
    fn test_missing_error_yields_unknown() {
        let mapped = map_error(None, "failed to initialize metric");

        assert!(matches!(mapped, MonitoringError::Unknown { .. }));
        assert_eq!(mapped.to_string(), "failed to initialize metric: unknown error");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            MonitoringError::ServiceNameRequired.kind(),
            ErrorKind::ConfigurationMissing
        );
        assert_eq!(
            MonitoringError::TracerInvalidProvider.kind(),
            ErrorKind::InvalidProvider
        );
        assert_eq!(
            MonitoringError::MetricInvalidProvider.kind(),
            ErrorKind::InvalidProvider
        );
        assert_eq!(
            MonitoringError::MetricIntervalInvalid.kind(),
            ErrorKind::InvalidField
        );
        assert_eq!(
            MonitoringError::TracerProviderHostRequired.kind(),
            ErrorKind::InvalidField
        );
        let shutdown = MonitoringError::Shutdown {
            component: "tracer",
            source: Box::new(io::Error::other("timed out")),
        };
        assert_eq!(shutdown.kind(), ErrorKind::Shutdown);
        assert_eq!(shutdown.to_string(), "failed to shutdown tracer: timed out");
    }
}
