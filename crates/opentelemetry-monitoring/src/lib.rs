//! One configuration surface and one lifecycle for structured logging,
//! distributed tracing and metrics.
//!
//! The crate resolves a single configuration snapshot, initialises a logger,
//! a tracer and a metric handle in that order, and rolls back whatever was
//! already built if a later component fails. Backend errors are folded into
//! a small, stable [`MonitoringError`] taxonomy.
//!
//! # Features
//!
//! - **Layered configuration** - Combine defaults, config files, environment
//!   variables and ordered [`ConfigMutator`]s using [figment](https://docs.rs/figment)
//! - **All-or-nothing initialisation** - Callers get all three handles or an
//!   error, never a partially built aggregate
//! - **Stable errors** - Known backend failures map onto public sentinels;
//!   anything else is wrapped with context and stays reachable as a source
//! - **Trace propagation** - W3C trace context in and out of a flat,
//!   multi-valued [`Carrier`]
//! - **No global state** - Providers, propagators and log subscribers are
//!   owned per handle
//!
//! # Example
//!
//! ```no_run
//! use opentelemetry::Context;
//! use opentelemetry_monitoring::config::{with_service_name, with_tracer_sample_ratio};
//! use opentelemetry_monitoring::{Fields, Monitoring, MonitoringError};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), MonitoringError> {
//!     let monitoring = Monitoring::new([
//!         with_service_name("checkout"),
//!         with_tracer_sample_ratio(0.25),
//!     ])?;
//!
//!     let tracer = monitoring.tracer();
//!     let cx = tracer.start_span(&Context::new(), "charge-card");
//!     let logger = monitoring.logger().with_span_context(&tracer.span_context(&cx));
//!     logger.info("charging card", &Fields::new());
//!
//!     // Headers for the outgoing request
//!     let carrier = tracer.inject_context(&cx);
//!     # let _ = carrier;
//!     tracer.end_span(&cx);
//!
//!     monitoring.shutdown(Duration::from_secs(5))
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
mod builder;
pub mod config;
mod error;
mod handle;
mod monitoring;
mod propagation;
mod sampler;

pub use backend::{Backends, OtelBackends};
pub use builder::MonitoringBuilder;
pub use config::{
    ConfigMutator, LoggerConfig, MetricConfig, MonitoringConfig, ServiceConfig, TracerConfig,
};
pub use error::{BoxError, ErrorKind, MonitoringError, Result, map_error};
pub use handle::{Fields, Logger, Metric, Tracer};
pub use monitoring::{
    Monitoring, ROLLBACK_TIMEOUT, init_logger, init_metric, init_tracer, new_logger, new_metric,
    new_tracer,
};
pub use propagation::{Carrier, extract, extract_with, inject, inject_with};
pub use sampler::{SamplerPolicy, select_sampler};

// Re-export figment for callers who want to layer their own providers
pub use figment;
