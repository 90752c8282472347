//! Capability traits for the three component handles.
//!
//! The orchestrator only ever talks to these traits. [`OtelBackends`]
//! provides the default implementations; tests and embedders can supply
//! their own through [`Backends`].
//!
//! [`OtelBackends`]: crate::OtelBackends
//! [`Backends`]: crate::Backends

use crate::error::BoxError;
use crate::propagation::Carrier;
use opentelemetry::trace::{SpanContext, TraceContextExt};
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::{Context, KeyValue};
use std::time::Duration;

/// Structured key-value payload attached to a log line.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Leveled structured logging.
pub trait Logger: Send + Sync {
    /// Changes the minimum level at runtime.
    ///
    /// An unrecognised level falls back to `info` and is reported through the
    /// logger itself rather than as an error.
    fn set_level(&self, level: &str) -> Result<(), BoxError>;

    /// Logs at debug level.
    fn debug(&self, message: &str, fields: &Fields);

    /// Logs at info level.
    fn info(&self, message: &str, fields: &Fields);

    /// Logs at warn level.
    fn warn(&self, message: &str, fields: &Fields);

    /// Logs at error level.
    fn error(&self, message: &str, fields: &Fields);

    /// Logs at the highest severity. The process keeps running.
    fn fatal(&self, message: &str, fields: &Fields);

    /// Returns a derived logger that stamps the trace and span IDs of
    /// `span_context` on every line. The level stays shared with `self`.
    fn with_span_context(&self, span_context: &SpanContext) -> Box<dyn Logger>;

    /// Writes out any buffered lines.
    fn flush(&self) -> Result<(), BoxError>;
}

/// Span creation and cross-process context propagation.
pub trait Tracer: Send + Sync {
    /// Starts a span named `name` under whatever span `parent` carries and
    /// returns a context holding the new span.
    fn start_span(&self, parent: &Context, name: &str) -> Context;

    /// Starts a span explicitly parented on `parent`, ignoring any span
    /// already present in `cx`.
    fn start_child_span(&self, cx: &Context, name: &str, parent: &SpanContext) -> Context {
        let parent_cx = cx.with_remote_span_context(parent.clone());
        self.start_span(&parent_cx, name)
    }

    /// Ends the span held by `cx`, recording its completion time.
    fn end_span(&self, cx: &Context) {
        cx.span().end();
    }

    /// Returns the span context held by `cx`. Invalid if `cx` carries no span.
    fn span_context(&self, cx: &Context) -> SpanContext {
        cx.span().span_context().clone()
    }

    /// Serialises the trace context of `cx` for an outgoing request.
    fn inject_context(&self, cx: &Context) -> Carrier;

    /// Reads the trace context of an incoming request on top of `base`.
    fn extract_context(&self, base: &Context, carrier: &Carrier) -> Context;

    /// Flushes pending spans and releases the exporter.
    fn shutdown(&self, timeout: Duration) -> Result<(), BoxError>;
}

/// Counter and histogram instruments.
pub trait Metric: Send + Sync {
    /// Creates a monotonic counter.
    fn create_counter(&self, name: &str, unit: &str, description: &str) -> Counter<u64>;

    /// Adds `value` to `counter`.
    fn record_counter(&self, counter: &Counter<u64>, value: u64, attributes: &[KeyValue]) {
        counter.add(value, attributes);
    }

    /// Creates a histogram.
    fn create_histogram(&self, name: &str, unit: &str, description: &str) -> Histogram<u64>;

    /// Records `value` into `histogram`.
    fn record_histogram(&self, histogram: &Histogram<u64>, value: u64, attributes: &[KeyValue]) {
        histogram.record(value, attributes);
    }

    /// Exports pending measurements and releases the exporter.
    fn shutdown(&self, timeout: Duration) -> Result<(), BoxError>;
}
