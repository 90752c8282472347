//! Instrumented fake backends shared by the integration tests.
//!
//! Every fake records what happens to it in a shared [`EventLog`], including
//! when it is dropped, so tests can assert both call order and that no
//! handle outlives a failed initialization.

#![allow(dead_code)]

use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider as _};
use opentelemetry::trace::SpanContext;
use opentelemetry::Context;
use opentelemetry_monitoring::{
    Backends, BoxError, Carrier, Fields, Logger, LoggerConfig, Metric, MetricConfig,
    ServiceConfig, Tracer, TracerConfig,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Produces a fresh backend error each time a fake is asked to fail.
pub type ErrorFactory = fn() -> BoxError;

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == event)
    }

    pub fn contains(&self, event: &str) -> bool {
        self.position(event).is_some()
    }
}

#[derive(Clone, Default)]
pub struct FakeBackends {
    pub events: EventLog,
    pub logger_error: Option<ErrorFactory>,
    pub tracer_error: Option<ErrorFactory>,
    pub metric_error: Option<ErrorFactory>,
    pub logger_flush_error: Option<ErrorFactory>,
    pub tracer_shutdown_error: Option<ErrorFactory>,
    pub metric_shutdown_error: Option<ErrorFactory>,
}

impl FakeBackends {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backends for FakeBackends {
    fn logger(&self, _config: &LoggerConfig) -> Result<Box<dyn Logger>, BoxError> {
        self.events.push("logger.new");
        if let Some(make) = self.logger_error {
            return Err(make());
        }
        Ok(Box::new(FakeLogger {
            events: self.events.clone(),
            flush_error: self.logger_flush_error,
        }))
    }

    fn tracer(
        &self,
        _service: &ServiceConfig,
        _config: &TracerConfig,
    ) -> Result<Box<dyn Tracer>, BoxError> {
        self.events.push("tracer.new");
        if let Some(make) = self.tracer_error {
            return Err(make());
        }
        Ok(Box::new(FakeTracer {
            events: self.events.clone(),
            shutdown_error: self.tracer_shutdown_error,
        }))
    }

    fn metric(
        &self,
        _service: &ServiceConfig,
        _config: &MetricConfig,
    ) -> Result<Box<dyn Metric>, BoxError> {
        self.events.push("metric.new");
        if let Some(make) = self.metric_error {
            return Err(make());
        }
        Ok(Box::new(FakeMetric {
            events: self.events.clone(),
            shutdown_error: self.metric_shutdown_error,
            meter: SdkMeterProvider::default().meter("fake"),
        }))
    }
}

pub struct FakeLogger {
    events: EventLog,
    flush_error: Option<ErrorFactory>,
}

impl Logger for FakeLogger {
    fn set_level(&self, level: &str) -> Result<(), BoxError> {
        self.events.push(format!("logger.set_level:{level}"));
        Ok(())
    }

    fn debug(&self, message: &str, _fields: &Fields) {
        self.events.push(format!("logger.debug:{message}"));
    }

    fn info(&self, message: &str, _fields: &Fields) {
        self.events.push(format!("logger.info:{message}"));
    }

    fn warn(&self, message: &str, _fields: &Fields) {
        self.events.push(format!("logger.warn:{message}"));
    }

    fn error(&self, message: &str, _fields: &Fields) {
        self.events.push(format!("logger.error:{message}"));
    }

    fn fatal(&self, message: &str, _fields: &Fields) {
        self.events.push(format!("logger.fatal:{message}"));
    }

    fn with_span_context(&self, _span_context: &SpanContext) -> Box<dyn Logger> {
        Box::new(FakeLogger {
            events: self.events.clone(),
            flush_error: self.flush_error,
        })
    }

    fn flush(&self) -> Result<(), BoxError> {
        self.events.push("logger.flush");
        match self.flush_error {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}

impl Drop for FakeLogger {
    fn drop(&mut self) {
        self.events.push("logger.drop");
    }
}

pub struct FakeTracer {
    events: EventLog,
    shutdown_error: Option<ErrorFactory>,
}

impl Tracer for FakeTracer {
    fn start_span(&self, parent: &Context, name: &str) -> Context {
        self.events.push(format!("tracer.start_span:{name}"));
        parent.clone()
    }

    fn inject_context(&self, cx: &Context) -> Carrier {
        opentelemetry_monitoring::inject(cx)
    }

    fn extract_context(&self, base: &Context, carrier: &Carrier) -> Context {
        opentelemetry_monitoring::extract(base, carrier)
    }

    fn shutdown(&self, _timeout: Duration) -> Result<(), BoxError> {
        self.events.push("tracer.shutdown");
        match self.shutdown_error {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}

impl Drop for FakeTracer {
    fn drop(&mut self) {
        self.events.push("tracer.drop");
    }
}

pub struct FakeMetric {
    events: EventLog,
    shutdown_error: Option<ErrorFactory>,
    meter: Meter,
}

impl Metric for FakeMetric {
    fn create_counter(&self, name: &str, _unit: &str, _description: &str) -> Counter<u64> {
        self.events.push(format!("metric.create_counter:{name}"));
        self.meter.u64_counter(name.to_string()).build()
    }

    fn create_histogram(&self, name: &str, _unit: &str, _description: &str) -> Histogram<u64> {
        self.events.push(format!("metric.create_histogram:{name}"));
        self.meter.u64_histogram(name.to_string()).build()
    }

    fn shutdown(&self, _timeout: Duration) -> Result<(), BoxError> {
        self.events.push("metric.shutdown");
        match self.shutdown_error {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}

impl Drop for FakeMetric {
    fn drop(&mut self) {
        self.events.push("metric.drop");
    }
}

pub fn backend_down() -> BoxError {
    Box::new(std::io::Error::other("backend down"))
}
