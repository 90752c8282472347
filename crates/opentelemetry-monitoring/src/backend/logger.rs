//! JSON logger built on `tracing-subscriber`.
//!
//! Each [`TracingLogger`] owns a private [`Dispatch`], so several loggers can
//! coexist in one process with different levels and destinations, and none
//! of them touches the global subscriber.
//!
//! The dispatch itself admits every level. The minimum level lives in the
//! handle and is checked before an event is emitted, so it never depends on
//! callsite interest cached across dispatchers.

use crate::config::LoggerConfig;
use crate::error::BoxError;
use crate::handle::{Fields, Logger};
use opentelemetry::trace::SpanContext;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::Dispatch;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

const LOG_TARGET: &str = "monitoring";

/// Errors produced by the logger backend.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The configured level is not one of debug, info, warn, error, fatal.
    #[error("invalid log level: {0:?}")]
    InvalidLevel(String),

    /// The output file could not be opened.
    #[error("failed to open log output {path}")]
    OutputPath {
        /// Configured output path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Buffered lines could not be written out.
    #[error("failed to flush log output")]
    Flush(#[source] io::Error),
}

/// Severity accepted by the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Info,
    /// Something unexpected that does not stop the service.
    Warn,
    /// A failed operation.
    Error,
    /// A failure the service cannot recover from.
    Fatal,
}

impl LogLevel {
    /// Filter admitting this level and everything more severe.
    ///
    /// `tracing` has no level above error, so fatal filters like error.
    pub fn filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warn => LevelFilter::WARN,
            Self::Error | Self::Fatal => LevelFilter::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            _ => Err(LoggerError::InvalidLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Destination shared by a logger and every logger derived from it.
#[derive(Clone)]
struct SharedWriter(Arc<Mutex<Box<dyn Write + Send>>>);

impl SharedWriter {
    fn open(path: Option<&PathBuf>) -> Result<Self, LoggerError> {
        let sink: Box<dyn Write + Send> = match path {
            None => Box::new(io::stdout()),
            Some(p) if p.as_os_str() == "stdout" => Box::new(io::stdout()),
            Some(p) if p.as_os_str() == "stderr" => Box::new(io::stderr()),
            Some(p) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(p)
                    .map_err(|source| LoggerError::OutputPath {
                        path: p.clone(),
                        source,
                    })?;
                Box::new(BufWriter::new(file))
            }
        };
        Ok(Self(Arc::new(Mutex::new(sink))))
    }

    fn flush(&self) -> io::Result<()> {
        self.0.lock().flush()
    }
}

/// Holds the lock for the duration of one formatted event.
struct LockedWriter<'a>(MutexGuard<'a, Box<dyn Write + Send>>);

impl Write for LockedWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = LockedWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LockedWriter(self.0.lock())
    }
}

/// Logger handle writing one JSON object per line.
#[derive(Clone)]
pub struct TracingLogger {
    dispatch: Dispatch,
    level: Arc<RwLock<LevelFilter>>,
    writer: SharedWriter,
    trace_id: Option<String>,
    span_id: Option<String>,
}

impl fmt::Debug for TracingLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingLogger")
            .field("trace_id", &self.trace_id)
            .field("span_id", &self.span_id)
            .finish_non_exhaustive()
    }
}

impl TracingLogger {
    /// Builds a logger from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidLevel`] for an unknown level and
    /// [`LoggerError::OutputPath`] when the output file cannot be opened.
    pub fn new(config: &LoggerConfig) -> Result<Self, LoggerError> {
        let level: LogLevel = config.level.parse()?;
        let writer = SharedWriter::open(config.output_path.as_ref())?;

        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_target(false)
            .with_writer(writer.clone());

        let subscriber = tracing_subscriber::registry()
            .with(LevelFilter::TRACE)
            .with(fmt_layer);

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            level: Arc::new(RwLock::new(level.filter())),
            writer,
            trace_id: None,
            span_id: None,
        })
    }

    /// Current minimum level filter.
    pub fn level(&self) -> LevelFilter {
        *self.level.read()
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level.filter() <= *self.level.read()
    }

    fn emit(&self, level: LogLevel, message: &str, fields: &Fields) {
        if !self.enabled(level) {
            return;
        }

        let payload = (!fields.is_empty())
            .then(|| tracing::field::display(serde_json::Value::Object(fields.clone())));
        let trace_id = self.trace_id.as_deref();
        let span_id = self.span_id.as_deref();

        macro_rules! event {
            ($lvl:expr) => {
                tracing::event!(
                    target: LOG_TARGET,
                    $lvl,
                    trace_id,
                    span_id,
                    fields = payload,
                    "{message}"
                )
            };
        }

        tracing::dispatcher::with_default(&self.dispatch, || match level {
            LogLevel::Debug => event!(tracing::Level::DEBUG),
            LogLevel::Info => event!(tracing::Level::INFO),
            LogLevel::Warn => event!(tracing::Level::WARN),
            LogLevel::Error => event!(tracing::Level::ERROR),
            LogLevel::Fatal => tracing::event!(
                target: LOG_TARGET,
                tracing::Level::ERROR,
                trace_id,
                span_id,
                fields = payload,
                fatal = true,
                "{message}"
            ),
        });
    }
}

impl Logger for TracingLogger {
    fn set_level(&self, level: &str) -> Result<(), BoxError> {
        let parsed = level.parse::<LogLevel>();
        *self.level.write() = parsed.as_ref().map_or(LevelFilter::INFO, |l| l.filter());

        if parsed.is_err() {
            self.emit(
                LogLevel::Warn,
                &format!("invalid log level: {level}, defaulting to info"),
                &Fields::new(),
            );
        }
        Ok(())
    }

    fn debug(&self, message: &str, fields: &Fields) {
        self.emit(LogLevel::Debug, message, fields);
    }

    fn info(&self, message: &str, fields: &Fields) {
        self.emit(LogLevel::Info, message, fields);
    }

    fn warn(&self, message: &str, fields: &Fields) {
        self.emit(LogLevel::Warn, message, fields);
    }

    fn error(&self, message: &str, fields: &Fields) {
        self.emit(LogLevel::Error, message, fields);
    }

    fn fatal(&self, message: &str, fields: &Fields) {
        self.emit(LogLevel::Fatal, message, fields);
    }

    fn with_span_context(&self, span_context: &SpanContext) -> Box<dyn Logger> {
        Box::new(Self {
            trace_id: Some(span_context.trace_id().to_string()),
            span_id: Some(span_context.span_id().to_string()),
            ..self.clone()
        })
    }

    fn flush(&self) -> Result<(), BoxError> {
        self.writer.flush().map_err(LoggerError::Flush)?;
        Ok(())
    }
}
