//! Structured diagnostics interface.
//!
//! The bridge never formats or persists logs itself. Every diagnostic is a
//! [`LogRecord`] (level, message, source location) handed to an injected
//! [`LogSink`]. [`TracingSink`] forwards to `tracing` and is what
//! [`default_logger`] hands out unless a bootstrap step called
//! [`install_default`] first.

use std::sync::{Arc, Mutex, OnceLock};

use serde::Deserialize;

use crate::error::{BoundaryError, BoundaryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// One diagnostic, borrowed for the duration of the `log` call.
#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    pub level: LogLevel,
    pub message: &'a str,
    pub file: &'a str,
    pub line: u32,
    pub name: &'a str,
}

/// Consumer of diagnostics.
pub trait LogSink: Send + Sync {
    fn enabled(&self, _level: LogLevel) -> bool {
        true
    }

    fn log(&self, record: &LogRecord<'_>);
}

/// Forwards records to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, record: &LogRecord<'_>) {
        let LogRecord {
            message,
            file,
            line,
            name,
            ..
        } = *record;

        match record.level {
            LogLevel::Error => tracing::error!(file, line, name, "{message}"),
            LogLevel::Warn => tracing::warn!(file, line, name, "{message}"),
            LogLevel::Info => tracing::info!(file, line, name, "{message}"),
            LogLevel::Debug => tracing::debug!(file, line, name, "{message}"),
            LogLevel::Trace => tracing::trace!(file, line, name, "{message}"),
        }
    }
}

/// Drops records more verbose than `max` before they reach `sink`.
#[derive(Debug, Clone, Copy)]
pub struct MaxLevel<S> {
    sink: S,
    max: LogLevel,
}

impl<S: LogSink> MaxLevel<S> {
    pub fn new(sink: S, max: LogLevel) -> Self {
        Self { sink, max }
    }
}

impl<S: LogSink> LogSink for MaxLevel<S> {
    fn enabled(&self, level: LogLevel) -> bool {
        level <= self.max && self.sink.enabled(level)
    }

    fn log(&self, record: &LogRecord<'_>) {
        self.sink.log(record);
    }
}

/// Cheaply clonable handle to a sink, injected into every handle constructor.
#[derive(Clone)]
pub struct Logger(Arc<dyn LogSink>);

impl Logger {
    pub fn new(sink: impl LogSink + 'static) -> Self {
        Self(Arc::new(sink))
    }

    pub fn from_arc(sink: Arc<dyn LogSink>) -> Self {
        Self(sink)
    }

    pub fn tracing() -> Self {
        Self::new(TracingSink)
    }

    pub fn log(&self, level: LogLevel, message: &str, file: &str, line: u32, name: &str) {
        if !self.0.enabled(level) {
            return;
        }
        self.0.log(&LogRecord {
            level,
            message,
            file,
            line,
            name,
        });
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Logger")
    }
}

/// Emit a diagnostic with the caller's source location.
///
/// ```ignore
/// diag!(logger, Error, "subscribe failed for {topic}");
/// ```
#[macro_export]
macro_rules! diag {
    ($logger:expr, $level:ident, $($arg:tt)+) => {
        $logger.log(
            $crate::logging::LogLevel::$level,
            &format!($($arg)+),
            file!(),
            line!(),
            module_path!(),
        )
    };
}

static DEFAULT_LOGGER: OnceLock<Logger> = OnceLock::new();

/// Install the process-wide default logger. Only the first call wins.
///
/// Returns `false` when a default was already installed (or already handed
/// out by [`default_logger`]).
pub fn install_default(logger: Logger) -> bool {
    DEFAULT_LOGGER.set(logger).is_ok()
}

/// The process-wide default, a [`TracingSink`] unless [`install_default`] ran.
pub fn default_logger() -> Logger {
    DEFAULT_LOGGER.get_or_init(Logger::tracing).clone()
}

/// Map a native log level (none, fatal, error, warn, info, debug, trace as
/// 0..=6) to a [`LogLevel`]. `none` is forwarded as trace.
pub fn native_level(level: i32) -> BoundaryResult<LogLevel> {
    match level {
        0 | 6 => Ok(LogLevel::Trace),
        1 | 2 => Ok(LogLevel::Error),
        3 => Ok(LogLevel::Warn),
        4 => Ok(LogLevel::Info),
        5 => Ok(LogLevel::Debug),
        other => Err(BoundaryError::UnrecognizedEnumValue(
            i64::from(other),
            "NativeLogLevel",
        )),
    }
}

/// Forward a line emitted by the native library's own logger.
pub fn forward_native(
    logger: &Logger,
    level: i32,
    file: &str,
    line: u32,
    name: &str,
    message: &str,
) -> BoundaryResult<()> {
    let level = native_level(level)?;
    logger.log(level, message, file, line, name);
    Ok(())
}

/// An owned copy of a [`LogRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRecord {
    pub level: LogLevel,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub name: String,
}

/// In-memory sink that keeps every record, for assertions in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<CapturedRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CapturedRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Messages logged at `level`, in order.
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.level == level)
            .map(|r| r.message.clone())
            .collect()
    }

    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.messages(level).iter().any(|m| m.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, record: &LogRecord<'_>) {
        self.records.lock().unwrap().push(CapturedRecord {
            level: record.level,
            message: record.message.to_string(),
            file: record.file.to_string(),
            line: record.line,
            name: record.name.to_string(),
        });
    }
}

impl LogSink for Arc<MemorySink> {
    fn log(&self, record: &LogRecord<'_>) {
        self.as_ref().log(record);
    }
}
