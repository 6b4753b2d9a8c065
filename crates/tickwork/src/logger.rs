//! # Log Sinks
//!
//! The engine prints its lifecycle lines (`running...`, `closing...`,
//! `done`, FPS reports) through a [`Logger`]. Formatting and output are the
//! embedding application's business; by default lines go to `tracing`.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{EngineError, EngineResult};

/// Line-oriented sink for engine messages.
pub trait Logger: Send + Sync {
    /// Emits one message.
    fn print(&self, message: &str);

    /// Emits a formatted message.
    fn printf(&self, args: fmt::Arguments<'_>) {
        match args.as_str() {
            Some(message) => self.print(message),
            None => self.print(&args.to_string()),
        }
    }

    /// Emits one message as its own line.
    fn println(&self, message: &str) {
        self.print(message);
    }
}

/// Forwards every line to `tracing` at info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn print(&self, message: &str) {
        tracing::info!(target: "tickwork", "{message}");
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn print(&self, _message: &str) {}
}

/// Keeps every line in memory. Handy for embedding tests.
#[derive(Debug, Default)]
pub struct BufferLogger {
    lines: Mutex<Vec<String>>,
}

impl BufferLogger {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every line so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Returns true if some line equals `line`.
    #[must_use]
    pub fn contains(&self, line: &str) -> bool {
        self.lines.lock().iter().any(|l| l == line)
    }

    /// Returns true if some line starts with `prefix`.
    #[must_use]
    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.lines.lock().iter().any(|l| l.starts_with(prefix))
    }
}

impl Logger for BufferLogger {
    fn print(&self, message: &str) {
        self.lines.lock().push(message.to_owned());
    }
}

/// Output format for the process-wide `tracing` subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Install nothing; events are dropped.
    Null,
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` overrides `level` when set.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(level: &str, format: LogFormat) -> EngineResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let installed = match format {
        LogFormat::Null => return Ok(()),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_names(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init(),
    };

    installed.map_err(|err| EngineError::Logging(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_logger_collects_lines() {
        let logger = BufferLogger::new();
        logger.print("running...");
        logger.printf(format_args!("step: {:.1}", 2.0));
        logger.println("done");

        assert_eq!(logger.lines(), vec!["running...", "step: 2.0", "done"]);
        assert!(logger.contains("done"));
        assert!(logger.contains_prefix("step:"));
        assert!(!logger.contains("step"));
    }

    #[test]
    fn test_log_format_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: LogFormat,
        }
        let parsed: Wrapper = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(parsed.format, LogFormat::Json);
    }
}
