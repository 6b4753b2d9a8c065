//! # Engine Error Types
//!
//! Everything that can go wrong around the run loop, plus the handler that
//! decides what a failing system update means for the engine.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tickwork_core::SystemError;

use crate::engine::EngineHandle;
use crate::signal::Signal;

/// Errors raised by the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A system update failed.
    #[error(transparent)]
    System(#[from] SystemError),

    /// A forced-policy signal arrived; the engine shuts down with an error.
    #[error("signal[{signal}] forcing immediate shutdown")]
    ForcedShutdown {
        /// The signal that forced the shutdown.
        signal: Signal,
    },

    /// A configuration step failed; no engine was built.
    #[error("configuration step `{step}` failed: {reason}")]
    Config {
        /// Name of the failing step.
        step: String,
        /// Why it failed.
        reason: String,
    },

    /// A tick duration string could not be parsed.
    #[error("invalid duration `{input}`: {reason}")]
    InvalidDuration {
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A configuration file could not be read or parsed.
    #[error("config file: {0}")]
    ConfigFile(String),

    /// `run` was called on an engine whose loop is already started.
    #[error("engine is already running")]
    AlreadyRunning,

    /// The run loop thread could not be spawned.
    #[error("failed to spawn run loop: {0}")]
    Spawn(String),

    /// The run loop thread panicked.
    #[error("run loop panicked")]
    LoopPanicked,

    /// OS signal handlers could not be installed.
    #[error("failed to install signal handlers: {0}")]
    SignalSetup(String),

    /// The global log subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Decides what an error reported to the engine does.
///
/// Called from the run loop thread for system failures, so it must not
/// block on the driver.
pub type HandleErrorFn = Arc<dyn Fn(&EngineHandle, EngineError) + Send + Sync>;

/// Default policy: remember the error and ask the loop to stop.
///
/// The current tick still finishes; the kill is honored at the next tick
/// boundary.
pub fn default_handle_error(handle: &EngineHandle, err: EngineError) {
    handle.record_error(err);
    handle.kill();
}

/// Holds the handler plus the last error and accumulated warnings.
pub(crate) struct ErrorHandler {
    handle_fn: HandleErrorFn,
    last: Mutex<Option<EngineError>>,
    warnings: Mutex<Vec<EngineError>>,
}

impl ErrorHandler {
    pub(crate) fn new(handle_fn: HandleErrorFn) -> Self {
        Self {
            handle_fn,
            last: Mutex::new(None),
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn handle_fn(&self) -> HandleErrorFn {
        Arc::clone(&self.handle_fn)
    }

    pub(crate) fn record(&self, err: EngineError) {
        *self.last.lock() = Some(err);
    }

    pub(crate) fn last(&self) -> Option<EngineError> {
        self.last.lock().clone()
    }

    pub(crate) fn warn(&self, err: EngineError) {
        self.warnings.lock().push(err);
    }

    pub(crate) fn warnings(&self) -> Vec<EngineError> {
        self.warnings.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_shutdown_message() {
        let err = EngineError::ForcedShutdown {
            signal: Signal::Quit,
        };
        assert_eq!(err.to_string(), "signal[SIGQUIT] forcing immediate shutdown");
    }

    #[test]
    fn test_system_error_is_transparent() {
        let err: EngineError = SystemError::failed("ai", "no path").into();
        assert_eq!(err.to_string(), "system `ai` failed: no path");
    }

    #[test]
    fn test_handler_keeps_last_error() {
        let handler = ErrorHandler::new(Arc::new(default_handle_error));
        assert!(handler.last().is_none());

        handler.record(EngineError::AlreadyRunning);
        handler.record(EngineError::LoopPanicked);
        assert_eq!(handler.last(), Some(EngineError::LoopPanicked));

        handler.warn(EngineError::Logging("twice".into()));
        assert_eq!(handler.warnings().len(), 1);
    }
}
