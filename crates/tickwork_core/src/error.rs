//! # Core Error Types
//!
//! Errors a system can report from its per-tick update.

use thiserror::Error;

/// Failure reported by a [`System`](crate::System) update.
///
/// These never escape `World::update`; the world forwards each one to its
/// error handler and keeps ticking the remaining systems.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SystemError {
    /// The update could not complete this tick.
    #[error("system `{system}` failed: {reason}")]
    Failed {
        /// Name of the failing system.
        system: String,
        /// What went wrong.
        reason: String,
    },

    /// The system reached a state it cannot recover from.
    #[error("system `{system}` is unrecoverable: {reason}")]
    Fatal {
        /// Name of the failing system.
        system: String,
        /// What went wrong.
        reason: String,
    },
}

impl SystemError {
    /// Builds a recoverable failure.
    pub fn failed(system: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            system: system.into(),
            reason: reason.into(),
        }
    }

    /// Builds an unrecoverable failure.
    pub fn fatal(system: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fatal {
            system: system.into(),
            reason: reason.into(),
        }
    }

    /// Returns the name of the system that failed.
    #[must_use]
    pub fn system(&self) -> &str {
        match self {
            Self::Failed { system, .. } | Self::Fatal { system, .. } => system,
        }
    }

    /// Returns true if the system declared itself unrecoverable.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// Result type for system updates.
pub type SystemResult = Result<(), SystemError>;
