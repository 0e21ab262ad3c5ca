//! Error types and handling
//!
//! All failures of the monitor core are variants of [`MonitorError`]. Each
//! error falls into one [`ErrorKind`]:
//!
//! - **Usage**: malformed step records or invalid session lifecycle calls.
//!   The offending step is never absorbed into history.
//! - **Detector**: a detector failed or produced an out-of-contract
//!   detection. This is a programming defect and is never downgraded to
//!   "no detection".
//! - **Config**: invalid or unreadable configuration.
//! - **Io**: file system failures while loading configuration or traces.
//!
//! A tripped circuit breaker is *not* an error: it is reported as
//! `Decision::Halt`.
//!
//! # Examples
//!
//! ```
//! use sdk::errors::{ErrorKind, MonitorError, VigilErrorExt};
//!
//! let error = MonitorError::SessionMismatch {
//!     expected: "a".to_string(),
//!     found: "b".to_string(),
//! };
//! assert_eq!(error.kind(), ErrorKind::Usage);
//! assert!(!error.is_recoverable());
//! println!("Hint: {}", error.user_hint());
//! ```

use thiserror::Error;

use crate::protocol::CriticalState;

/// Trait for Vigil error extensions
///
/// Provides a user-facing hint and tells the caller whether the session
/// that produced the error can keep going.
pub trait VigilErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the session can continue after this error
    ///
    /// Errors raised while processing a step abort the session (fail
    /// closed); only lifecycle mistakes such as an unknown session id are
    /// recoverable.
    fn is_recoverable(&self) -> bool;
}

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Usage,
    Detector,
    Config,
    Io,
}

/// Main monitor error type
#[derive(Debug, Error)]
pub enum MonitorError {
    // Step record errors
    #[error("Step record has no session id")]
    MissingSessionId,

    #[error("Step belongs to session '{found}' but history is bound to '{expected}'")]
    SessionMismatch { expected: String, found: String },

    #[error("Non-monotonic step index in session '{session}': expected {expected}, got {found}")]
    NonMonotonicStep {
        session: String,
        expected: u64,
        found: u64,
    },

    #[error("Session '{session}' has no step index after {last}")]
    StepIndexExhausted { session: String, last: u64 },

    #[error("Step {0} has an empty action name")]
    EmptyActionName(u64),

    #[error("Confidence hint must be within [0, 1], got {0}")]
    InvalidConfidence(f64),

    // Session lifecycle errors
    #[error("Invalid budgets: {0}")]
    InvalidBudgets(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Session already exists: {0}")]
    SessionExists(String),

    #[error("Session '{session}' was aborted: {cause}")]
    SessionAborted { session: String, cause: String },

    // Detector errors
    #[error("{state} detector failed: {reason}")]
    Detector { state: CriticalState, reason: String },

    #[error("{detector} detector produced an invalid detection ({state}, confidence {confidence})")]
    InvalidDetection {
        detector: CriticalState,
        state: CriticalState,
        confidence: f64,
    },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingSessionId
            | Self::SessionMismatch { .. }
            | Self::NonMonotonicStep { .. }
            | Self::StepIndexExhausted { .. }
            | Self::EmptyActionName(_)
            | Self::InvalidConfidence(_)
            | Self::InvalidBudgets(_)
            | Self::UnknownSession(_)
            | Self::SessionExists(_)
            | Self::SessionAborted { .. } => ErrorKind::Usage,
            Self::Detector { .. } | Self::InvalidDetection { .. } => ErrorKind::Detector,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

impl VigilErrorExt for MonitorError {
    fn user_hint(&self) -> &str {
        match self {
            // Step record errors
            Self::MissingSessionId => "Every step must carry the id of a started session",
            Self::SessionMismatch { .. } => "Send each step to the session it belongs to",
            Self::NonMonotonicStep { .. } => "Step indices must increase by exactly one",
            Self::StepIndexExhausted { .. } => "Restart the session with a lower base index",
            Self::EmptyActionName(_) => "Every step must name the action it executed",
            Self::InvalidConfidence(_) => "Confidence hints must be between 0.0 and 1.0",

            // Session lifecycle errors
            Self::InvalidBudgets(_) => "Budgets must allow at least one step and one token",
            Self::UnknownSession(_) => "Start the session before sending steps to it",
            Self::SessionExists(_) => "End or restart the existing session first",
            Self::SessionAborted { .. } => "Restart the session to continue",

            // Detector errors
            Self::Detector { .. } | Self::InvalidDetection { .. } => {
                "Internal monitor defect. Restart the session and report the trace"
            }

            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownSession(_) | Self::SessionExists(_) | Self::InvalidBudgets(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors_are_classified() {
        let err = MonitorError::NonMonotonicStep {
            session: "s".to_string(),
            expected: 3,
            found: 5,
        };
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("expected 3, got 5"));
    }

    #[test]
    fn test_detector_errors_are_not_recoverable() {
        let err = MonitorError::Detector {
            state: CriticalState::Panic,
            reason: "boom".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Detector);
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "PANIC detector failed: boom");
    }

    #[test]
    fn test_lifecycle_errors_are_recoverable() {
        assert!(MonitorError::UnknownSession("x".to_string()).is_recoverable());
        assert!(MonitorError::SessionExists("x".to_string()).is_recoverable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: MonitorError = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
