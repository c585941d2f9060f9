//! Error types and handling
//!
//! This module provides the error type shared by the dispatch engine and any
//! transport layer built on top of it. All errors implement the `ErrorExt`
//! trait which provides user-friendly hints and indicates whether errors are
//! recoverable.
//!
//! # Security
//!
//! Hints returned by `ErrorExt::user_hint` are static strings. They never echo
//! backend payloads or request text back to the caller.

use thiserror::Error;

/// Trait for dispatch error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried as-is. Non-recoverable errors need a
    /// configuration change or an operator before a retry can succeed.
    fn is_recoverable(&self) -> bool;

    /// Returns true if the error is a cooperative cancellation rather than a
    /// failure
    fn is_cancellation(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Cancellation**: the request was stopped by its caller. Not a failure.
/// - **Backend**: the inference backend is unreachable or too slow.
/// - **Routing**: auxiliary model output could not be parsed. Always recovered
///   inside the engine; it never reaches a caller.
/// - **Terminal**: no model can serve the request.
/// - **Configuration**: invalid or unreadable configuration.
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt};
///
/// let error = EngineError::BackendTimeout;
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let cancelled = EngineError::Cancelled;
/// assert!(cancelled.is_cancellation());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Cooperative cancellation
    #[error("Request cancelled")]
    Cancelled,

    // Backend errors
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend call timed out")]
    BackendTimeout,

    // Routing errors
    #[error("Malformed hint response: {0}")]
    MalformedHintResponse(String),

    #[error("No models available")]
    NoModelsAvailable,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Cancelled => "The request was cancelled",
            Self::BackendUnavailable(_) => {
                "Inference backend unavailable. Check that it is running and try again"
            }
            Self::BackendTimeout => "Inference backend took too long to respond. Try again",
            Self::MalformedHintResponse(_) => "Routing hint could not be read",
            Self::NoModelsAvailable => "No models available. Pull a model or set a default model",
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::NoModelsAvailable | Self::Config(_) => false,
            _ => true,
        }
    }

    fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_are_recoverable() {
        assert!(EngineError::BackendTimeout.is_recoverable());
        assert!(EngineError::BackendUnavailable("connection refused".into()).is_recoverable());
    }

    #[test]
    fn test_terminal_errors_are_not_recoverable() {
        assert!(!EngineError::NoModelsAvailable.is_recoverable());
        assert!(!EngineError::Config("bad".into()).is_recoverable());
    }

    #[test]
    fn test_only_cancelled_is_cancellation() {
        assert!(EngineError::Cancelled.is_cancellation());
        assert!(!EngineError::BackendTimeout.is_cancellation());
        assert!(!EngineError::NoModelsAvailable.is_cancellation());
    }

    #[test]
    fn test_hint_does_not_echo_payload() {
        let err = EngineError::BackendUnavailable("secret-host:11434".into());
        assert!(!err.user_hint().contains("secret-host"));
        assert!(err.to_string().contains("secret-host"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
