//! Unified application error types for Deskwire.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// A network-level failure during connect or reconnect; retried with backoff.
    TransportUnavailable,
    /// The private-channel authorization endpoint rejected the request.
    AuthorizationDenied,
    /// Reconnect attempts were exhausted; requires an explicit reconnect.
    ConnectionFailed,
    /// A consumer-supplied event handler failed.
    Handler,
    /// A session-related error occurred (missing token or user identity).
    Session,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// A configuration error occurred.
    Configuration,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportUnavailable => write!(f, "TRANSPORT_UNAVAILABLE"),
            Self::AuthorizationDenied => write!(f, "AUTHORIZATION_DENIED"),
            Self::ConnectionFailed => write!(f, "CONNECTION_FAILED"),
            Self::Handler => write!(f, "HANDLER"),
            Self::Session => write!(f, "SESSION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified application error used throughout Deskwire.
///
/// All crate-specific errors are mapped into `AppError` using `From` impls
/// or explicit `.map_err()` calls. This provides a single error type for
/// the entire application boundary.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transport-unavailable error.
    pub fn transport_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportUnavailable, message)
    }

    /// Create an authorization-denied error.
    pub fn authorization_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthorizationDenied, message)
    }

    /// Create a connection-failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionFailed, message)
    }

    /// Create a handler error.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Handler, message)
    }

    /// Create a session error.
    pub fn session(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Session, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Whether this error should terminate the reconnect loop rather than
    /// be retried with backoff.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::AuthorizationDenied | ErrorKind::ConnectionFailed
        )
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(
            ErrorKind::TransportUnavailable,
            format!("I/O error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
