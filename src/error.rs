//! Error types for registry replication.
//!
//! Errors are categorized by their source (transport, decoding, etc.) and
//! include the operation that failed to help with debugging.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Transport` | Yes | Connection failures, timeouts, DNS errors |
//! | `Status` | 5xx only | Peer answered with an unexpected HTTP status where a payload was required |
//! | `Decode` | No | Response body absent or unparseable where one was expected |
//! | `Config` | No | Configuration invalid (bad URL, zero interval) |
//! | `Internal` | No | Unexpected internal error |
//!
//! # What is *not* an error
//!
//! Non-2xx HTTP statuses are returned as values inside
//! [`PeerResponse`](crate::transport::PeerResponse); callers branch on the
//! status. A lost generation-counter race and a reconcile-hash divergence are
//! handled entirely inside [`RemoteRegistryCache`](crate::cache::RemoteRegistryCache)
//! and never surface here.
//!
//! # Retry Behavior
//!
//! Use [`RegistryError::is_retryable()`] to decide whether an operation
//! should be retried with backoff. Retryable errors indicate transient
//! network issues; non-retryable errors indicate bugs or bad configuration.

use thiserror::Error;

/// Result type alias for registry replication operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur while fetching from or replicating to a peer registry.
///
/// Use [`is_retryable()`](Self::is_retryable) to check whether the operation
/// should be retried.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// HTTP transport failure.
    ///
    /// The request never produced a usable response: connection refused,
    /// timeout, DNS failure. Retryable with backoff.
    #[error("Transport error ({operation}): {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    /// Peer answered with an unexpected HTTP status where a payload was
    /// required (e.g. a 503 on a full fetch).
    ///
    /// Server-side statuses (5xx) indicate a transient availability problem
    /// and are retryable; anything else is not.
    #[error("Unexpected status {status} ({operation})")]
    Status { operation: String, status: u16 },

    /// Response body could not be decoded where a body was expected.
    ///
    /// Not retryable in-place; the payload is malformed at the source.
    #[error("Decode error ({operation}): {message}")]
    Decode { operation: String, message: String },

    /// Invalid configuration.
    ///
    /// Raised at construction time (malformed base URL, zero fetch interval).
    /// Not retryable; fix the configuration and restart.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected internal error.
    ///
    /// Catch-all for conditions that should not happen.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    /// Wrap a reqwest error with the name of the operation that failed.
    pub fn transport(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            operation: operation.into(),
            source,
        }
    }

    /// Create an unexpected-status error.
    pub fn status(operation: impl Into<String>, status: u16) -> Self {
        Self::Status {
            operation: operation.into(),
            status,
        }
    }

    /// Create a decode error.
    pub fn decode(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode { .. } => false,
            Self::Config(_) => false,
            Self::Internal(_) => false,
        }
    }
}
