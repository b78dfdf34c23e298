//! Error types for the DataLive bootstrapper.
//!
//! Library crates use [`BootstrapError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all bootstrap operations.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The control plane answered with a non-success status or an unusable body.
    #[error("control plane error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Privileged backing-store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed definition, missing field, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A bounded wait ran out.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Credential hash synthesis failed.
    #[error("hashing error: {0}")]
    Hashing(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BootstrapError>;

impl BootstrapError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an API error from a status code and message.
    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status carried by an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the control plane rejected a create because the name is taken.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}
