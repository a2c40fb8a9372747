//! Error types for Repodex.
//!
//! Library crates use [`RepodexError`] via `thiserror`.
//! The server binary wraps this with `color-eyre` at the top level and maps
//! the business-rule variants to HTTP status codes at the API boundary.

use std::path::PathBuf;

/// Top-level error type for all Repodex operations.
#[derive(Debug, thiserror::Error)]
pub enum RepodexError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Client input malformed or violating a business rule (bad URL shape,
    /// empty name, category depth overflow, missing required field).
    #[error("{message}")]
    Validation { message: String },

    /// Duplicate unique key, or deletion blocked by existing children/links.
    #[error("{message}")]
    Conflict { message: String },

    /// A referenced id does not exist.
    #[error("{message}")]
    NotFound { message: String },

    /// Missing, invalid, or expired admin credential.
    #[error("{message}")]
    Auth { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Network/HTTP error during a remote call.
    #[error("network error: {0}")]
    Network(String),

    /// LLM enrichment error (missing configuration or failed generation).
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RepodexError>;

impl RepodexError {
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

    /// Create a conflict error from any displayable message.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
        }
    }

    /// Create a not-found error from any displayable message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            message: msg.into(),
        }
    }

    /// Create an auth error from any displayable message.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = RepodexError::config("missing JWT secret");
        assert_eq!(err.to_string(), "config error: missing JWT secret");

        let err = RepodexError::validation("categories are limited to three levels");
        assert_eq!(err.to_string(), "categories are limited to three levels");

        let err = RepodexError::conflict("repository already exists");
        assert!(err.to_string().contains("already exists"));
    }
}
