//! Error types for Vellum core operations.

use thiserror::Error;

/// Core error type for session, version, and JSON handling.
#[derive(Error, Debug)]
pub enum Error {
    /// A version string failed to parse.
    #[error("invalid semantic version '{input}': {reason}")]
    InvalidVersion {
        /// The offending input, trimmed.
        input: String,
        /// What went wrong.
        reason: String,
    },

    /// A pattern string failed to parse.
    #[error("invalid semantic pattern '{input}': {reason}")]
    InvalidPattern {
        /// The offending input, trimmed.
        input: String,
        /// What went wrong.
        reason: String,
    },

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a version parse error.
    #[must_use]
    pub fn version(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidVersion {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a pattern parse error.
    #[must_use]
    pub fn pattern(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for Vellum core operations.
pub type Result<T> = std::result::Result<T, Error>;
