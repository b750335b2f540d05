//! Error types for Policy Pro.
//!
//! One enum covers the whole workspace. The first four variants are the
//! failure taxonomy of the assistant itself; the rest are ambient errors
//! (filesystem, templates, serialization) that surface while loading
//! configuration or prompts.

use thiserror::Error;

/// Unified error type for Policy Pro.
///
/// All fallible functions return `AppResult<T>`. Nothing panics on bad input
/// or a misbehaving upstream service; errors are represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// A required setup value is missing or invalid. Fatal at construction.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The persisted vector index is missing or cannot be opened. Fatal at
    /// construction.
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// An external service (completion, embeddings, index query, web search)
    /// failed, timed out, or returned unusable output. Fails the current turn
    /// only.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The completion service asked for the web search tool without an
    /// explicit request from the user, or more than once in a turn.
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Prompt loading and rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Whether this error must stop the program rather than a single turn.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config(_) | AppError::IndexUnavailable(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AppError::Config("missing key".into()).is_fatal());
        assert!(AppError::IndexUnavailable("no table".into()).is_fatal());
        assert!(!AppError::Upstream("timeout".into()).is_fatal());
        assert!(!AppError::PolicyViolation("web search".into()).is_fatal());
    }

    #[test]
    fn test_display_names_the_category() {
        let err = AppError::Upstream("HTTP 500".to_string());
        assert_eq!(err.to_string(), "Upstream error: HTTP 500");
    }
}
