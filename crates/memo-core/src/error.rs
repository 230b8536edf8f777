//! Error types for memo-core

use thiserror::Error;

/// Result type alias using memo-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in memo-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Remote request failed in transport or returned an unsuccessful response
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote rejected the request because the session is missing or expired
    #[error("Authentication required")]
    AuthRequired,

    /// A value was too large to be written to the local store
    #[error("Storage quota exceeded for '{key}' ({size} bytes, limit {limit})")]
    QuotaExceeded {
        /// Store key that failed to persist
        key: String,
        /// Serialized size in bytes
        size: usize,
        /// Configured per-value limit in bytes
        limit: usize,
    },

    /// Stored or remote JSON could not be decoded
    #[error("Failed to parse {context}: {message}")]
    Parse {
        /// What was being parsed
        context: String,
        /// Decoder message
        message: String,
    },

    /// `SQLite` error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Note not found
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No remote provider is configured for the requested operation
    #[error("Sync unavailable: {0}")]
    SyncUnavailable(String),
}

impl Error {
    /// Build a parse error from any displayable decoder error.
    pub fn parse(context: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            message: error.to_string(),
        }
    }

    /// Whether the failure should simply be retried on the next scheduled cycle.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_transient() {
        assert!(Error::Network("timeout".to_string()).is_transient());
        assert!(!Error::AuthRequired.is_transient());
        assert!(!Error::parse("settings", "eof").is_transient());
    }

    #[test]
    fn quota_error_mentions_key() {
        let error = Error::QuotaExceeded {
            key: "settings.background".to_string(),
            size: 10,
            limit: 5,
        };
        assert!(error.to_string().contains("settings.background"));
    }
}
