//! Error types for the hub client.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    // Network and transfer errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Bad status {status} for {url}")]
    BadStatus { status: u16, url: String },

    #[error("Transfer stalled for more than {threshold:?}")]
    Stalled { threshold: Duration },

    #[error("Download size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    // Metadata and repository errors
    #[error("Metadata resolution failed for {filename}: {message}")]
    Metadata { filename: String, message: String },

    #[error("Repository info request failed: {message}")]
    RepoInfo { message: String },

    #[error("Invalid large-file pointer: {message}")]
    InvalidPointer { message: String },

    // Cache and local errors
    #[error("Not in cache and downloads are disabled: {message}")]
    OfflineNotCached { message: String },

    #[error("Unsupported repo type: {0}")]
    UnsupportedRepoType(String),

    #[error("Another process is downloading blob {etag}")]
    LockBusy { etag: String },

    #[error("Failed to create symlink from {src} to {dest}: {reason}")]
    SymlinkFailed {
        src: PathBuf,
        dest: PathBuf,
        reason: String,
    },

    // Pipeline selector errors
    #[error("No compatible model format found: {message}")]
    NoCompatibleFormat { message: String },

    #[error("No weight files found in {format} format for components {components:?}")]
    MissingWeights {
        format: String,
        components: Vec<String>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        HubError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        HubError::Network {
            message: err.to_string(),
            cause: std::error::Error::source(&err).map(|s| s.to_string()),
        }
    }
}

impl HubError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        HubError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HubError::UnsupportedRepoType("weights".into());
        assert_eq!(err.to_string(), "Unsupported repo type: weights");

        let err = HubError::SizeMismatch {
            expected: 12,
            actual: 5,
        };
        assert_eq!(
            err.to_string(),
            "Download size mismatch: expected 12, got 5"
        );
    }
}
