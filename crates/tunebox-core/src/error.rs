//! Error types for the tunebox catalog.
//!
//! Only filesystem access failures and bad configuration are errors. Names that
//! do not follow any known convention are skipped by the builder and never show
//! up here.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the tunebox library.
#[derive(Debug, Error)]
pub enum TuneboxError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Directory not found: {0}")]
    NotFound(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to link {src} to {dest}: {reason}")]
    LinkFailed {
        src: PathBuf,
        dest: PathBuf,
        reason: String,
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

    // Catalog lookups
    #[error("Image not found: {path}")]
    ImageNotFound { path: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for tunebox operations.
pub type Result<T> = std::result::Result<T, TuneboxError>;

impl From<std::io::Error> for TuneboxError {
    fn from(err: std::io::Error) -> Self {
        TuneboxError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for TuneboxError {
    fn from(err: serde_json::Error) -> Self {
        TuneboxError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<walkdir::Error> for TuneboxError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf());
        let message = err.to_string();
        TuneboxError::Io {
            message,
            path,
            source: err.into_io_error(),
        }
    }
}

impl TuneboxError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        TuneboxError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// True for errors caused by something that is not there, as opposed to
    /// something that could not be read.
    pub fn is_not_found(&self) -> bool {
        match self {
            TuneboxError::NotFound(_) | TuneboxError::ImageNotFound { .. } => true,
            TuneboxError::Io {
                source: Some(source),
                ..
            } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
