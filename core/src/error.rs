use std::path::PathBuf;

use thiserror::Error;

/// Layerforge error types
#[derive(Error, Debug)]
pub enum ForgeError {
    /// Requested target stage does not exist
    #[error("{name} is not a valid target build stage")]
    InvalidTarget { name: String },

    /// Dockerfile could not be parsed into stages
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// The build engine failed to produce an image
    #[error("Build failure: {0}")]
    BuildFailure(String),

    /// Writing config, manifest or a layer file failed
    #[error("Export failure: {} - {message}", path.display())]
    ExportFailure { path: PathBuf, message: String },

    /// A single entry failed during tree materialization
    #[error("Copy failure: {} - {message}", path.display())]
    CopyFailure { path: PathBuf, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ForgeError {
    /// Build an `ExportFailure` for `path`.
    pub fn export(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        ForgeError::ExportFailure {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Build a `CopyFailure` for `path`.
    pub fn copy(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        ForgeError::CopyFailure {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(err: serde_json::Error) -> Self {
        ForgeError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ForgeError {
    fn from(err: serde_yaml::Error) -> Self {
        ForgeError::SerializationError(err.to_string())
    }
}

/// Result type alias for Layerforge operations
pub type Result<T> = std::result::Result<T, ForgeError>;
