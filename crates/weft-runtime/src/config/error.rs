//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading, editing or saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found at the specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Failed to read or write the configuration file.
    #[error("Failed to access configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    /// The merged sources could not be extracted into a [`HostConfig`](super::HostConfig).
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// The file extension is not one of the enabled formats.
    #[error("Unsupported or disabled configuration file format: .{0}")]
    UnsupportedFormat(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {message}")]
    ValidationError { message: String },

    /// A dotted path could not be resolved or written.
    #[error("Invalid configuration path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Serializing the configuration for `save` failed.
    #[error("Failed to serialize configuration as {format}: {message}")]
    Serialize {
        format: &'static str,
        message: String,
    },

    /// `save` was called on a store that has no backing file.
    #[error("Configuration has no backing file to save to")]
    NoBackingFile,
}

impl ConfigError {
    /// Creates a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    /// Creates an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn serialize(format: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Serialize {
            format,
            message: err.to_string(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
