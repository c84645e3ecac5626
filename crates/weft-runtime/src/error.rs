//! Runtime error types.

use thiserror::Error;
use weft_framework::PluginError;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading, editing or saving configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Mounting or unmounting a plugin failed.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// No mounted plugin has the id.
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// Installing a shutdown signal handler failed.
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
