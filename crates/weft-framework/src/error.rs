//! Error types for the Weft framework.
//!
//! Non-matches (unknown command, failed permission, wrong scope) are not
//! errors anywhere in this crate; they surface as `None`.

use thiserror::Error;
use weft_core::BoxError;

/// Command declaration errors, raised when a command is built or registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The name was empty or made only of dots.
    #[error("command name cannot be empty or consist of dots only")]
    EmptyName,

    /// A positional placeholder could not be parsed.
    #[error("invalid argument declaration '{token}': {reason}")]
    InvalidArgument {
        /// The offending placeholder.
        token: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A placeholder named a type that does not exist.
    #[error("unknown argument type '{0}'")]
    UnknownType(String),

    /// An option spec could not be parsed.
    #[error("invalid option '{spec}': {reason}")]
    InvalidOption {
        /// The offending spec.
        spec: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A shortcut pattern is not a valid regular expression.
    #[error("invalid shortcut pattern: {0}")]
    InvalidShortcut(String),

    /// The plugin already owns a command with this name.
    #[error("command '{0}' is already registered")]
    Duplicate(String),
}

/// Plugin lifecycle errors.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The operation needs a mounted plugin.
    #[error("plugin '{id}' is not mounted")]
    NotMounted {
        /// The plugin id, or `<anonymous>`.
        id: String,
    },

    /// The plugin is mounted to a different host.
    #[error("plugin '{id}' is already mounted to another host")]
    MountedElsewhere {
        /// The plugin id.
        id: String,
    },

    /// Another plugin already resolved to the same id.
    #[error("plugin id '{id}' is already used by another plugin")]
    IdConflict {
        /// The contested id.
        id: String,
    },

    /// The plugin's setup function failed.
    #[error("setup of plugin '{id}' failed: {source}")]
    Setup {
        /// The plugin id.
        id: String,
        /// The error returned by the setup function.
        #[source]
        source: BoxError,
    },
}

/// Failures raised while dispatching a message.
///
/// These come from user code and are propagated to the dispatch caller.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A command action failed.
    #[error("action of command '{command}' failed: {source}")]
    Action {
        /// The command whose action failed.
        command: String,
        /// The action's error.
        #[source]
        source: BoxError,
    },

    /// A middleware failed.
    #[error("middleware failed: {0}")]
    Middleware(#[source] BoxError),
}

impl DispatchError {
    /// Recovers a `DispatchError` that travelled through the middleware chain
    /// as a [`BoxError`], or wraps a foreign error as a middleware failure.
    pub(crate) fn from_chain(err: BoxError) -> Self {
        match err.downcast::<DispatchError>() {
            Ok(dispatch) => *dispatch,
            Err(other) => DispatchError::Middleware(other),
        }
    }
}

/// Result type for plugin lifecycle operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Result type for dispatch.
pub type DispatchResult<T> = Result<T, DispatchError>;
