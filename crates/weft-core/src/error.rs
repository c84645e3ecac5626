//! Error types shared by every Weft layer.
//!
//! Framework-level errors (command declaration, plugin lifecycle, dispatch)
//! are defined in `weft-framework`.

use thiserror::Error;

/// Boxed error produced by user-supplied code (actions, middlewares,
/// disposers, service-gate callbacks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Service Errors
// =============================================================================

/// Errors returned by typed [`ServiceRegistry`](crate::ServiceRegistry) lookups.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// No implementation is registered under the name.
    #[error("service '{name}' is not registered")]
    NotFound {
        /// The requested capability name.
        name: String,
    },

    /// An implementation exists but has a different concrete type.
    #[error("service '{name}' is not a `{expected}`")]
    TypeMismatch {
        /// The requested capability name.
        name: String,
        /// The type the caller asked for.
        expected: &'static str,
    },
}

// =============================================================================
// Message Errors
// =============================================================================

/// Returned when parsing a [`MessageScope`](crate::MessageScope) from text fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown message scope '{0}'")]
pub struct UnknownScope(pub String);

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for service lookups.
pub type ServiceResult<T> = Result<T, ServiceError>;
