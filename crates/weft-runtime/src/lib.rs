//! Weft Runtime: the outer layer of the Weft plugin host.
//!
//! This crate provides:
//! - Configuration loading and editing (`ConfigLoader`, `ConfigStore`)
//! - Logging setup over `tracing-subscriber`
//! - Runtime orchestration (`WeftRuntime`) at the adapter boundary
//! - The built-in `manage` plugin (`help`, `status`, `plugin.*`)
//!
//! ```ignore
//! use weft_runtime::WeftRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = WeftRuntime::builder()
//!         .plugin(my_plugin())
//!         .build()?;
//!
//!     // Adapters call `runtime.handle_message(..)` for every inbound message.
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod builtin;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use builtin::{MANAGE_PLUGIN_ID, manage_plugin};
pub use config::{ConfigError, ConfigLoader, ConfigResult, ConfigStore, HostConfig, LoggingConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{NAMESPACE, RuntimeBuilder, WeftRuntime};

// Re-export tracing for use by plugin crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for plugin code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
