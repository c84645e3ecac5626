//! Configuration for the Weft runtime.
//!
//! [`ConfigLoader`] merges files, environment variables and programmatic
//! overrides into a [`HostConfig`]; [`ConfigStore`] holds it at runtime and
//! writes edits back to the file it came from.

pub mod error;
pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    HostConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanEventConfig,
};
pub use store::ConfigStore;
pub use validation::validate_config;
