//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration structure.
///
/// ```yaml
/// plugins: [weft-plugin-dice, echo]
/// disable_plugins: [echo]
/// plugin_dirs: [./my-plugins]
/// logging:
///   level: debug
/// config:
///   weft-plugin-dice:
///     max_sides: 100
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// Plugin ids that stay mounted but never see messages.
    pub disable_plugins: Vec<String>,

    /// Plugin ids to mount at startup. Empty means every registered plugin.
    pub plugins: Vec<String>,

    /// Extra directories whose contents derive plugin ids relative to them.
    pub plugin_dirs: Vec<PathBuf>,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Per-plugin config sections, keyed by plugin id.
    #[serde(rename = "config")]
    pub plugin_config: Map<String, Value>,
}

impl HostConfig {
    /// Returns `true` if `id` is in `disable_plugins`.
    pub fn is_disabled(&self, id: &str) -> bool {
        self.disable_plugins.iter().any(|p| p == id)
    }

    /// Per-plugin sections in the shape the plugin manager takes.
    pub fn plugin_configs(&self) -> HashMap<String, Value> {
        self.plugin_config
            .iter()
            .map(|(id, value)| (id.clone(), value.clone()))
            .collect()
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line format of log records.
///
/// `Json` needs the `json-log` feature; without it, records use `Full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    Json,
}

/// Where log records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// File rotation schedule for [`LogOutput::File`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events produce log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level, overridden by `RUST_LOG` when set.
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub thread_ids: bool,
    /// Include file names and line numbers.
    pub file_location: bool,
    /// Log file for [`LogOutput::File`].
    pub file_path: Option<PathBuf>,
    pub rotation: LogRotation,
    /// Rotated files to keep. Zero keeps all.
    pub max_files: u32,
    pub span_events: SpanEventConfig,
    /// Per-target levels, e.g. `weft_framework: debug`.
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::Never,
            max_files: 5,
            span_events: SpanEventConfig::default(),
            filters: HashMap::new(),
        }
    }
}
