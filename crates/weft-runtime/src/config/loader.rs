//! Configuration loader using figment.
//!
//! Supported sources:
//!
//! - **Files**: TOML, YAML and JSON, chosen by extension
//! - **Environment variables**: `WEFT_*`, with `__` separating nested keys
//! - **Programmatic merges**: a [`HostConfig`] layered over the defaults
//! - **Profiles**: `weft.{profile}.toml` next to `weft.toml`
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: `weft.toml`, `config.toml`
//! - `yaml-config` *(default)*: `weft.yaml`, `weft.yml`, `config.yaml`, `config.yml`
//!
//! JSON files (`weft.json`, `config.json`) are always recognized.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic merges
//! 3. Profile-specific config file
//! 4. Main config file
//! 5. Environment variables (`WEFT_*`)
//!
//! # Environment Variable Mapping
//!
//! - `WEFT_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `WEFT_DISABLE_PLUGINS=[echo,dice]` → `disable_plugins = ["echo", "dice"]`
//! - `WEFT_CONFIG__DICE__MAX_SIDES=20` → `config.dice.max_sides = 20`
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new().load()?;
//!
//! let (config, source) = ConfigLoader::new()
//!     .file("./config/weft.yaml")
//!     .without_env()
//!     .load_with_source()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::HostConfig;
use super::validation::validate_config;

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name; `prod` and `dev` are accepted shorthands.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `WEFT_PROFILE`, defaulting to Development.
    pub fn from_env() -> Self {
        std::env::var("WEFT_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Overrides the search when set.
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd)
        } else {
            self
        }
    }

    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.search_path(config_dir.join("weft"))
        } else {
            self
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: HostConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and validates the configuration.
    pub fn load(self) -> ConfigResult<HostConfig> {
        self.load_with_source().map(|(config, _)| config)
    }

    /// Loads the configuration together with the file it came from, if any.
    ///
    /// The path is what [`ConfigStore`](super::ConfigStore) saves back to.
    pub fn load_with_source(self) -> ConfigResult<(HostConfig, Option<PathBuf>)> {
        let profile = self.profile.clone();
        let (figment, source) = self.build_figment()?;

        let config: HostConfig = figment.extract().map_err(|e| {
            ConfigError::ParseError(format!("Failed to extract configuration: {e}"))
        })?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            plugins = config.plugins.len(),
            disabled = config.disable_plugins.len(),
            "Configuration loaded successfully"
        );

        Ok((config, source))
    }

    fn build_figment(mut self) -> ConfigResult<(Figment, Option<PathBuf>)> {
        let mut figment = Figment::from(Serialized::defaults(HostConfig::default()));

        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        let source;
        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
            source = Some(path);
        } else {
            let (f, found) = self.load_config_files(figment);
            figment = f;
            source = found;
        }

        if self.load_env {
            trace!("Loading environment variables with WEFT_ prefix");
            figment = figment.merge(Env::prefixed("WEFT_").ignore(&["profile"]).split("__"));
        }

        Ok((figment, source))
    }

    /// Merges a single config file into the figment, dispatching on file extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            "json" => Ok(figment.merge(Json::file(path))),
            _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if self.search_paths.is_empty() {
            let mut paths = Vec::new();
            if let Ok(cwd) = std::env::current_dir() {
                paths.push(cwd);
            }
            if let Some(config_dir) = dirs::config_dir() {
                paths.push(config_dir.join("weft"));
            }
            paths
        } else {
            self.search_paths.clone()
        }
    }

    /// Search logic for a single file format.
    ///
    /// Iterates `search_paths × base_names`, merging a profile-specific
    /// variant first, then the base file. Stops at the first base file found.
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, Option<PathBuf>)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };

                let profile_path =
                    search_path.join(format!("{stem}.{}.{ext}", self.profile.as_str()));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = search_path.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    figment = merge_fn(figment, &base_path);
                    return (figment, Some(base_path));
                }
            }
        }
        (figment, None)
    }

    /// Searches every enabled format; the first base file found becomes the
    /// source path.
    fn load_config_files(&self, mut figment: Figment) -> (Figment, Option<PathBuf>) {
        let search_paths = self.resolve_search_paths();
        let mut source: Option<PathBuf> = None;

        #[cfg(feature = "toml-config")]
        {
            let (f, found) = self.load_format_files(
                figment,
                &search_paths,
                &["weft.toml", "config.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            source = source.or(found);
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, found) = self.load_format_files(
                figment,
                &search_paths,
                &["weft.yaml", "weft.yml", "config.yaml", "config.yml"],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            source = source.or(found);
        }

        let (f, found) = self.load_format_files(
            figment,
            &search_paths,
            &["weft.json", "config.json"],
            |fig, path| fig.merge(Json::file(path)),
        );
        figment = f;
        source = source.or(found);

        if source.is_none() {
            warn!("No configuration file found, using defaults");
        }
        (figment, source)
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<HostConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from one file, with environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<HostConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================
