//! Editable configuration with explicit persistence.
//!
//! Edits go through [`ConfigStore::set`] or [`ConfigStore::update`], which mark
//! the store dirty; [`ConfigStore::save`] writes the backing file once, in the
//! format its extension names.
//!
//! ```rust,ignore
//! let store = ConfigStore::load(ConfigLoader::new())?;
//! store.set("disable_plugins", ["echo"])?;
//! store.set("config.dice.max_sides", 20)?;
//! store.save()?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, trace};

use super::error::{ConfigError, ConfigResult};
use super::loader::ConfigLoader;
use super::schema::HostConfig;
use super::validation::validate_config;

struct StoreState {
    config: HostConfig,
    dirty: bool,
}

/// Shared, validated configuration with an optional backing file.
pub struct ConfigStore {
    state: RwLock<StoreState>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// Wraps `config`; `save` writes to `path` when one is given.
    pub fn new(config: HostConfig, path: Option<PathBuf>) -> Self {
        Self {
            state: RwLock::new(StoreState {
                config,
                dirty: false,
            }),
            path,
        }
    }

    /// A store that cannot be saved.
    pub fn in_memory(config: HostConfig) -> Self {
        Self::new(config, None)
    }

    /// Loads through `loader`, remembering the file the config came from.
    pub fn load(loader: ConfigLoader) -> ConfigResult<Self> {
        let (config, path) = loader.load_with_source()?;
        Ok(Self::new(config, path))
    }

    /// The backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// A snapshot of the current configuration.
    pub fn get(&self) -> HostConfig {
        self.state.read().config.clone()
    }

    /// Reads the configuration without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&HostConfig) -> R) -> R {
        f(&self.state.read().config)
    }

    /// Looks up a dotted path such as `logging.level` or `plugins.0`.
    ///
    /// Paths follow the serialized layout, so per-plugin sections live under
    /// `config.<plugin-id>`.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        let segments = split_path(path).ok()?;
        let root = serde_json::to_value(&self.state.read().config).ok()?;
        segments
            .iter()
            .try_fold(&root, |node, segment| match node {
                Value::Object(map) => map.get(*segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
            .cloned()
    }

    /// Writes `value` at a dotted path, creating missing tables on the way.
    ///
    /// The edited document must still deserialize and validate; otherwise
    /// the store is left untouched.
    pub fn set<V: Serialize>(&self, path: &str, value: V) -> ConfigResult<()> {
        let segments = split_path(path)?;
        let value = serde_json::to_value(value)
            .map_err(|e| ConfigError::invalid_path(path, e.to_string()))?;

        let mut state = self.state.write();
        let mut root =
            serde_json::to_value(&state.config).map_err(|e| ConfigError::serialize("json", e))?;
        set_value(&mut root, &segments, value)
            .map_err(|reason| ConfigError::invalid_path(path, reason))?;

        let config: HostConfig = serde_json::from_value(root)
            .map_err(|e| ConfigError::invalid_path(path, e.to_string()))?;
        validate_config(&config)?;

        debug!(path, "Configuration value set");
        state.config = config;
        state.dirty = true;
        Ok(())
    }

    /// Edits the configuration in place and marks the store dirty.
    pub fn update<R>(&self, f: impl FnOnce(&mut HostConfig) -> R) -> R {
        let mut state = self.state.write();
        let result = f(&mut state.config);
        state.dirty = true;
        result
    }

    /// `true` if there are edits not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    /// Writes pending edits to the backing file.
    ///
    /// Returns `Ok(false)` without touching the file when nothing changed.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NoBackingFile`] for in-memory stores with pending edits,
    /// serialization errors, and I/O errors.
    pub fn save(&self) -> ConfigResult<bool> {
        let mut state = self.state.write();
        if !state.dirty {
            trace!("Configuration unchanged, skipping save");
            return Ok(false);
        }
        let path = self.path.as_deref().ok_or(ConfigError::NoBackingFile)?;

        let text = render(&state.config, path)?;
        std::fs::write(path, text)?;
        state.dirty = false;

        info!(path = %path.display(), "Configuration saved");
        Ok(true)
    }
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("path", &self.path)
            .field("dirty", &self.is_dirty())
            .finish_non_exhaustive()
    }
}

fn split_path(path: &str) -> ConfigResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ConfigError::invalid_path(path, "empty path segment"));
    }
    Ok(segments)
}

fn set_value(node: &mut Value, segments: &[&str], value: Value) -> Result<(), String> {
    let Some((segment, rest)) = segments.split_first() else {
        *node = value;
        return Ok(());
    };

    let child = match node {
        Value::Object(map) => {
            if rest.is_empty() {
                map.insert((*segment).to_string(), value);
                return Ok(());
            }
            map.entry(*segment)
                .or_insert_with(|| Value::Object(Map::new()))
        }
        Value::Array(items) => {
            let index: usize = segment
                .parse()
                .map_err(|_| format!("'{segment}' is not a list index"))?;
            if rest.is_empty() && index == items.len() {
                items.push(value);
                return Ok(());
            }
            let len = items.len();
            items
                .get_mut(index)
                .ok_or_else(|| format!("index {index} out of range for list of {len}"))?
        }
        _ => return Err(format!("cannot descend into '{segment}' of a scalar value")),
    };
    set_value(child, rest, value)
}

fn render(config: &HostConfig, path: &Path) -> ConfigResult<String> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "json" => serde_json::to_string_pretty(config).map_err(|e| ConfigError::serialize("json", e)),
        "yaml" | "yml" => serde_yaml::to_string(config).map_err(|e| ConfigError::serialize("yaml", e)),
        "toml" => toml::to_string_pretty(config).map_err(|e| ConfigError::serialize("toml", e)),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}
