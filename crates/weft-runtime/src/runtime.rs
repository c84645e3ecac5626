//! Runtime orchestration.
//!
//! [`WeftRuntime`] owns the configuration store and the plugin host, keeps
//! the host's disabled set and plugin config sections in step with the store,
//! and is the boundary adapters talk to: they hand it messages and bot
//! readiness, and get replies back.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use weft_runtime::WeftRuntime;
//!
//! let runtime = WeftRuntime::builder()
//!     .config_file("config/weft.yaml")
//!     .plugin(dice_plugin())
//!     .build()?;
//!
//! runtime.start().await?;
//! let reply = runtime.handle_message(message).await;
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use weft_core::{BotReady, Message, Reply};
use weft_framework::{InstallRoots, Plugin, PluginManager};

use crate::builtin;
use crate::config::{ConfigLoader, ConfigResult, ConfigStore, HostConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Namespace used for package ids (`weft-plugin-*`, `weft-adapter-*`).
pub const NAMESPACE: &str = "weft";

/// The Weft runtime: configuration, plugin host and adapter boundary.
pub struct WeftRuntime {
    config: Arc<ConfigStore>,
    manager: PluginManager,
    /// Plugins offered to `start`; `plugins` in the config selects among them.
    catalog: Mutex<Vec<Plugin>>,
    builtin: Option<Plugin>,
    running: RwLock<bool>,
}

impl WeftRuntime {
    /// Creates a runtime from the config file in the current directory.
    ///
    /// Falls back to defaults when no file is found or it fails to load.
    pub fn new() -> Self {
        match ConfigStore::load(ConfigLoader::new().with_current_dir()) {
            Ok(store) => Self::from_store(store),
            Err(e) => {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                Self::from_config(HostConfig::default())
            }
        }
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime around an in-memory configuration.
    pub fn from_config(config: HostConfig) -> Self {
        Self::from_store(ConfigStore::in_memory(config))
    }

    /// Creates a runtime around a loaded store, with the built-in `manage`
    /// plugin.
    pub fn from_store(store: ConfigStore) -> Self {
        Self::assemble(store, true)
    }

    fn assemble(store: ConfigStore, with_builtin: bool) -> Self {
        let logging_config = store.read(|c| c.logging.clone());
        logging::init_from_config(&logging_config);

        let config = Arc::new(store);
        let manager = PluginManager::new();
        let builtin =
            with_builtin.then(|| builtin::manage_plugin(Arc::clone(&config), Instant::now()));

        let runtime = Self {
            config,
            manager,
            catalog: Mutex::new(Vec::new()),
            builtin,
            running: RwLock::new(false),
        };
        runtime.sync_config();

        info!(
            log_level = %logging_config.level,
            config = ?runtime.config.path(),
            "Runtime initialized from configuration"
        );
        runtime
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    /// Install roots for deriving plugin ids from paths, anchored at the
    /// config file's directory and extended with `plugin_dirs`.
    pub fn install_roots(&self) -> InstallRoots {
        let work_dir = self
            .config
            .path()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let dirs = self.config.read(|c| c.plugin_dirs.clone());
        InstallRoots::new(&work_dir, NAMESPACE).plugin_dirs(dirs.iter().map(|d| work_dir.join(d)))
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Pushes `disable_plugins` and the per-plugin sections into the host.
    pub fn sync_config(&self) {
        let (disabled, sections) = self
            .config
            .read(|c| (c.disable_plugins.clone(), c.plugin_configs()));
        debug!(disabled = disabled.len(), sections = sections.len(), "Syncing config into host");
        self.manager.set_disabled_plugins(disabled);
        self.manager.set_plugin_configs(sections);
    }

    /// Sets a config value and re-syncs the host. Not saved until
    /// [`save_config`](Self::save_config).
    pub fn set_config<V: Serialize>(&self, path: &str, value: V) -> RuntimeResult<()> {
        self.config.set(path, value)?;
        self.sync_config();
        Ok(())
    }

    /// Writes pending config edits to the backing file.
    pub fn save_config(&self) -> RuntimeResult<bool> {
        Ok(self.config.save()?)
    }

    /// Removes a mounted plugin from `disable_plugins` and saves.
    ///
    /// Returns `false` if it was already enabled.
    pub fn enable_plugin(&self, id: &str) -> RuntimeResult<bool> {
        self.toggle(id, true)
    }

    /// Adds a mounted plugin to `disable_plugins` and saves.
    ///
    /// Returns `false` if it was already disabled.
    pub fn disable_plugin(&self, id: &str) -> RuntimeResult<bool> {
        self.toggle(id, false)
    }

    fn toggle(&self, id: &str, enabled: bool) -> RuntimeResult<bool> {
        if self.manager.plugin(id).is_none() {
            return Err(RuntimeError::PluginNotFound(id.to_string()));
        }
        Ok(set_plugin_enabled(&self.config, &self.manager, id, enabled)?)
    }

    // =========================================================================
    // Plugins
    // =========================================================================

    /// Offers a plugin to [`start`](Self::start).
    pub fn register_plugin(&self, plugin: Plugin) {
        self.catalog.lock().push(plugin);
    }

    /// Mounts a plugin right away, bypassing the `plugins` selection.
    pub async fn mount(&self, plugin: &Plugin) -> RuntimeResult<()> {
        self.manager.mount(plugin).await?;
        Ok(())
    }

    /// The built-in `manage` plugin, if the runtime carries one.
    pub fn builtin(&self) -> Option<&Plugin> {
        self.builtin.as_ref()
    }

    /// Mounts the built-in plugin and the registered plugins the config
    /// selects. An empty `plugins` list selects all of them.
    async fn mount_plugins(&self) {
        if let Some(builtin) = &self.builtin
            && let Err(e) = self.manager.mount(builtin).await
        {
            error!(error = %e, "Failed to mount built-in plugin");
        }

        let wanted = self.config.read(|c| c.plugins.clone());
        let catalog = self.catalog.lock().clone();

        for plugin in &catalog {
            let selected = wanted.is_empty()
                || plugin.id().is_some_and(|id| wanted.iter().any(|w| *w == id));
            if !selected {
                debug!(plugin = %plugin.display_name(), "Plugin not listed in config, skipping");
                continue;
            }
            if let Err(e) = self.manager.mount(plugin).await {
                error!(plugin = %plugin.display_name(), error = %e, "Failed to mount plugin");
            }
        }

        for id in &wanted {
            if self.manager.plugin(id).is_none() {
                warn!(plugin = %id, "Configured plugin is not registered");
            }
        }
    }

    // =========================================================================
    // Adapter boundary
    // =========================================================================

    /// Dispatches one inbound message and returns the reply to send, if any.
    ///
    /// Handler failures are logged here and produce no reply.
    pub async fn handle_message(&self, message: Message) -> Option<Reply> {
        match self.manager.receive(message).await {
            Ok(outcome) => outcome.into_reply(),
            Err(e) => {
                error!(error = %e, "Failed to handle message");
                None
            }
        }
    }

    /// Announces that an adapter finished connecting a bot account.
    pub async fn bot_ready(&self, adapter: impl Into<String>, bot: impl Into<String>) {
        let event = BotReady {
            adapter: adapter.into(),
            bot: bot.into(),
        };
        info!(adapter = %event.adapter, bot = %event.bot, "Bot ready");
        self.manager.events().publish(event).await;
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Mounts plugins and marks the runtime running.
    pub async fn start(&self) -> RuntimeResult<()> {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Runtime is already running");
                return Ok(());
            }
            *running = true;
        }

        info!("Starting Weft runtime");
        self.mount_plugins().await;
        info!(plugins = self.manager.plugin_count(), "Runtime started");
        Ok(())
    }

    /// Unmounts every plugin and flushes pending config edits.
    pub async fn stop(&self) -> RuntimeResult<()> {
        {
            let mut running = self.running.write().await;
            if !*running {
                warn!("Runtime is not running");
                return Ok(());
            }
            *running = false;
        }

        info!("Stopping Weft runtime");
        for report in self.manager.unmount_all().await {
            for failure in &report.failures {
                error!(plugin = %report.plugin, error = %failure, "Disposer failed during shutdown");
            }
        }

        if self.config.path().is_some()
            && let Err(e) = self.config.save()
        {
            error!(error = %e, "Failed to save configuration on shutdown");
        }

        info!("Runtime stopped");
        Ok(())
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Weft runtime is now running. Press Ctrl+C to stop.");

        let waited = wait_for_shutdown().await;
        self.stop().await?;
        waited
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }
}

impl Default for WeftRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WeftRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeftRuntime")
            .field("config", &self.config)
            .field("manager", &self.manager)
            .field("builtin", &self.builtin.is_some())
            .finish_non_exhaustive()
    }
}

/// Flips one id in `disable_plugins`, updates the host, and saves when the
/// store has a backing file. Returns `false` when nothing changed.
pub(crate) fn set_plugin_enabled(
    store: &ConfigStore,
    host: &PluginManager,
    id: &str,
    enabled: bool,
) -> ConfigResult<bool> {
    let mut disabled = store.read(|c| c.disable_plugins.clone());
    let listed = disabled.iter().any(|p| p == id);
    if enabled != listed {
        return Ok(false);
    }

    if enabled {
        disabled.retain(|p| p != id);
    } else {
        disabled.push(id.to_string());
    }
    store.set("disable_plugins", &disabled)?;
    host.set_disabled_plugins(disabled);
    if store.path().is_some() {
        store.save()?;
    }

    info!(plugin = %id, enabled, "Plugin status changed");
    Ok(true)
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RuntimeError::Signal)?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.map_err(RuntimeError::Signal)?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`WeftRuntime`] with custom configuration.
///
/// ```rust,ignore
/// let runtime = WeftRuntime::builder()
///     .config_file("config/weft.toml")
///     .profile("production")
///     .plugin(echo)
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    plugins: Vec<Plugin>,
    builtin: bool,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            plugins: Vec::new(),
            builtin: true,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: HostConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Registers a plugin for `start` to mount.
    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Leaves out the built-in `manage` plugin.
    pub fn without_builtin(mut self) -> Self {
        self.builtin = false;
        self
    }

    pub fn build(self) -> ConfigResult<WeftRuntime> {
        let store = ConfigStore::load(self.config_loader)?;
        let runtime = WeftRuntime::assemble(store, self.builtin);
        for plugin in self.plugins {
            runtime.register_plugin(plugin);
        }
        Ok(runtime)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::MessageScope;
    use weft_framework::{Command, CommandContext, PluginStatus};

    fn echo() -> Plugin {
        Plugin::builder()
            .id("echo")
            .setup(|plugin: Plugin| async move {
                plugin
                    .command(
                        Command::new("echo <text:text>")?
                            .action(|ctx: CommandContext| async move {
                                ctx.arg("text").and_then(|v| v.as_str()).map(str::to_string)
                            }),
                    )
                    .await?;
                Ok::<(), weft_core::BoxError>(())
            })
            .build()
    }

    fn message(text: &str) -> Message {
        Message::new("qq", "bot", MessageScope::Group, text)
    }

    #[tokio::test]
    async fn test_start_mounts_selected_plugins() {
        let runtime = WeftRuntime::builder()
            .search_path(tempfile::tempdir().unwrap().path())
            .without_env()
            .without_builtin()
            .merge(HostConfig {
                plugins: vec!["echo".into()],
                ..Default::default()
            })
            .plugin(echo())
            .plugin(Plugin::new("unlisted"))
            .build()
            .unwrap();

        runtime.start().await.unwrap();
        assert!(runtime.is_running().await);
        assert_eq!(runtime.manager().plugin_ids(), vec!["echo"]);

        let reply = runtime.handle_message(message("echo hi there")).await;
        assert_eq!(reply, Some(Reply::text("hi there")));

        runtime.stop().await.unwrap();
        assert_eq!(runtime.manager().plugin_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_plugin_is_silent() {
        let runtime = WeftRuntime::from_config(HostConfig {
            disable_plugins: vec!["echo".into()],
            ..Default::default()
        });
        runtime.register_plugin(echo());
        runtime.start().await.unwrap();

        let echo = runtime.manager().plugin("echo").unwrap();
        assert_eq!(echo.status(), PluginStatus::Disabled);
        assert_eq!(runtime.handle_message(message("echo hi")).await, None);

        assert!(runtime.enable_plugin("echo").unwrap());
        assert!(!runtime.enable_plugin("echo").unwrap());
        assert_eq!(echo.status(), PluginStatus::Enabled);
        assert_eq!(
            runtime.handle_message(message("echo hi")).await,
            Some(Reply::text("hi"))
        );
        assert!(runtime.config().get().disable_plugins.is_empty());
    }

    #[tokio::test]
    async fn test_toggle_unknown_plugin() {
        let runtime = WeftRuntime::from_config(HostConfig::default());
        assert!(matches!(
            runtime.disable_plugin("ghost"),
            Err(RuntimeError::PluginNotFound(id)) if id == "ghost"
        ));
    }

    #[tokio::test]
    async fn test_set_config_reaches_plugins() {
        #[derive(serde::Deserialize, Default)]
        #[serde(default)]
        struct DiceConfig {
            max_sides: u32,
        }

        let runtime = WeftRuntime::from_config(HostConfig::default());
        let dice = Plugin::new("dice");
        runtime.mount(&dice).await.unwrap();
        assert_eq!(dice.config::<DiceConfig>().unwrap().max_sides, 0);

        runtime.set_config("config.dice.max_sides", 20).unwrap();
        assert_eq!(dice.config::<DiceConfig>().unwrap().max_sides, 20);
        assert!(runtime.config().is_dirty());
    }

    #[tokio::test]
    async fn test_handler_error_yields_no_reply() {
        let runtime = WeftRuntime::from_config(HostConfig::default());
        let plugin = Plugin::new("broken");
        runtime.mount(&plugin).await.unwrap();
        plugin
            .command(Command::new("boom").unwrap().action(|_ctx: CommandContext| async {
                Err::<(), weft_core::BoxError>("kaput".into())
            }))
            .await
            .unwrap();

        assert_eq!(runtime.handle_message(message("boom")).await, None);
    }

    #[tokio::test]
    async fn test_run_until_stops() {
        let runtime = WeftRuntime::from_config(HostConfig::default());
        runtime.run_until(async {}).await.unwrap();
        assert!(!runtime.is_running().await);
        assert!(runtime.builtin().is_some_and(|p| !p.is_mounted()));
    }

    #[tokio::test]
    async fn test_install_roots_use_plugin_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("weft.json"), r#"{"plugin_dirs": ["extra"]}"#).unwrap();
        let runtime = WeftRuntime::builder()
            .search_path(dir.path())
            .without_env()
            .build()
            .unwrap();

        let roots = runtime.install_roots();
        assert_eq!(roots.derive(dir.path().join("extra/dice/index.rs")), "dice");
        assert_eq!(roots.derive(dir.path().join("plugins/echo.rs")), "echo");
    }
}
