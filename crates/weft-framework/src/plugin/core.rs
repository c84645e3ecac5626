use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};
use weft_core::{
    BoxError, CommandAdd, CommandRemove, EventPayload, ListenerId, ServiceArc, ServiceRegistry,
};

use crate::command::{Command, CommandTree};
use crate::error::{CommandError, PluginError, PluginResult};
use crate::manager::{PluginManager, WeakManager};
use crate::middleware::{Middleware, MiddlewareChain, MiddlewareId, MiddlewareOptions, Stage};

use super::gate::{GateCallback, ServiceCallbackInfo, ServiceGate};
use super::id::InstallRoots;

/// Async function run on every mount, where a plugin registers its commands,
/// middlewares and services.
pub type SetupFn = Arc<dyn Fn(Plugin) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Cleanup callback run once on unmount.
pub type Disposer = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

type MountedCallback = GateCallback;

type BeforeUnmountFn = Arc<dyn Fn() + Send + Sync>;

/// Matching priority when none is given.
pub const DEFAULT_PRIORITY: i32 = 1;

// ─── PluginStatus ─────────────────────────────────────────────────────────────

/// Whether the host routes messages to a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginStatus {
    Enabled,
    Disabled,
}

impl PluginStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }

    /// Marker used in plugin listings.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Enabled => "✅",
            Self::Disabled => "❌",
        }
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Origin ───────────────────────────────────────────────────────────────────

/// Where a registration came from, which decides how it comes back on remount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Origin {
    /// Made outside the setup function. Recorded on the plugin and replayed
    /// on every mount.
    #[default]
    Declared,
    /// Made while the setup function (or a gate it registered) was running.
    /// Dropped on unmount; rerunning setup recreates it.
    Setup,
}

// ─── UnmountReport ────────────────────────────────────────────────────────────

/// What happened while a plugin was unmounted.
#[derive(Debug)]
pub struct UnmountReport {
    /// The id the plugin was mounted under.
    pub plugin: String,
    /// Number of disposers run, failed ones included.
    pub disposed: usize,
    /// Errors returned by failing disposers, in run order.
    pub failures: Vec<BoxError>,
}

impl UnmountReport {
    /// `true` if every disposer succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ─── PluginBuilder ────────────────────────────────────────────────────────────

/// Builder for [`Plugin`].
///
/// ```rust,ignore
/// let plugin = Plugin::builder()
///     .id("echo")
///     .desc("Repeats what you say")
///     .priority(5)
///     .setup(|plugin| async move {
///         plugin.command(Command::new("echo <text:text>")?.action(echo)).await?;
///         Ok(())
///     })
///     .build();
/// ```
#[derive(Default)]
pub struct PluginBuilder {
    id: Option<String>,
    name: Option<String>,
    desc: String,
    priority: Option<i32>,
    adapters: Vec<String>,
    setup: Option<SetupFn>,
}

impl PluginBuilder {
    /// Sets an explicit id. Without one the host allocates `anonymous_<n>`.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the id derived from the path the plugin was loaded from.
    pub fn path(self, path: impl AsRef<Path>, roots: &InstallRoots) -> Self {
        self.id(roots.derive(path))
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    /// Higher values match first.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Restricts the plugin to messages from `adapter`. May be repeated.
    pub fn adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapters.push(adapter.into());
        self
    }

    pub fn setup<F, Fut>(mut self, setup: F) -> Self
    where
        F: Fn(Plugin) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.setup = Some(Arc::new(move |plugin: Plugin| setup(plugin).boxed()));
        self
    }

    pub fn build(self) -> Plugin {
        Plugin {
            inner: Arc::new(PluginInner {
                id: self.id,
                name: self.name,
                desc: self.desc,
                priority: self.priority.unwrap_or(DEFAULT_PRIORITY),
                adapters: self.adapters,
                setup: self.setup,
                middlewares: MiddlewareChain::new(),
                declared: Mutex::new(Declarations::default()),
                state: Mutex::new(PluginState::default()),
            }),
        }
    }
}

// ─── Plugin ───────────────────────────────────────────────────────────────────

struct PluginInner {
    id: Option<String>,
    name: Option<String>,
    desc: String,
    priority: i32,
    adapters: Vec<String>,
    setup: Option<SetupFn>,
    middlewares: MiddlewareChain,
    /// Lock before `state` when both are needed.
    declared: Mutex<Declarations>,
    state: Mutex<PluginState>,
}

/// Registrations made outside the setup function, replayed on mount.
#[derive(Default)]
struct Declarations {
    commands: Vec<Arc<Command>>,
    services: Vec<(String, ServiceArc)>,
    middlewares: Vec<DeclaredMiddleware>,
}

#[derive(Clone)]
struct DeclaredMiddleware {
    id: MiddlewareId,
    handler: Arc<dyn Middleware>,
    options: MiddlewareOptions,
}

/// Mount-time state. Cleared on unmount except for declared gate entries and
/// `before_unmount` callbacks.
#[derive(Default)]
struct PluginState {
    host: Option<WeakManager>,
    origin: Origin,
    assigned_id: Option<String>,
    commands: CommandTree,
    services: Vec<(String, ServiceArc)>,
    pending_services: Vec<(String, ServiceArc)>,
    gate: ServiceGate,
    mounted_callbacks: Vec<MountedCallback>,
    before_unmount: Vec<(Origin, BeforeUnmountFn)>,
    disposers: Vec<Disposer>,
}

/// A unit of extension: commands, middlewares, services and listeners with
/// one mount lifecycle.
///
/// `Plugin` is a cheap handle; clones refer to the same plugin.
#[derive(Clone)]
pub struct Plugin {
    inner: Arc<PluginInner>,
}

impl Plugin {
    pub fn builder() -> PluginBuilder {
        PluginBuilder::default()
    }

    /// A bare plugin with an explicit id.
    pub fn new(id: impl Into<String>) -> Self {
        Self::builder().id(id).build()
    }

    /// A bare plugin whose id is allocated on mount.
    pub fn anonymous() -> Self {
        Self::builder().build()
    }

    /// A builder whose id is derived from `path`.
    pub fn from_path(path: impl AsRef<Path>, roots: &InstallRoots) -> PluginBuilder {
        Self::builder().path(path, roots)
    }

    // ─── Identity & metadata ─────────────────────────────────────────────────

    /// The explicit id, or the id allocated by the host while mounted.
    pub fn id(&self) -> Option<String> {
        self.inner
            .id
            .clone()
            .or_else(|| self.inner.state.lock().assigned_id.clone())
    }

    pub(crate) fn declared_id(&self) -> Option<&str> {
        self.inner.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Name, else id, else `<anonymous>`.
    pub fn display_name(&self) -> String {
        self.name()
            .map(str::to_string)
            .or_else(|| self.id())
            .unwrap_or_else(|| "<anonymous>".to_string())
    }

    pub fn desc(&self) -> &str {
        &self.inner.desc
    }

    pub fn priority(&self) -> i32 {
        self.inner.priority
    }

    /// Adapter allow-list. Empty means every adapter.
    pub fn adapters(&self) -> &[String] {
        &self.inner.adapters
    }

    pub fn supports_adapter(&self, adapter: &str) -> bool {
        self.inner.adapters.is_empty() || self.inner.adapters.iter().any(|a| a == adapter)
    }

    /// `true` if both handles refer to the same plugin.
    pub fn ptr_eq(&self, other: &Plugin) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    pub fn host(&self) -> Option<PluginManager> {
        self.inner
            .state
            .lock()
            .host
            .as_ref()
            .and_then(WeakManager::upgrade)
    }

    pub fn is_mounted(&self) -> bool {
        self.host().is_some()
    }

    /// Enabled while mounted and not listed in the host's disabled set.
    pub fn status(&self) -> PluginStatus {
        match (self.host(), self.id()) {
            (Some(host), Some(id)) if !host.is_disabled(&id) => PluginStatus::Enabled,
            _ => PluginStatus::Disabled,
        }
    }

    pub fn status_text(&self) -> &'static str {
        self.status().symbol()
    }

    /// Deserializes this plugin's config section.
    ///
    /// Falls back to an empty object when unmounted or when the host has no
    /// section for the plugin; use `#[serde(default)]` to make fields optional.
    pub fn config<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        let value = match (self.host(), self.id()) {
            (Some(host), Some(id)) => host.plugin_config(&id),
            _ => serde_json::Value::Object(serde_json::Map::new()),
        };
        T::deserialize(value)
    }

    /// Mounts onto `host`. See [`PluginManager::mount`].
    pub async fn mount(&self, host: &PluginManager) -> PluginResult<()> {
        host.mount(self).await
    }

    /// Unmounts from the current host.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotMounted`] if the plugin is not mounted.
    pub async fn unmount(&self) -> PluginResult<UnmountReport> {
        match self.host() {
            Some(host) => host.unmount(self).await,
            None => Err(PluginError::NotMounted {
                id: self.display_name(),
            }),
        }
    }

    /// Runs `callback` now if mounted, otherwise on the next mount.
    ///
    /// Each callback runs at most once. Errors are logged.
    pub async fn on_mounted<F, Fut>(&self, callback: F)
    where
        F: FnOnce(PluginManager) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let callback: MountedCallback = Box::new(move |host: PluginManager| callback(host).boxed());
        let host = {
            let mut state = self.inner.state.lock();
            match state.host.as_ref().and_then(WeakManager::upgrade) {
                Some(host) => host,
                None => {
                    state.mounted_callbacks.push(callback);
                    return;
                }
            }
        };
        if let Err(e) = callback(host).await {
            error!(plugin = %self.display_name(), error = %e, "Mounted callback failed");
        }
    }

    /// Runs `callback` once, as soon as the plugin is mounted and every
    /// service in `services` is registered.
    ///
    /// Outside the setup function the registration survives unmounting, and
    /// what the callback registers is kept like any other declaration.
    pub async fn wait_for<I, S, F, Fut>(&self, services: I, callback: F)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(PluginManager) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let services: Vec<String> = services.into_iter().map(Into::into).collect();
        let callback: GateCallback = Box::new(move |host: PluginManager| callback(host).boxed());
        let host = {
            let mut state = self.inner.state.lock();
            let origin = state.origin;
            state.gate.push(ServiceCallbackInfo::new(services, callback, origin));
            state.host.as_ref().and_then(WeakManager::upgrade)
        };
        if let Some(host) = host {
            self.run_gates(&host).await;
        }
    }

    /// Union of every service named in a pending or fired `wait_for`.
    pub fn need_services(&self) -> Vec<String> {
        self.inner.state.lock().gate.need_services()
    }

    /// Runs `callback` every time the host announces this plugin's unmount.
    pub fn before_unmount<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock();
        let origin = state.origin;
        state.before_unmount.push((origin, Arc::new(callback)));
    }

    /// Registers a cleanup callback.
    pub fn on_dispose<F>(&self, dispose: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.push_disposer(Box::new(move || {
            dispose();
            futures::future::ready(Ok::<(), BoxError>(())).boxed()
        }));
    }

    /// Registers an async, fallible cleanup callback.
    pub fn on_dispose_async<F, Fut>(&self, dispose: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.push_disposer(Box::new(move || dispose().boxed()));
    }

    fn push_disposer(&self, disposer: Disposer) {
        self.inner.state.lock().disposers.push(disposer);
    }

    // ─── Commands ────────────────────────────────────────────────────────────

    /// Registers a command, linking it under its longest registered prefix.
    ///
    /// # Errors
    ///
    /// [`CommandError::Duplicate`] if the plugin already owns the name.
    pub async fn command(&self, command: Command) -> Result<Arc<Command>, CommandError> {
        let command = {
            let mut declared = self.inner.declared.lock();
            let mut state = self.inner.state.lock();
            let command = state.commands.insert(command)?;
            if state.origin == Origin::Declared {
                declared.commands.push(Arc::clone(&command));
            }
            command
        };
        self.announce_command(&command).await;
        Ok(command)
    }

    /// Publishes `command-add` and pairs the command with a disposer.
    async fn announce_command(&self, command: &Arc<Command>) {
        let name = command.name().to_string();
        let weak = Arc::downgrade(&self.inner);
        self.on_dispose_async(move || async move {
            if let Some(plugin) = Plugin::upgrade(&weak) {
                plugin.detach_command(&name).await;
            }
            Ok(())
        });

        if let Some(host) = self.host() {
            let plugin = self.id().unwrap_or_default();
            debug!(plugin = %plugin, command = %command.name(), "Command registered");
            host.events()
                .publish(CommandAdd {
                    plugin,
                    command: command.name().to_string(),
                })
                .await;
        }
    }

    /// Removes a command for good. Its children become roots.
    pub async fn remove_command(&self, name: &str) -> Option<Arc<Command>> {
        self.inner
            .declared
            .lock()
            .commands
            .retain(|c| c.name() != name);
        self.detach_command(name).await
    }

    /// Takes a command out of the live tree, keeping its declaration.
    async fn detach_command(&self, name: &str) -> Option<Arc<Command>> {
        let (removed, host) = {
            let mut state = self.inner.state.lock();
            let removed = state.commands.remove(name)?;
            (removed, state.host.as_ref().and_then(WeakManager::upgrade))
        };
        if let Some(host) = host {
            host.events()
                .publish(CommandRemove {
                    plugin: self.id().unwrap_or_default(),
                    command: removed.name().to_string(),
                })
                .await;
        }
        Some(removed)
    }

    /// Every command the plugin owns, parents before children.
    pub fn command_list(&self) -> Vec<Arc<Command>> {
        self.inner.state.lock().commands.flatten()
    }

    /// Commands shown in help listings.
    pub fn visible_commands(&self) -> Vec<Arc<Command>> {
        self.inner.state.lock().commands.list_visible()
    }

    pub fn find_command(&self, name: &str) -> Option<Arc<Command>> {
        self.inner.state.lock().commands.find_by_name(name)
    }

    /// Runs `f` with read access to the command tree.
    pub fn with_commands<R>(&self, f: impl FnOnce(&CommandTree) -> R) -> R {
        f(&self.inner.state.lock().commands)
    }

    // ─── Middlewares ─────────────────────────────────────────────────────────

    /// Adds a middleware. It leaves the chain on unmount and, unless added by
    /// the setup function, comes back under the same id on the next mount.
    pub fn middleware<M: Middleware>(&self, middleware: M, options: MiddlewareOptions) -> MiddlewareId {
        let entry = DeclaredMiddleware {
            id: MiddlewareId::next(),
            handler: Arc::new(middleware),
            options,
        };
        let id = entry.id;
        {
            let mut declared = self.inner.declared.lock();
            if self.inner.state.lock().origin == Origin::Declared {
                declared.middlewares.push(entry.clone());
            }
        }
        self.attach_middleware(entry);
        id
    }

    fn attach_middleware(&self, entry: DeclaredMiddleware) {
        let id = entry.id;
        self.inner
            .middlewares
            .add_with_id(id, entry.handler, entry.options);
        let weak = Arc::downgrade(&self.inner);
        self.on_dispose(move || {
            if let Some(inner) = weak.upgrade() {
                inner.middlewares.remove(id);
            }
        });
    }

    /// Removes a middleware for good. Safe to call from inside the middleware
    /// itself.
    pub fn remove_middleware(&self, id: MiddlewareId) -> bool {
        self.inner
            .declared
            .lock()
            .middlewares
            .retain(|m| m.id != id);
        self.inner.middlewares.remove(id)
    }

    pub fn middleware_count(&self) -> usize {
        self.inner.middlewares.len()
    }

    pub(crate) fn middleware_snapshot(&self) -> Arc<[Stage]> {
        self.inner.middlewares.snapshot()
    }

    // ─── Services ────────────────────────────────────────────────────────────

    /// Contributes a service to the host registry.
    ///
    /// Registered immediately when mounted, otherwise on the next mount.
    /// Removed from the registry on unmount unless someone replaced it.
    pub async fn service(&self, name: impl Into<String>, service: ServiceArc) {
        let name = name.into();
        let host = {
            let mut declared = self.inner.declared.lock();
            let mut state = self.inner.state.lock();
            if state.origin == Origin::Declared {
                declared.services.retain(|(n, _)| *n != name);
                declared.services.push((name.clone(), Arc::clone(&service)));
            }
            state.services.retain(|(n, _)| *n != name);
            state.services.push((name.clone(), Arc::clone(&service)));
            match state.host.as_ref().and_then(WeakManager::upgrade) {
                Some(host) => host,
                None => {
                    state.pending_services.push((name, service));
                    return;
                }
            }
        };
        self.contribute_service(&host, name, service).await;
    }

    /// Typed [`service`](Self::service).
    pub async fn provide<T: std::any::Any + Send + Sync>(&self, name: impl Into<String>, service: Arc<T>) {
        self.service(name, service).await;
    }

    /// Names of the services this plugin contributes.
    pub fn service_names(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .services
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    async fn contribute_service(&self, host: &PluginManager, name: String, service: ServiceArc) {
        let registry = host.services().clone();
        let key = name.clone();
        let ours = Arc::clone(&service);
        self.on_dispose(move || remove_if_same(&registry, &key, &ours));
        host.register_service(name, service).await;
    }

    // ─── Events ──────────────────────────────────────────────────────────────

    /// Subscribes to a host event until unmount.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotMounted`] if there is no host to subscribe to.
    pub fn on<E, F, Fut>(&self, listener: F) -> PluginResult<ListenerId>
    where
        E: EventPayload,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let host = self.host().ok_or_else(|| PluginError::NotMounted {
            id: self.display_name(),
        })?;
        let events = host.events().clone();
        let id = events.subscribe(listener);
        self.on_dispose(move || {
            events.unsubscribe(id);
        });
        Ok(id)
    }

    // ─── Host-side hooks ─────────────────────────────────────────────────────

    fn upgrade(weak: &Weak<PluginInner>) -> Option<Plugin> {
        weak.upgrade().map(|inner| Plugin { inner })
    }

    pub(crate) fn setup_fn(&self) -> Option<SetupFn> {
        self.inner.setup.clone()
    }

    /// Awaits `fut` with registrations attributed to `origin`.
    pub(crate) async fn with_origin<F: Future>(&self, origin: Origin, fut: F) -> F::Output {
        let previous = std::mem::replace(&mut self.inner.state.lock().origin, origin);
        let output = fut.await;
        self.inner.state.lock().origin = previous;
        output
    }

    /// Puts back every declared command, middleware and service that an
    /// unmount took away.
    pub(crate) async fn restore_declared(&self) {
        let mut skipped = Vec::new();
        let (commands, middlewares) = {
            let declared = self.inner.declared.lock();
            let mut state = self.inner.state.lock();

            for (name, service) in &declared.services {
                if !state.services.iter().any(|(n, _)| n == name) {
                    state.services.push((name.clone(), Arc::clone(service)));
                    state.pending_services.push((name.clone(), Arc::clone(service)));
                }
            }

            let mut commands = Vec::new();
            for command in &declared.commands {
                if state.commands.get(command.name()).is_some() {
                    continue;
                }
                match state.commands.insert_shared(Arc::clone(command)) {
                    Ok(command) => commands.push(command),
                    Err(e) => skipped.push(e),
                }
            }

            let middlewares: Vec<DeclaredMiddleware> = declared
                .middlewares
                .iter()
                .filter(|m| !self.inner.middlewares.contains(m.id))
                .cloned()
                .collect();
            (commands, middlewares)
        };

        for e in skipped {
            warn!(plugin = %self.display_name(), error = %e, "Declared command not restored");
        }
        for entry in middlewares {
            self.attach_middleware(entry);
        }
        for command in &commands {
            self.announce_command(command).await;
        }
    }

    pub(crate) fn attach(&self, host: WeakManager, id: &str) {
        let mut state = self.inner.state.lock();
        state.host = Some(host);
        if self.inner.id.is_none() {
            state.assigned_id = Some(id.to_string());
        }
    }

    /// Registers services contributed while unmounted.
    pub(crate) async fn contribute_pending(&self, host: &PluginManager) {
        let pending = std::mem::take(&mut self.inner.state.lock().pending_services);
        for (name, service) in pending {
            self.contribute_service(host, name, service).await;
        }
    }

    /// Drains and runs queued `on_mounted` callbacks.
    pub(crate) async fn run_mounted_callbacks(&self, host: &PluginManager) {
        let callbacks = std::mem::take(&mut self.inner.state.lock().mounted_callbacks);
        for callback in callbacks {
            if let Err(e) = callback(host.clone()).await {
                error!(plugin = %self.display_name(), error = %e, "Mounted callback failed");
            }
        }
    }

    /// Fires every gate entry whose services now exist.
    pub(crate) async fn run_gates(&self, host: &PluginManager) {
        let ready = {
            let mut state = self.inner.state.lock();
            if state.host.is_none() {
                return;
            }
            state.gate.ready(host.services())
        };
        for (origin, callback) in ready {
            let host = host.clone();
            if let Err(e) = self.with_origin(origin, async move { callback(host).await }).await {
                error!(plugin = %self.display_name(), error = %e, "Service callback failed");
            }
        }
    }

    /// Number of `wait_for` callbacks that have not fired yet.
    pub fn pending_gates(&self) -> usize {
        self.inner.state.lock().gate.pending()
    }

    pub(crate) fn run_before_unmount(&self) {
        let callbacks: Vec<BeforeUnmountFn> = self
            .inner
            .state
            .lock()
            .before_unmount
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in &callbacks {
            callback();
        }
    }

    pub(crate) fn take_disposers(&self) -> Vec<Disposer> {
        std::mem::take(&mut self.inner.state.lock().disposers)
    }

    /// Drops the host reference and everything registered while mounted.
    /// Declarations stay for the next mount.
    pub(crate) fn reset(&self) {
        let old = {
            let mut state = self.inner.state.lock();
            let gate = state.gate.take_declared();
            let before_unmount = std::mem::take(&mut state.before_unmount)
                .into_iter()
                .filter(|(origin, _)| *origin == Origin::Declared)
                .collect();
            std::mem::replace(
                &mut *state,
                PluginState {
                    gate,
                    before_unmount,
                    ..PluginState::default()
                },
            )
        };
        self.inner.middlewares.clear();
        drop(old);
    }
}

fn remove_if_same(
    registry: &ServiceRegistry,
    name: &str,
    ours: &ServiceArc,
) {
    if registry
        .get_raw(name)
        .is_some_and(|current| Arc::ptr_eq(&current, ours))
    {
        registry.remove(name);
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.id())
            .field("name", &self.inner.name)
            .field("priority", &self.inner.priority)
            .field("adapters", &self.inner.adapters)
            .field("mounted", &self.is_mounted())
            .finish_non_exhaustive()
    }
}
