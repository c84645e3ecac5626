//! The plugin host.
//!
//! [`PluginManager`] owns everything plugins share:
//!
//! - the plugin map, keyed by id, with mount order kept for tie-breaks;
//! - the [`ServiceRegistry`] and the [`EventBus`];
//! - the [`PermissionGate`] consulted by commands and middlewares;
//! - a host-level [`MiddlewareChain`] that runs before any plugin's;
//! - the set of disabled plugin ids, pushed in from configuration.
//!
//! # Mounting
//!
//! ```text
//! mount(plugin)
//!   ├─ resolve id (explicit, or smallest free anonymous_<n>)
//!   ├─ reject if another plugin holds the id      ──► IdConflict
//!   ├─ attach back-reference
//!   ├─ run setup                                   ──► Setup (rolled back)
//!   ├─ register services contributed while unmounted
//!   ├─ run queued on_mounted callbacks
//!   ├─ evaluate service gates
//!   └─ publish plugin-mounted
//! ```
//!
//! Unmounting publishes `plugin-beforeUnmount`, runs the plugin's disposers
//! in registration order (a failing disposer is logged and the rest still
//! run), then clears the plugin back to its freshly built state.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use weft_core::{
    EventBus, Message, MessageReceived, PluginBeforeUnmount, PluginMounted, ServiceArc,
    ServiceRegister, ServiceRegistry, ServiceResult,
};

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::{DispatchResult, PluginError, PluginResult};
use crate::middleware::{Middleware, MiddlewareChain, MiddlewareId, MiddlewareOptions, Stage};
use crate::permission::{PermissionChecker, PermissionGate};
use crate::plugin::core::Origin;
use crate::plugin::{Plugin, PluginStatus, UnmountReport};

// =============================================================================
// PluginMap (internal)
// =============================================================================

struct PluginEntry {
    plugin: Plugin,
    seq: u64,
}

#[derive(Default)]
struct PluginMap {
    entries: HashMap<String, PluginEntry>,
    next_seq: u64,
}

impl PluginMap {
    /// `anonymous_<n>` with the smallest unused `n`.
    fn anonymous_id(&self) -> String {
        (0..)
            .map(|n| format!("anonymous_{n}"))
            .find(|id| !self.entries.contains_key(id))
            .unwrap_or_default()
    }

    fn insert(&mut self, id: String, plugin: Plugin) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(id, PluginEntry { plugin, seq });
    }

    /// Plugins sorted by mount order.
    fn ordered(&self) -> Vec<&PluginEntry> {
        let mut entries: Vec<&PluginEntry> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
    }
}

// =============================================================================
// PluginManager
// =============================================================================

pub(crate) struct ManagerInner {
    plugins: RwLock<PluginMap>,
    services: ServiceRegistry,
    events: EventBus,
    permissions: PermissionGate,
    middlewares: MiddlewareChain,
    disabled: RwLock<HashSet<String>>,
    plugin_configs: RwLock<HashMap<String, Value>>,
}

/// The host every plugin mounts onto.
///
/// Cheap to clone; clones share the same state. Plugins hold only a weak
/// reference back to it.
#[derive(Clone)]
pub struct PluginManager {
    inner: Arc<ManagerInner>,
}

/// Weak back-reference stored in mounted plugins.
#[derive(Clone)]
pub(crate) struct WeakManager(Weak<ManagerInner>);

impl WeakManager {
    pub(crate) fn upgrade(&self) -> Option<PluginManager> {
        self.0.upgrade().map(|inner| PluginManager { inner })
    }
}

impl PluginManager {
    /// Creates a host with the [default permission
    /// checker](crate::permission::DefaultPermissions).
    pub fn new() -> Self {
        Self::with_permissions(PermissionGate::default())
    }

    pub fn with_permissions(permissions: PermissionGate) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                plugins: RwLock::new(PluginMap::default()),
                services: ServiceRegistry::new(),
                events: EventBus::new(),
                permissions,
                middlewares: MiddlewareChain::new(),
                disabled: RwLock::new(HashSet::new()),
                plugin_configs: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Replaces the permission checker.
    pub fn set_permission_checker(&self, checker: Arc<dyn PermissionChecker>) {
        self.inner.permissions.set_checker(checker);
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.inner.services
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn permissions(&self) -> &PermissionGate {
        &self.inner.permissions
    }

    /// `true` if both handles refer to the same host.
    pub fn ptr_eq(&self, other: &PluginManager) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakManager {
        WeakManager(Arc::downgrade(&self.inner))
    }

    // ─── Plugin lifecycle ────────────────────────────────────────────────────

    /// Mounts a plugin.
    ///
    /// Mounting a plugin that is already mounted here is a no-op.
    ///
    /// # Errors
    ///
    /// - [`PluginError::MountedElsewhere`] if mounted to another host.
    /// - [`PluginError::IdConflict`] if another plugin already holds its id.
    /// - [`PluginError::Setup`] if its setup function fails; everything the
    ///   setup registered is disposed and the plugin is left unmounted.
    pub async fn mount(&self, plugin: &Plugin) -> PluginResult<()> {
        if let Some(host) = plugin.host() {
            if host.ptr_eq(self) {
                return Ok(());
            }
            return Err(PluginError::MountedElsewhere {
                id: plugin.display_name(),
            });
        }

        let id = {
            let mut map = self.inner.plugins.write();
            let id = match plugin.declared_id() {
                Some(id) => id.to_string(),
                None => map.anonymous_id(),
            };
            if map.entries.contains_key(&id) {
                error!(plugin = %id, "Duplicate plugin id; plugin not mounted");
                return Err(PluginError::IdConflict { id });
            }
            map.insert(id.clone(), plugin.clone());
            id
        };
        plugin.attach(self.downgrade(), &id);

        if let Some(setup) = plugin.setup_fn() {
            let result = plugin
                .with_origin(Origin::Setup, async { setup(plugin.clone()).await })
                .await;
            if let Err(source) = result {
                error!(plugin = %id, error = %source, "Plugin setup failed");
                self.teardown(plugin, &id).await;
                return Err(PluginError::Setup { id, source });
            }
        }

        plugin.restore_declared().await;
        plugin.contribute_pending(self).await;
        plugin.run_mounted_callbacks(self).await;
        plugin.run_gates(self).await;

        self.inner
            .events
            .publish(PluginMounted { plugin: id.clone() })
            .await;
        info!(plugin = %id, status = %plugin.status(), "Plugin mounted");
        Ok(())
    }

    /// Mounts `child` and ties its lifetime to `parent`: unmounting the parent
    /// unmounts the child.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotMounted`] if `parent` is not mounted here, plus
    /// anything [`mount`](Self::mount) returns for the child.
    pub async fn mount_child(&self, parent: &Plugin, child: Plugin) -> PluginResult<()> {
        if !parent.host().is_some_and(|host| host.ptr_eq(self)) {
            return Err(PluginError::NotMounted {
                id: parent.display_name(),
            });
        }
        self.mount(&child).await?;
        parent.on_dispose_async(move || async move {
            if child.is_mounted() {
                child.unmount().await?;
            }
            Ok(())
        });
        Ok(())
    }

    /// Unmounts a plugin.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotMounted`] if the plugin is not mounted here.
    pub async fn unmount(&self, plugin: &Plugin) -> PluginResult<UnmountReport> {
        let id = match (plugin.host(), plugin.id()) {
            (Some(host), Some(id)) if host.ptr_eq(self) => id,
            _ => {
                return Err(PluginError::NotMounted {
                    id: plugin.display_name(),
                });
            }
        };

        self.inner
            .events
            .publish(PluginBeforeUnmount { plugin: id.clone() })
            .await;
        plugin.run_before_unmount();

        let report = self.teardown(plugin, &id).await;
        if report.is_clean() {
            info!(plugin = %id, disposed = report.disposed, "Plugin unmounted");
        } else {
            warn!(
                plugin = %id,
                disposed = report.disposed,
                failed = report.failures.len(),
                "Plugin unmounted with failing disposers"
            );
        }
        Ok(report)
    }

    /// Unmounts the plugin with the given id.
    pub async fn unmount_id(&self, id: &str) -> PluginResult<UnmountReport> {
        match self.plugin(id) {
            Some(plugin) => self.unmount(&plugin).await,
            None => Err(PluginError::NotMounted { id: id.to_string() }),
        }
    }

    /// Unmounts every plugin, most recently mounted first.
    pub async fn unmount_all(&self) -> Vec<UnmountReport> {
        let mut reports = Vec::new();
        for plugin in self.plugins().into_iter().rev() {
            match self.unmount(&plugin).await {
                Ok(report) => reports.push(report),
                // Already gone through a parent's disposer.
                Err(PluginError::NotMounted { .. }) => {}
                Err(e) => error!(error = %e, "Failed to unmount plugin"),
            }
        }
        reports
    }

    /// Runs disposers until none are left, then resets and forgets the plugin.
    async fn teardown(&self, plugin: &Plugin, id: &str) -> UnmountReport {
        let mut report = UnmountReport {
            plugin: id.to_string(),
            disposed: 0,
            failures: Vec::new(),
        };
        loop {
            let disposers = plugin.take_disposers();
            if disposers.is_empty() {
                break;
            }
            for dispose in disposers {
                report.disposed += 1;
                if let Err(e) = dispose().await {
                    error!(plugin = %id, error = %e, "Disposer failed");
                    report.failures.push(e);
                }
            }
        }
        plugin.reset();
        self.inner.plugins.write().entries.remove(id);
        report
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    pub fn plugin(&self, id: &str) -> Option<Plugin> {
        self.inner
            .plugins
            .read()
            .entries
            .get(id)
            .map(|entry| entry.plugin.clone())
    }

    /// Mounted plugins in mount order.
    pub fn plugins(&self) -> Vec<Plugin> {
        self.inner
            .plugins
            .read()
            .ordered()
            .into_iter()
            .map(|entry| entry.plugin.clone())
            .collect()
    }

    pub fn plugin_ids(&self) -> Vec<String> {
        self.plugins().iter().filter_map(Plugin::id).collect()
    }

    pub fn plugin_count(&self) -> usize {
        self.inner.plugins.read().entries.len()
    }

    /// Enabled plugins that accept `adapter`, highest priority first, mount
    /// order breaking ties.
    pub(crate) fn dispatch_order(&self, adapter: &str) -> Vec<Plugin> {
        let map = self.inner.plugins.read();
        let mut entries: Vec<&PluginEntry> = map
            .entries
            .iter()
            .filter(|(id, entry)| !self.is_disabled(id) && entry.plugin.supports_adapter(adapter))
            .map(|(_, entry)| entry)
            .collect();
        entries.sort_by(|a, b| {
            b.plugin
                .priority()
                .cmp(&a.plugin.priority())
                .then(a.seq.cmp(&b.seq))
        });
        entries.into_iter().map(|entry| entry.plugin.clone()).collect()
    }

    // ─── Enable / disable ────────────────────────────────────────────────────

    /// Replaces the disabled-plugin set.
    pub fn set_disabled_plugins<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let disabled: HashSet<String> = ids.into_iter().map(Into::into).collect();
        debug!(count = disabled.len(), "Disabled plugin list updated");
        *self.inner.disabled.write() = disabled;
    }

    pub fn is_disabled(&self, id: &str) -> bool {
        self.inner.disabled.read().contains(id)
    }

    pub fn status_of(&self, id: &str) -> Option<PluginStatus> {
        self.plugin(id).map(|plugin| plugin.status())
    }

    /// Sorted list of disabled ids.
    pub fn disabled_plugins(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.disabled.read().iter().cloned().collect();
        ids.sort();
        ids
    }

    // ─── Plugin configuration ────────────────────────────────────────────────

    /// Replaces every plugin's config section.
    pub fn set_plugin_configs(&self, configs: HashMap<String, Value>) {
        *self.inner.plugin_configs.write() = configs;
    }

    pub fn set_plugin_config(&self, id: impl Into<String>, config: Value) {
        self.inner.plugin_configs.write().insert(id.into(), config);
    }

    /// The config section for `id`, or an empty object.
    pub fn plugin_config(&self, id: &str) -> Value {
        self.inner
            .plugin_configs
            .read()
            .get(id)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    // ─── Services ────────────────────────────────────────────────────────────

    /// Registers a service, announces it, and fires any gate it completes.
    pub async fn register_service(&self, name: impl Into<String>, service: ServiceArc) {
        let name = name.into();
        if self.inner.services.insert(name.clone(), service).is_some() {
            debug!(service = %name, "Service replaced");
        } else {
            info!(service = %name, "Service registered");
        }
        self.inner
            .events
            .publish(ServiceRegister { name })
            .await;
        for plugin in self.plugins() {
            plugin.run_gates(self).await;
        }
    }

    /// Typed [`register_service`](Self::register_service).
    pub async fn provide<T: std::any::Any + Send + Sync>(&self, name: impl Into<String>, service: Arc<T>) {
        self.register_service(name, service).await;
    }

    pub fn service<T: std::any::Any + Send + Sync>(&self, name: &str) -> ServiceResult<Arc<T>> {
        self.inner.services.get(name)
    }

    /// Removes a service. Gates that already fired stay fired.
    pub fn remove_service(&self, name: &str) -> Option<ServiceArc> {
        self.inner.services.remove(name)
    }

    // ─── Middlewares & dispatch ──────────────────────────────────────────────

    /// Adds a host-level middleware, run before every plugin's.
    pub fn middleware<M: Middleware>(&self, middleware: M, options: MiddlewareOptions) -> MiddlewareId {
        self.inner.middlewares.add(middleware, options)
    }

    pub fn remove_middleware(&self, id: MiddlewareId) -> bool {
        self.inner.middlewares.remove(id)
    }

    pub(crate) fn middleware_snapshot(&self) -> Arc<[Stage]> {
        self.inner.middlewares.snapshot()
    }

    /// Runs one message through the middleware chain and the command tree.
    pub async fn dispatch(&self, message: Message) -> DispatchResult<DispatchOutcome> {
        Dispatcher::new(self.clone()).dispatch(message).await
    }

    /// Adapter entry point: announces the message, then dispatches it.
    pub async fn receive(&self, message: Message) -> DispatchResult<DispatchOutcome> {
        let message = Arc::new(message);
        self.inner
            .events
            .publish(MessageReceived {
                message: Arc::clone(&message),
            })
            .await;
        Dispatcher::new(self.clone()).dispatch_arc(message).await
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.plugin_ids())
            .field("services", &self.inner.services.names())
            .field("disabled", &self.disabled_plugins())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use weft_core::BoxError;

    #[tokio::test]
    async fn test_anonymous_ids_reuse_smallest_free_slot() {
        let host = PluginManager::new();
        let a = Plugin::anonymous();
        let b = Plugin::anonymous();
        let c = Plugin::anonymous();
        host.mount(&a).await.unwrap();
        host.mount(&b).await.unwrap();
        assert_eq!(a.id().as_deref(), Some("anonymous_0"));
        assert_eq!(b.id().as_deref(), Some("anonymous_1"));

        a.unmount().await.unwrap();
        assert_eq!(a.id(), None);
        host.mount(&c).await.unwrap();
        assert_eq!(c.id().as_deref(), Some("anonymous_0"));
    }

    #[tokio::test]
    async fn test_mount_is_idempotent_on_same_host() {
        let host = PluginManager::new();
        let plugin = Plugin::new("p");
        host.mount(&plugin).await.unwrap();
        host.mount(&plugin).await.unwrap();
        assert_eq!(host.plugin_count(), 1);

        let other = PluginManager::new();
        assert!(matches!(
            other.mount(&plugin).await,
            Err(PluginError::MountedElsewhere { .. })
        ));
    }

    #[tokio::test]
    async fn test_unmount_requires_mount() {
        let plugin = Plugin::new("p");
        assert!(matches!(
            plugin.unmount().await,
            Err(PluginError::NotMounted { .. })
        ));
    }

    #[tokio::test]
    async fn test_disabled_status() {
        let host = PluginManager::new();
        let plugin = Plugin::new("p");
        assert_eq!(plugin.status(), PluginStatus::Disabled);
        host.mount(&plugin).await.unwrap();
        assert_eq!(plugin.status(), PluginStatus::Enabled);

        host.set_disabled_plugins(["p"]);
        assert_eq!(plugin.status(), PluginStatus::Disabled);
        assert_eq!(plugin.status_text(), "❌");
        assert!(host.dispatch_order("qq").is_empty());

        host.set_disabled_plugins(Vec::<String>::new());
        plugin.unmount().await.unwrap();
        assert_eq!(plugin.status(), PluginStatus::Disabled);
    }

    #[tokio::test]
    async fn test_dispatch_order() {
        let host = PluginManager::new();
        let low = Plugin::builder().id("low").priority(0).build();
        let first = Plugin::new("first");
        let second = Plugin::new("second");
        let high = Plugin::builder().id("high").priority(10).build();
        let discord = Plugin::builder().id("discord").adapter("discord").build();
        for plugin in [&low, &first, &second, &high, &discord] {
            host.mount(plugin).await.unwrap();
        }

        let ids: Vec<String> = host
            .dispatch_order("qq")
            .iter()
            .filter_map(Plugin::id)
            .collect();
        assert_eq!(ids, vec!["high", "first", "second", "low"]);
    }

    #[tokio::test]
    async fn test_setup_failure_rolls_back() {
        let host = PluginManager::new();
        let disposed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&disposed);
        let plugin = Plugin::builder()
            .id("broken")
            .setup(move |plugin| {
                let counter = Arc::clone(&counter);
                async move {
                    plugin.on_dispose(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    });
                    Err::<(), BoxError>("no database".into())
                }
            })
            .build();

        let err = host.mount(&plugin).await.unwrap_err();
        assert!(matches!(err, PluginError::Setup { ref id, .. } if id == "broken"));
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert!(!plugin.is_mounted());
        assert_eq!(host.plugin_count(), 0);
    }

    #[tokio::test]
    async fn test_mount_child_follows_parent() {
        let host = PluginManager::new();
        let parent = Plugin::new("parent");
        let child = Plugin::new("child");
        host.mount(&parent).await.unwrap();
        host.mount_child(&parent, child.clone()).await.unwrap();
        assert!(child.is_mounted());

        parent.unmount().await.unwrap();
        assert!(!child.is_mounted());
        assert_eq!(host.plugin_count(), 0);
    }
}
