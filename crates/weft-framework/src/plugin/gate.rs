//! Service-gated callbacks.
//!
//! A plugin declares "run this once services {S} exist" with
//! [`Plugin::wait_for`](super::Plugin::wait_for). The host re-evaluates the
//! gate whenever the plugin is mounted and whenever a service is registered.
//! A callback fires at most once: it is taken out of its entry and `is_run` is
//! set in the same critical section, so later evaluations find nothing to run
//! even if the services disappear and come back.
//!
//! Entries registered outside the plugin's setup function outlive an unmount,
//! fired or not; the setup function re-registers its own on every mount.

use std::collections::BTreeSet;
use std::fmt;

use futures::future::BoxFuture;
use weft_core::{BoxError, ServiceRegistry};

use crate::manager::PluginManager;

use super::core::Origin;

/// Deferred callback run once its services exist.
pub type GateCallback =
    Box<dyn FnOnce(PluginManager) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// One `wait_for` registration.
pub struct ServiceCallbackInfo {
    services: Vec<String>,
    callback: Option<GateCallback>,
    is_run: bool,
    origin: Origin,
}

impl ServiceCallbackInfo {
    pub(crate) fn new(services: Vec<String>, callback: GateCallback, origin: Origin) -> Self {
        Self {
            services,
            callback: Some(callback),
            is_run: false,
            origin,
        }
    }

    /// Capability names this entry waits for.
    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn is_run(&self) -> bool {
        self.is_run
    }

    /// Takes the callback if it has not run and every service exists.
    fn take_if_ready(&mut self, registry: &ServiceRegistry) -> Option<(Origin, GateCallback)> {
        if self.is_run || !registry.contains_all(&self.services) {
            return None;
        }
        self.is_run = true;
        self.callback.take().map(|callback| (self.origin, callback))
    }
}

impl fmt::Debug for ServiceCallbackInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCallbackInfo")
            .field("services", &self.services)
            .field("is_run", &self.is_run)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// All gate entries of one plugin.
#[derive(Debug, Default)]
pub(crate) struct ServiceGate {
    entries: Vec<ServiceCallbackInfo>,
}

impl ServiceGate {
    pub(crate) fn push(&mut self, info: ServiceCallbackInfo) {
        self.entries.push(info);
    }

    /// Callbacks that became runnable, in registration order.
    pub(crate) fn ready(&mut self, registry: &ServiceRegistry) -> Vec<(Origin, GateCallback)> {
        self.entries
            .iter_mut()
            .filter_map(|entry| entry.take_if_ready(registry))
            .collect()
    }

    /// Union of every requested service name, sorted.
    pub(crate) fn need_services(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|entry| entry.services.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub(crate) fn pending(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.is_run).count()
    }

    /// Splits off the entries that survive an unmount.
    pub(crate) fn take_declared(&mut self) -> ServiceGate {
        let (declared, _setup): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.origin == Origin::Declared);
        ServiceGate { entries: declared }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Arc;

    fn noop() -> GateCallback {
        Box::new(|_host: PluginManager| async { Ok(()) }.boxed())
    }

    fn entry(services: &[&str]) -> ServiceCallbackInfo {
        let services = services.iter().map(|s| s.to_string()).collect();
        ServiceCallbackInfo::new(services, noop(), Origin::Declared)
    }

    #[test]
    fn test_fires_once_when_all_services_exist() {
        let registry = ServiceRegistry::new();
        let mut gate = ServiceGate::default();
        gate.push(entry(&["db", "http"]));

        assert!(gate.ready(&registry).is_empty());
        registry.provide("db", Arc::new(1u8));
        assert!(gate.ready(&registry).is_empty());
        registry.provide("http", Arc::new(2u8));
        assert_eq!(gate.ready(&registry).len(), 1);
        assert_eq!(gate.pending(), 0);

        registry.remove("db");
        registry.provide("db", Arc::new(3u8));
        assert!(gate.ready(&registry).is_empty());
    }

    #[test]
    fn test_need_services_is_a_sorted_union() {
        let mut gate = ServiceGate::default();
        gate.push(entry(&["b", "a"]));
        gate.push(entry(&["a", "c"]));
        assert_eq!(gate.need_services(), vec!["a", "b", "c"]);
        assert_eq!(gate.pending(), 2);
    }

    #[test]
    fn test_empty_requirement_is_ready_immediately() {
        let mut gate = ServiceGate::default();
        gate.push(entry(&[]));
        assert_eq!(gate.ready(&ServiceRegistry::new()).len(), 1);
    }

    #[test]
    fn test_take_declared_keeps_run_state() {
        let registry = ServiceRegistry::new();
        registry.provide("db", Arc::new(1u8));

        let mut gate = ServiceGate::default();
        gate.push(entry(&["db"]));
        gate.push(entry(&["cache"]));
        gate.push(ServiceCallbackInfo::new(vec!["cache".into()], noop(), Origin::Setup));
        assert_eq!(gate.ready(&registry).len(), 1);

        let mut kept = gate.take_declared();
        assert_eq!(kept.entries.len(), 2);
        assert_eq!(kept.pending(), 1);
        assert!(gate.entries.is_empty());

        registry.provide("cache", Arc::new(2u8));
        let ready = kept.ready(&registry);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0, Origin::Declared);
    }
}
