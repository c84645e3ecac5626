//! Process-wide registry of capability implementations.
//!
//! The registry maps a capability name to a type-erased `Arc`. Consumers use
//! an explicit typed accessor instead of reaching into the host:
//!
//! ```rust,ignore
//! let db: Arc<Database> = registry.get("database")?;
//! let db: Arc<Database> = registry.resolve::<Database>()?; // via NamedService
//! ```
//!
//! Trait-object services are stored as `Arc<Arc<dyn Trait>>`, i.e. register
//! an `Arc<dyn Trait>` value and look it up as `Arc<dyn Trait>`.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ServiceError, ServiceResult};

/// Type-erased service implementation.
pub type ServiceArc = Arc<dyn Any + Send + Sync>;

/// A service type with a well-known registry name.
pub trait NamedService: Any + Send + Sync {
    /// The capability name the service is registered under.
    const NAME: &'static str;
}

/// Capability name → implementation. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<RwLock<HashMap<String, ServiceArc>>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type-erased implementation, returning the one it replaced.
    ///
    /// Registration does not notify anyone; the host publishes
    /// `service-register` after calling this.
    pub fn insert(&self, name: impl Into<String>, service: ServiceArc) -> Option<ServiceArc> {
        self.services.write().insert(name.into(), service)
    }

    /// Registers a typed implementation.
    pub fn provide<T: Any + Send + Sync>(
        &self,
        name: impl Into<String>,
        service: Arc<T>,
    ) -> Option<ServiceArc> {
        self.insert(name, service)
    }

    /// Returns the type-erased implementation registered under `name`.
    pub fn get_raw(&self, name: &str) -> Option<ServiceArc> {
        self.services.read().get(name).cloned()
    }

    /// Returns the implementation registered under `name` as a `T`.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> ServiceResult<Arc<T>> {
        let raw = self.get_raw(name).ok_or_else(|| ServiceError::NotFound {
            name: name.to_string(),
        })?;
        raw.downcast::<T>().map_err(|_| ServiceError::TypeMismatch {
            name: name.to_string(),
            expected: type_name::<T>(),
        })
    }

    /// Returns the implementation of a [`NamedService`].
    pub fn resolve<T: NamedService>(&self) -> ServiceResult<Arc<T>> {
        self.get::<T>(T::NAME)
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    /// Returns `true` if every name in `names` is registered.
    pub fn contains_all<S: AsRef<str>>(&self, names: &[S]) -> bool {
        let services = self.services.read();
        names.iter().all(|n| services.contains_key(n.as_ref()))
    }

    /// Removes the implementation registered under `name`.
    pub fn remove(&self, name: &str) -> Option<ServiceArc> {
        self.services.write().remove(name)
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered services.
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .finish()
    }
}
