//! Host lifecycle events.
//!
//! Every notification the host produces is one variant of [`HostEvent`].
//! Each variant wraps a payload struct implementing [`EventPayload`], so
//! listeners subscribe by payload type and receive it already unwrapped:
//!
//! ```rust,ignore
//! bus.subscribe(|e: ServiceRegister| async move {
//!     info!(service = %e.name, "new service");
//! });
//! bus.publish(ServiceRegister { name: "db".into() }).await;
//! ```
//!
//! Listeners for one kind run in subscription order; `publish` awaits each
//! listener before calling the next.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::trace;

use crate::message::Message;

// ============================================================================
// Event Kinds
// ============================================================================

/// The tag of a [`HostEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PluginMounted,
    PluginBeforeUnmount,
    ServiceRegister,
    CommandAdd,
    CommandRemove,
    BotReady,
    Message,
}

impl EventKind {
    /// Returns the kebab-case event name.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::PluginMounted => "plugin-mounted",
            EventKind::PluginBeforeUnmount => "plugin-beforeUnmount",
            EventKind::ServiceRegister => "service-register",
            EventKind::CommandAdd => "command-add",
            EventKind::CommandRemove => "command-remove",
            EventKind::BotReady => "bot-ready",
            EventKind::Message => "message",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// A plugin was added to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMounted {
    pub plugin: String,
}

/// A plugin is about to run its disposers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginBeforeUnmount {
    pub plugin: String,
}

/// A capability was registered in the service registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegister {
    pub name: String,
}

/// A command became visible to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAdd {
    pub plugin: String,
    pub command: String,
}

/// A command was removed from its plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRemove {
    pub plugin: String,
    pub command: String,
}

/// An adapter finished connecting a bot account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotReady {
    pub adapter: String,
    pub bot: String,
}

/// An adapter received a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReceived {
    pub message: Arc<Message>,
}

/// The tagged union of every host notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    PluginMounted(PluginMounted),
    PluginBeforeUnmount(PluginBeforeUnmount),
    ServiceRegister(ServiceRegister),
    CommandAdd(CommandAdd),
    CommandRemove(CommandRemove),
    BotReady(BotReady),
    Message(MessageReceived),
}

impl HostEvent {
    /// Returns the tag of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            HostEvent::PluginMounted(_) => EventKind::PluginMounted,
            HostEvent::PluginBeforeUnmount(_) => EventKind::PluginBeforeUnmount,
            HostEvent::ServiceRegister(_) => EventKind::ServiceRegister,
            HostEvent::CommandAdd(_) => EventKind::CommandAdd,
            HostEvent::CommandRemove(_) => EventKind::CommandRemove,
            HostEvent::BotReady(_) => EventKind::BotReady,
            HostEvent::Message(_) => EventKind::Message,
        }
    }
}

/// A payload type carried by exactly one [`HostEvent`] variant.
pub trait EventPayload: Clone + Send + Sync + 'static {
    /// The tag of the variant carrying this payload.
    const KIND: EventKind;

    /// Wraps the payload into its variant.
    fn into_event(self) -> HostEvent;

    /// Unwraps the payload if `event` is the matching variant.
    fn from_event(event: HostEvent) -> Option<Self>;
}

macro_rules! impl_payload {
    ($($payload:ident => $variant:ident),* $(,)?) => {
        $(
            impl EventPayload for $payload {
                const KIND: EventKind = EventKind::$variant;

                fn into_event(self) -> HostEvent {
                    HostEvent::$variant(self)
                }

                fn from_event(event: HostEvent) -> Option<Self> {
                    match event {
                        HostEvent::$variant(payload) => Some(payload),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_payload! {
    PluginMounted => PluginMounted,
    PluginBeforeUnmount => PluginBeforeUnmount,
    ServiceRegister => ServiceRegister,
    CommandAdd => CommandAdd,
    CommandRemove => CommandRemove,
    BotReady => BotReady,
    MessageReceived => Message,
}

// ============================================================================
// EventBus
// ============================================================================

type Listener = Arc<dyn Fn(HostEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
}

/// A cloneable publish/subscribe hub for [`HostEvent`]s.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to every event carrying payload `E`.
    pub fn subscribe<E, F, Fut>(&self, listener: F) -> ListenerId
    where
        E: EventPayload,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let erased: Listener = Arc::new(move |event: HostEvent| match E::from_event(event) {
            Some(payload) => listener(payload).boxed(),
            None => futures::future::ready(()).boxed(),
        });
        self.inner
            .listeners
            .write()
            .entry(E::KIND)
            .or_default()
            .push((id, erased));
        id
    }

    /// Removes a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();
        for list in listeners.values_mut() {
            if let Some(pos) = list.iter().position(|(lid, _)| *lid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Publishes a typed payload.
    pub async fn publish<E: EventPayload>(&self, payload: E) {
        self.emit(payload.into_event()).await;
    }

    /// Publishes an already-wrapped event.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe or
    /// unsubscribe while the event is being delivered.
    pub async fn emit(&self, event: HostEvent) {
        let kind = event.kind();
        let snapshot: Vec<Listener> = match self.inner.listeners.read().get(&kind) {
            Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };
        trace!(event = %kind, listeners = snapshot.len(), "Emitting host event");
        for listener in snapshot {
            listener(event.clone()).await;
        }
    }

    /// Returns the number of listeners subscribed to `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner
            .listeners
            .read()
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.inner.listeners.read();
        f.debug_struct("EventBus")
            .field("kinds", &listeners.len())
            .field(
                "listeners",
                &listeners.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}
