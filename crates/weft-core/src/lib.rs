//! # Weft Core
//!
//! Leaf types shared by every layer of the Weft plugin host:
//!
//! - **Messages**: the normalized [`Message`] adapters hand to the dispatcher
//!   and the [`Reply`] they get back.
//! - **Events**: the [`HostEvent`] tagged union and the [`EventBus`] that
//!   delivers it.
//! - **Services**: the [`ServiceRegistry`] mapping capability names to
//!   implementations.
//!
//! ```text
//! ┌─────────────┐  Message   ┌────────────┐  Reply   ┌─────────────┐
//! │   Adapter   │───────────▶│    Host    │─────────▶│   Adapter   │
//! └─────────────┘            └────────────┘          └─────────────┘
//!                              │        │
//!                        EventBus   ServiceRegistry
//! ```

pub mod error;
pub mod event;
pub mod message;
pub mod service;

pub use error::{BoxError, ServiceError, ServiceResult, UnknownScope};
pub use event::{
    BotReady, CommandAdd, CommandRemove, EventBus, EventKind, EventPayload, HostEvent,
    ListenerId, MessageReceived, PluginBeforeUnmount, PluginMounted, ServiceRegister,
};
pub use message::{Element, Message, MessageScope, Reply, Sender};
pub use service::{NamedService, ServiceArc, ServiceRegistry};
