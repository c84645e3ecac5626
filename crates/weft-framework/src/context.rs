//! Contexts handed to middlewares and command actions.
//!
//! - [`MessageContext`]: one per dispatched message, shared by every
//!   middleware and the terminal command stage. Holds the immutable message
//!   and a handle to the host for service lookups.
//! - [`CommandContext`]: a [`MessageContext`] plus the matched command's
//!   bindings and the id of the plugin that owns it.
//!
//! Both are cheap to clone.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use weft_core::{Message, ServiceRegistry, ServiceResult};

use crate::command::{ArgValue, CommandMatch};
use crate::manager::PluginManager;

// =============================================================================
// MessageContext
// =============================================================================

#[derive(Clone)]
pub struct MessageContext {
    message: Arc<Message>,
    host: PluginManager,
}

impl MessageContext {
    pub(crate) fn new(message: Arc<Message>, host: PluginManager) -> Self {
        Self { message, host }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn message_arc(&self) -> Arc<Message> {
        Arc::clone(&self.message)
    }

    /// The host that is dispatching this message.
    pub fn host(&self) -> &PluginManager {
        &self.host
    }

    pub fn services(&self) -> &ServiceRegistry {
        self.host.services()
    }

    /// Typed service lookup.
    pub fn service<T: Any + Send + Sync>(&self, name: &str) -> ServiceResult<Arc<T>> {
        self.host.services().get(name)
    }
}

impl fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageContext")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// CommandContext
// =============================================================================

/// What an action handler receives.
///
/// Derefs to [`MessageContext`].
#[derive(Clone)]
pub struct CommandContext {
    base: MessageContext,
    plugin: Arc<str>,
    matched: Arc<CommandMatch>,
}

impl CommandContext {
    pub(crate) fn new(base: MessageContext, plugin: Arc<str>, matched: CommandMatch) -> Self {
        Self {
            base,
            plugin,
            matched: Arc::new(matched),
        }
    }

    /// Id of the plugin owning the command.
    pub fn plugin_id(&self) -> &str {
        &self.plugin
    }

    pub fn matched(&self) -> &CommandMatch {
        &self.matched
    }

    /// Shorthand for `matched().arg(name)`.
    pub fn arg(&self, name: &str) -> Option<&ArgValue> {
        self.matched.arg(name)
    }

    /// Shorthand for `matched().option(name)`.
    pub fn option(&self, name: &str) -> Option<&ArgValue> {
        self.matched.option(name)
    }
}

impl Deref for CommandContext {
    type Target = MessageContext;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("plugin", &self.plugin)
            .field("matched", &self.matched)
            .field("message", self.base.message())
            .finish()
    }
}
