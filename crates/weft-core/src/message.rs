//! Normalized message types exchanged with adapters.
//!
//! Adapters convert their wire events into a [`Message`] before handing it to
//! the dispatcher, and convert the returned [`Reply`] back into wire format.
//! The core treats a `Message` as immutable input.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::UnknownScope;

// ============================================================================
// Message Scope
// ============================================================================

/// The conversational context a message arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageScope {
    /// One-to-one chat with a user.
    Private,
    /// A group chat.
    Group,
    /// A channel inside a guild (Discord-style servers).
    Guild,
    /// A direct message sent through a guild.
    Direct,
}

impl MessageScope {
    /// Every scope, in declaration order.
    pub const ALL: [MessageScope; 4] = [
        MessageScope::Private,
        MessageScope::Group,
        MessageScope::Guild,
        MessageScope::Direct,
    ];

    /// Returns the lowercase name used in configs and permission predicates.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageScope::Private => "private",
            MessageScope::Group => "group",
            MessageScope::Guild => "guild",
            MessageScope::Direct => "direct",
        }
    }
}

impl fmt::Display for MessageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageScope {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "private" => Ok(MessageScope::Private),
            "group" => Ok(MessageScope::Group),
            "guild" | "channel" => Ok(MessageScope::Guild),
            "direct" => Ok(MessageScope::Direct),
            other => Err(UnknownScope(other.to_string())),
        }
    }
}

// ============================================================================
// Sender
// ============================================================================

/// The author of an inbound message.
///
/// `permissions` is filled by the adapter (e.g. `master`, `admins`) and is
/// never modified by the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Platform user id.
    pub user_id: String,
    /// Display name, if the platform provides one.
    #[serde(default)]
    pub nickname: Option<String>,
    /// Role names granted to this sender by the adapter.
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Sender {
    /// Creates a sender with no nickname and no permissions.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Sets the display name.
    pub fn nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// Grants a role name.
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Returns `true` if the adapter granted `permission` to this sender.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

// ============================================================================
// Message
// ============================================================================

/// A normalized inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Name of the adapter that produced the message (e.g. `discord`).
    pub adapter: String,
    /// Identity of the bot account that received it.
    pub bot: String,
    /// The conversation id: user id for private chats, group/channel id otherwise.
    pub from_id: String,
    /// The conversational context.
    pub message_type: MessageScope,
    /// The author.
    pub sender: Sender,
    /// Plain-text content as received.
    pub raw: String,
}

impl Message {
    /// Creates a message; `from_id` defaults to empty and the sender to an
    /// anonymous one.
    pub fn new(
        adapter: impl Into<String>,
        bot: impl Into<String>,
        message_type: MessageScope,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            bot: bot.into(),
            from_id: String::new(),
            message_type,
            sender: Sender::default(),
            raw: raw.into(),
        }
    }

    /// Sets the conversation id.
    pub fn from_id(mut self, from_id: impl Into<String>) -> Self {
        self.from_id = from_id.into();
        self
    }

    /// Sets the author.
    pub fn sender(mut self, sender: Sender) -> Self {
        self.sender = sender;
        self
    }

    /// Returns the raw text with surrounding whitespace removed.
    pub fn text(&self) -> &str {
        self.raw.trim()
    }
}

// ============================================================================
// Reply
// ============================================================================

/// A node of a structured reply.
///
/// `kind` names the element (`text`, `image`, `at`, ...). Adapters decide how
/// each kind maps onto their wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Element type name.
    pub kind: String,
    /// Element attributes.
    #[serde(default)]
    pub attrs: Map<String, Value>,
    /// Nested elements.
    #[serde(default)]
    pub children: Vec<Element>,
}

impl Element {
    /// Creates an element with no attributes or children.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attrs: Map::new(),
            children: Vec::new(),
        }
    }

    /// Creates a `text` element carrying `text` in its `text` attribute.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new("text").attr("text", text.into())
    }

    /// Sets an attribute.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Appends a child element.
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    fn collect_text(&self, out: &mut String) {
        if self.kind == "text"
            && let Some(Value::String(text)) = self.attrs.get("text")
        {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }
}

/// The renderable payload produced by a command or middleware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    /// Plain text.
    Text(String),
    /// A structured element tree.
    Elements(Vec<Element>),
}

impl Reply {
    /// Creates a plain-text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }

    /// Returns the text if this is a plain-text reply.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Reply::Text(text) => Some(text),
            Reply::Elements(_) => None,
        }
    }

    /// Concatenates every text node of the reply.
    pub fn plain_text(&self) -> String {
        match self {
            Reply::Text(text) => text.clone(),
            Reply::Elements(elements) => {
                let mut out = String::new();
                for element in elements {
                    element.collect_text(&mut out);
                }
                out
            }
        }
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::Text(text)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::Text(text.to_string())
    }
}

impl From<Element> for Reply {
    fn from(element: Element) -> Self {
        Reply::Elements(vec![element])
    }
}

impl From<Vec<Element>> for Reply {
    fn from(elements: Vec<Element>) -> Self {
        Reply::Elements(elements)
    }
}
