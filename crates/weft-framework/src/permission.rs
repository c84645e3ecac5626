//! Permission predicates and scope filters.
//!
//! A command (or middleware) carries a list of predicate strings. Every
//! predicate must pass for the command to run; an empty list always passes.
//! Predicates are evaluated by a [`PermissionChecker`] owned by the host.
//!
//! [`DefaultPermissions`] understands:
//!
//! | Predicate | Passes when |
//! |-----------|-------------|
//! | `adapter(a, b)` | the message came through adapter `a` or `b` |
//! | `user(id, ..)` | the sender's user id is listed |
//! | `group(id, ..)` | the message is a group message from a listed group |
//! | `scope(private, ..)` | the message scope is listed |
//! | `master` (bare name) | the adapter granted the sender that role |

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;
use weft_core::{Message, MessageScope};

use crate::command::Command;

/// Evaluates one predicate string against a message.
#[async_trait]
pub trait PermissionChecker: Send + Sync + 'static {
    async fn check(&self, predicate: &str, message: &Message) -> bool;
}

/// A named predicate taking the arguments inside its parentheses.
pub type PredicateFn = Arc<dyn Fn(&[&str], &Message) -> bool + Send + Sync>;

/// Splits `name(a, b)` into `("name", ["a", "b"])`.
fn split_predicate(predicate: &str) -> (&str, Vec<&str>) {
    let predicate = predicate.trim();
    match predicate
        .strip_suffix(')')
        .and_then(|body| body.split_once('('))
    {
        Some((name, args)) => (
            name.trim(),
            args.split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .collect(),
        ),
        None => (predicate, Vec::new()),
    }
}

// ============================================================================
// DefaultPermissions
// ============================================================================

/// The built-in checker. Further named predicates can be registered.
pub struct DefaultPermissions {
    predicates: RwLock<HashMap<String, PredicateFn>>,
}

impl DefaultPermissions {
    pub fn new() -> Self {
        let checker = Self {
            predicates: RwLock::new(HashMap::new()),
        };
        checker.register("adapter", |args, msg| args.iter().any(|a| *a == msg.adapter));
        checker.register("user", |args, msg| {
            args.iter().any(|a| *a == msg.sender.user_id)
        });
        checker.register("group", |args, msg| {
            msg.message_type == MessageScope::Group && args.iter().any(|a| *a == msg.from_id)
        });
        checker.register("scope", |args, msg| {
            args.iter()
                .filter_map(|a| a.parse::<MessageScope>().ok())
                .any(|scope| scope == msg.message_type)
        });
        checker
    }

    /// Registers (or replaces) a named predicate.
    pub fn register<F>(&self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&[&str], &Message) -> bool + Send + Sync + 'static,
    {
        self.predicates
            .write()
            .insert(name.into(), Arc::new(predicate));
    }
}

impl Default for DefaultPermissions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.predicates.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("DefaultPermissions")
            .field("predicates", &names)
            .finish()
    }
}

#[async_trait]
impl PermissionChecker for DefaultPermissions {
    async fn check(&self, predicate: &str, message: &Message) -> bool {
        let (name, args) = split_predicate(predicate);
        let named = self.predicates.read().get(name).cloned();
        match named {
            Some(f) => f(&args, message),
            None if args.is_empty() => message.sender.has_permission(name),
            None => {
                trace!(predicate, "Unknown permission predicate");
                false
            }
        }
    }
}

// ============================================================================
// PermissionGate
// ============================================================================

/// Applies scope filters and permission predicates before a command runs.
pub struct PermissionGate {
    checker: RwLock<Arc<dyn PermissionChecker>>,
}

impl PermissionGate {
    pub fn new(checker: Arc<dyn PermissionChecker>) -> Self {
        Self {
            checker: RwLock::new(checker),
        }
    }

    /// Replaces the checker.
    pub fn set_checker(&self, checker: Arc<dyn PermissionChecker>) {
        *self.checker.write() = checker;
    }

    /// Returns the current checker.
    pub fn checker(&self) -> Arc<dyn PermissionChecker> {
        Arc::clone(&self.checker.read())
    }

    /// `true` if `scopes` is empty or contains the message's scope.
    pub fn scope_allows(scopes: &[MessageScope], message: &Message) -> bool {
        scopes.is_empty() || scopes.contains(&message.message_type)
    }

    /// Checks the scope filter, then every predicate in order.
    pub async fn allows(
        &self,
        permissions: &[String],
        scopes: &[MessageScope],
        message: &Message,
    ) -> bool {
        if !Self::scope_allows(scopes, message) {
            return false;
        }
        let checker = self.checker();
        for predicate in permissions {
            if !checker.check(predicate, message).await {
                trace!(predicate = %predicate, "Permission denied");
                return false;
            }
        }
        true
    }

    /// [`allows`](Self::allows) with a command's own permissions and scopes.
    pub async fn allows_command(&self, command: &Command, message: &Message) -> bool {
        self.allows(command.permissions(), command.scopes(), message)
            .await
    }
}

impl Default for PermissionGate {
    fn default() -> Self {
        Self::new(Arc::new(DefaultPermissions::new()))
    }
}

impl fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionGate").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::Sender;

    fn msg(adapter: &str, scope: MessageScope) -> Message {
        Message::new(adapter, "bot", scope, "hi")
            .from_id("g1")
            .sender(Sender::new("u1").permission("admins"))
    }

    #[test]
    fn test_split_predicate() {
        assert_eq!(split_predicate("adapter(discord)"), ("adapter", vec!["discord"]));
        assert_eq!(split_predicate(" user(1, 2) "), ("user", vec!["1", "2"]));
        assert_eq!(split_predicate("master"), ("master", vec![]));
    }

    #[tokio::test]
    async fn test_builtin_predicates() {
        let checker = DefaultPermissions::new();
        let group = msg("discord", MessageScope::Group);

        assert!(checker.check("adapter(discord)", &group).await);
        assert!(!checker.check("adapter(telegram)", &group).await);
        assert!(checker.check("adapter(qq, discord)", &group).await);
        assert!(checker.check("user(u1)", &group).await);
        assert!(checker.check("group(g1)", &group).await);
        assert!(!checker.check("group(g1)", &msg("discord", MessageScope::Private)).await);
        assert!(checker.check("scope(group)", &group).await);
        assert!(checker.check("admins", &group).await);
        assert!(!checker.check("master", &group).await);
        assert!(!checker.check("nonsense(x)", &group).await);
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let checker = DefaultPermissions::new();
        checker.register("bot", |args, msg| args.iter().any(|a| *a == msg.bot));
        assert!(checker.check("bot(bot)", &msg("qq", MessageScope::Group)).await);
    }

    #[tokio::test]
    async fn test_gate_is_a_conjunction() {
        let gate = PermissionGate::default();
        let message = msg("discord", MessageScope::Group);
        let perms = vec!["adapter(discord)".to_string(), "admins".to_string()];

        assert!(gate.allows(&[], &[], &message).await);
        assert!(gate.allows(&perms, &[], &message).await);
        assert!(
            !gate
                .allows(&[perms[0].clone(), "master".into()], &[], &message)
                .await
        );
        assert!(
            !gate
                .allows(&perms, &[MessageScope::Private], &message)
                .await
        );
        assert!(
            gate.allows(&perms, &[MessageScope::Private, MessageScope::Group], &message)
                .await
        );
    }
}
