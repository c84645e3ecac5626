//! # Weft Framework
//!
//! The plugin host proper, built on the leaf types of `weft-core`:
//!
//! - [`Plugin`] lifecycle with disposers, service gates and id derivation
//! - [`Command`] declarations, parsing and the per-plugin [`CommandTree`]
//! - [`PermissionGate`] predicates and message scopes
//! - continuation-passing [`Middleware`] chains
//! - the [`Dispatcher`] that turns one message into at most one reply
//! - [`PluginManager`], the host that ties them together
//!
//! ```text
//! message ─▶ host middlewares ─▶ plugin middlewares ─▶ command stage
//!                                                        │
//!                   reply ◀── "after next()" code ◀──────┘
//! ```

pub mod command;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod middleware;
pub mod permission;
pub mod plugin;

pub use command::{ActionOutput, ArgKind, ArgValue, Command, CommandMatch, CommandTree, Shortcut};
pub use context::{CommandContext, MessageContext};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{CommandError, DispatchError, DispatchResult, PluginError, PluginResult};
pub use manager::PluginManager;
pub use middleware::{Middleware, MiddlewareChain, MiddlewareId, MiddlewareOptions, MiddlewareResult, Next};
pub use permission::{DefaultPermissions, PermissionChecker, PermissionGate};
pub use plugin::{InstallRoots, Plugin, PluginBuilder, PluginStatus, UnmountReport};
