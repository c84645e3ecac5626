//! Hierarchical commands with declarative arguments and options.
//!
//! - [`Command`]: one command, built from a declaration string.
//! - [`CommandTree`]: a plugin's commands with parent/child linkage.
//! - [`CommandMatch`]: the typed bindings of a successful parse.

mod core;
pub mod declare;
pub mod option;
mod parse;
pub mod shortcut;
pub mod split;
mod tree;

pub use core::{ActionOutput, ActionResult, BoxedAction, Command};
pub use declare::{ArgKind, ArgSpec, ArgValue};
pub use option::{OptionSpec, OptionValue};
pub use parse::CommandMatch;
pub use shortcut::Shortcut;
pub use tree::CommandTree;
