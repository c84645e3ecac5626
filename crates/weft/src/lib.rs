//! # Weft
//!
//! A host for chat-bot plugins. Plugins register commands, middlewares and
//! event listeners, and can depend on capabilities ("services") that other
//! plugins provide, possibly later.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ Message ┌─────────────┐      ┌───────────────────────────────┐
//! │   Adapter   │────────▶│ WeftRuntime │─────▶│ host middlewares              │
//! │  (external) │◀────────│             │      │ plugin middlewares (priority) │
//! └─────────────┘  Reply  └─────────────┘      │ first matching command        │
//!                           │ ConfigStore      └───────────────────────────────┘
//!                           │ PluginManager ── ServiceRegistry ── EventBus
//! ```
//!
//! - **`weft-core`**: messages, replies, host events, the service registry
//! - **`weft-framework`**: plugins, commands, permissions, middleware, dispatch
//! - **`weft-runtime`**: configuration, logging, the runtime and the `manage` plugin
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use weft::prelude::*;
//!
//! let dice = Plugin::builder()
//!     .id("dice")
//!     .setup(|plugin: Plugin| async move {
//!         plugin
//!             .command(Command::new("roll <sides:number>")?.action(|ctx: CommandContext| async move {
//!                 format!("rolled a d{}", ctx.arg("sides").and_then(ArgValue::as_number).unwrap_or(6.0))
//!             }))
//!             .await?;
//!         Ok::<(), BoxError>(())
//!     })
//!     .build();
//!
//! let runtime = WeftRuntime::builder().plugin(dice).build()?;
//! runtime.run().await?;
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML config files
//! - `yaml-config` *(default)*: YAML config files
//! - `json-log`: JSON log records

pub use weft_core as core;
pub use weft_framework as framework;
pub use weft_runtime as runtime;

/// Commonly used types for writing plugins and embedding the host.
///
/// ```rust,ignore
/// use weft::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use weft_runtime::{ConfigStore, HostConfig, RuntimeBuilder, WeftRuntime};

    // Plugins and the host
    pub use weft_framework::{Plugin, PluginBuilder, PluginManager, PluginStatus};

    // Commands
    pub use weft_framework::{ArgValue, Command, CommandContext, Shortcut};

    // Middleware
    pub use weft_framework::{MessageContext, MiddlewareOptions, MiddlewareResult, Next};

    // Messages, events and services
    pub use weft_core::{
        BoxError, Element, HostEvent, Message, MessageScope, Reply, Sender, ServiceArc,
    };

    // Logging macros
    pub use weft_runtime::prelude::*;
}
