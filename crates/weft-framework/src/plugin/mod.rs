//! Plugins and their lifecycle.
//!
//! A [`Plugin`] bundles commands, middlewares, contributed services, event
//! listeners and deferred callbacks under one mount lifecycle. Everything it
//! registers is paired with a disposer that runs on unmount, and comes back on
//! the next mount by one of two routes:
//!
//! - registrations made by the [`setup`](PluginBuilder::setup) function are
//!   recreated by running it again;
//! - everything else (commands, middlewares, services and `wait_for` gates
//!   added directly on the handle) is recorded on the plugin and replayed.
//!
//! Event listeners added with [`Plugin::on`] are the exception: they need a
//! host and last for one mount.
//!
//! ```rust,ignore
//! use weft::prelude::*;
//!
//! let echo = Plugin::builder()
//!     .id("echo")
//!     .setup(|plugin| async move {
//!         plugin
//!             .command(Command::new("echo <text:text>")?.action(|ctx: CommandContext| async move {
//!                 ctx.arg("text").map(|v| v.to_string())
//!             }))
//!             .await?;
//!         Ok(())
//!     })
//!     .build();
//!
//! host.mount(&echo).await?;
//! ```
//!
//! # Service gates
//!
//! ```rust,ignore
//! plugin.wait_for(["database"], |host| async move {
//!     let db = host.service::<Database>("database")?;
//!     db.migrate().await?;
//!     Ok(())
//! }).await;
//! ```
//!
//! # Ids
//!
//! Ids are explicit. A loader that knows where a plugin came from derives one
//! with [`InstallRoots`]; plugins without an id get `anonymous_<n>` on mount.

// ─── Submodules ──────────────────────────────────────────────────────────────
pub mod core;
pub mod gate;
pub mod id;

// ─── Re-exports from submodules ──────────────────────────────────────────────
pub use core::{
    DEFAULT_PRIORITY, Disposer, Plugin, PluginBuilder, PluginStatus, SetupFn, UnmountReport,
};
pub use gate::{GateCallback, ServiceCallbackInfo};
pub use id::InstallRoots;
