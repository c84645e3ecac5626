//! Continuation-passing middleware.
//!
//! A middleware receives the [`MessageContext`] and a [`Next`] handle. It may:
//!
//! - return without calling `next` to short-circuit the rest of the chain,
//! - call `next.run(ctx).await` and post-process what comes back,
//! - or do both conditionally.
//!
//! ```rust,ignore
//! plugin.middleware(|ctx: MessageContext, next: Next| async move {
//!     let reply = next.run(ctx).await?;
//!     Ok(reply.map(|r| Reply::text(format!("{}-X", r.plain_text()))))
//! }, MiddlewareOptions::default());
//! ```
//!
//! A [`MiddlewareChain`] keeps its entries in a map keyed by [`MiddlewareId`],
//! so removal is O(1) and safe while the chain is running: every dispatch runs
//! over a snapshot taken before the first stage starts.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use weft_core::{BoxError, MessageScope, Reply};

use crate::context::MessageContext;
use crate::permission::PermissionGate;

/// What a middleware (and the terminal command stage) produces.
pub type MiddlewareResult = Result<Option<Reply>, BoxError>;

/// The stage the chain falls through to once every middleware called `next`.
pub(crate) type Terminal =
    Arc<dyn Fn(MessageContext) -> BoxFuture<'static, MiddlewareResult> + Send + Sync>;

// ─── Middleware trait ────────────────────────────────────────────────────────

/// A message-processing stage.
///
/// Implemented for every `Fn(MessageContext, Next) -> impl Future<Output =
/// MiddlewareResult>`, so plain async closures can be registered directly.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, ctx: MessageContext, next: Next) -> MiddlewareResult;
}

#[async_trait]
impl<F, Fut> Middleware for F
where
    F: Fn(MessageContext, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    async fn handle(&self, ctx: MessageContext, next: Next) -> MiddlewareResult {
        (self)(ctx, next).await
    }
}

// ─── MiddlewareId / MiddlewareOptions ────────────────────────────────────────

static NEXT_MIDDLEWARE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a registered middleware, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MiddlewareId(u64);

impl MiddlewareId {
    pub(crate) fn next() -> Self {
        Self(NEXT_MIDDLEWARE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Placement and filters for a middleware.
///
/// A stage whose filters reject the message is skipped as if it had called
/// `next` immediately.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareOptions {
    /// Run before everything currently registered instead of after.
    pub before: bool,
    /// Adapters the stage applies to. Empty means all.
    pub adapters: Vec<String>,
    /// Message scopes the stage applies to. Empty means all.
    pub scopes: Vec<MessageScope>,
    /// Permission predicates that must all pass.
    pub permissions: Vec<String>,
}

impl MiddlewareOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Front-insertion.
    pub fn before(mut self) -> Self {
        self.before = true;
        self
    }

    pub fn adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapters.push(adapter.into());
        self
    }

    pub fn scope(mut self, scope: MessageScope) -> Self {
        self.scopes.push(scope);
        self
    }

    pub fn permission(mut self, predicate: impl Into<String>) -> Self {
        self.permissions.push(predicate.into());
        self
    }

    fn is_unfiltered(&self) -> bool {
        self.adapters.is_empty() && self.scopes.is_empty() && self.permissions.is_empty()
    }
}

// ─── Stage ───────────────────────────────────────────────────────────────────

/// One entry of a chain snapshot.
#[derive(Clone)]
pub(crate) struct Stage {
    id: MiddlewareId,
    handler: Arc<dyn Middleware>,
    options: Arc<MiddlewareOptions>,
}

impl Stage {
    async fn applies(&self, ctx: &MessageContext, gate: &PermissionGate) -> bool {
        if self.options.is_unfiltered() {
            return true;
        }
        let message = ctx.message();
        if !self.options.adapters.is_empty()
            && !self.options.adapters.iter().any(|a| *a == message.adapter)
        {
            return false;
        }
        gate.allows(&self.options.permissions, &self.options.scopes, message)
            .await
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ─── MiddlewareChain ─────────────────────────────────────────────────────────

struct Entry {
    /// Negative for front-inserted entries, positive otherwise.
    order: i64,
    stage: Stage,
}

#[derive(Default)]
struct ChainState {
    entries: HashMap<MiddlewareId, Entry>,
    front: i64,
    back: i64,
    snapshot: Option<Arc<[Stage]>>,
}

/// An ordered, mutable list of middlewares.
#[derive(Default)]
pub struct MiddlewareChain {
    state: Mutex<ChainState>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends (or, with `options.before`, prepends) a middleware.
    pub fn add<M: Middleware>(&self, middleware: M, options: MiddlewareOptions) -> MiddlewareId {
        self.add_arc(Arc::new(middleware), options)
    }

    pub fn add_arc(&self, handler: Arc<dyn Middleware>, options: MiddlewareOptions) -> MiddlewareId {
        let id = MiddlewareId::next();
        self.add_with_id(id, handler, options);
        id
    }

    /// Adds under a caller-chosen id, replacing any entry that holds it.
    pub(crate) fn add_with_id(
        &self,
        id: MiddlewareId,
        handler: Arc<dyn Middleware>,
        options: MiddlewareOptions,
    ) {
        let mut state = self.state.lock();
        let order = if options.before {
            state.front -= 1;
            state.front
        } else {
            state.back += 1;
            state.back
        };
        state.entries.insert(
            id,
            Entry {
                order,
                stage: Stage {
                    id,
                    handler,
                    options: Arc::new(options),
                },
            },
        );
        state.snapshot = None;
    }

    /// Removes a middleware. Returns `false` if it was not registered.
    ///
    /// A dispatch already in flight keeps running over its own snapshot.
    pub fn remove(&self, id: MiddlewareId) -> bool {
        let mut state = self.state.lock();
        let removed = state.entries.remove(&id).is_some();
        if removed {
            state.snapshot = None;
        }
        removed
    }

    pub fn contains(&self, id: MiddlewareId) -> bool {
        self.state.lock().entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Ids in execution order.
    pub fn ids(&self) -> Vec<MiddlewareId> {
        self.snapshot().iter().map(|stage| stage.id).collect()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.snapshot = None;
    }

    /// The stages in execution order, cached until the next mutation.
    pub(crate) fn snapshot(&self) -> Arc<[Stage]> {
        let mut state = self.state.lock();
        if let Some(snapshot) = &state.snapshot {
            return Arc::clone(snapshot);
        }
        let mut entries: Vec<&Entry> = state.entries.values().collect();
        entries.sort_by_key(|entry| entry.order);
        let snapshot: Arc<[Stage]> = entries.into_iter().map(|e| e.stage.clone()).collect();
        state.snapshot = Some(Arc::clone(&snapshot));
        snapshot
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.len())
            .finish()
    }
}

// ─── Next ────────────────────────────────────────────────────────────────────

/// The rest of the chain, handed to each middleware.
///
/// Consumed by [`run`](Self::run); a middleware can call onward at most once.
pub struct Next {
    stages: Arc<[Stage]>,
    index: usize,
    terminal: Terminal,
}

impl Next {
    pub(crate) fn new(stages: Arc<[Stage]>, terminal: Terminal) -> Self {
        Self {
            stages,
            index: 0,
            terminal,
        }
    }

    /// Runs the remaining stages, ending with the command stage.
    pub fn run(self, ctx: MessageContext) -> BoxFuture<'static, MiddlewareResult> {
        async move {
            let host = ctx.host().clone();
            let gate = host.permissions();
            let mut index = self.index;
            while let Some(stage) = self.stages.get(index) {
                if stage.applies(&ctx, gate).await {
                    let next = Next {
                        stages: Arc::clone(&self.stages),
                        index: index + 1,
                        terminal: Arc::clone(&self.terminal),
                    };
                    return stage.handler.handle(ctx, next).await;
                }
                index += 1;
            }
            (self.terminal)(ctx).await
        }
        .boxed()
    }

    /// Number of stages not yet run.
    pub fn remaining(&self) -> usize {
        self.stages.len().saturating_sub(self.index)
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("stages", &self.stages.len())
            .finish()
    }
}
