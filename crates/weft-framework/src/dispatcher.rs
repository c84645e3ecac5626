//! Message dispatch.
//!
//! One inbound message becomes zero or one reply:
//!
//! 1. The host's middlewares run, then those of every enabled plugin that
//!    accepts the message's adapter, plugins in priority order.
//! 2. If every middleware calls `next`, the command stage walks the same
//!    plugins in the same order and tries each command's parser.
//! 3. The first command that parses and passes its permission and scope
//!    checks claims the message. Its actions run in order until one returns
//!    a reply.
//!
//! A claimed command whose actions all return nothing still ends the search;
//! lower-priority commands are not tried.

use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{Instrument, Level, debug, span, trace};
use weft_core::{BoxError, Message, Reply};

use crate::context::{CommandContext, MessageContext};
use crate::error::{DispatchError, DispatchResult};
use crate::manager::PluginManager;
use crate::middleware::{MiddlewareResult, Next, Stage, Terminal};
use crate::plugin::Plugin;

/// The result of dispatching one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    /// What should be sent back, if anything.
    pub reply: Option<Reply>,
    /// The command that claimed the message, if the command stage was reached
    /// and one matched.
    pub command: Option<String>,
}

impl DispatchOutcome {
    /// `true` if a command claimed the message.
    pub fn is_claimed(&self) -> bool {
        self.command.is_some()
    }

    pub fn into_reply(self) -> Option<Reply> {
        self.reply
    }
}

/// Glues middleware chains, command trees and the permission gate together.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    host: PluginManager,
}

impl Dispatcher {
    pub fn new(host: PluginManager) -> Self {
        Self { host }
    }

    /// Dispatches a message.
    ///
    /// # Errors
    ///
    /// Action and middleware failures are returned unchanged for the caller
    /// to log. Non-matches are not errors.
    pub async fn dispatch(&self, message: Message) -> DispatchResult<DispatchOutcome> {
        self.dispatch_arc(Arc::new(message)).await
    }

    pub(crate) async fn dispatch_arc(&self, message: Arc<Message>) -> DispatchResult<DispatchOutcome> {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            adapter = %message.adapter,
            bot = %message.bot
        );
        self.run(message).instrument(span).await
    }

    async fn run(&self, message: Arc<Message>) -> DispatchResult<DispatchOutcome> {
        let plugins: Arc<[Plugin]> = self.host.dispatch_order(&message.adapter).into();

        let stages: Arc<[Stage]> = self
            .host
            .middleware_snapshot()
            .iter()
            .cloned()
            .chain(
                plugins
                    .iter()
                    .flat_map(|plugin| plugin.middleware_snapshot().to_vec()),
            )
            .collect();

        let claimed: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let terminal: Terminal = {
            let plugins = Arc::clone(&plugins);
            let claimed = Arc::clone(&claimed);
            Arc::new(move |ctx: MessageContext| {
                let plugins = Arc::clone(&plugins);
                let claimed = Arc::clone(&claimed);
                async move { run_commands(ctx, &plugins, &claimed).await }.boxed()
            })
        };

        trace!(stages = stages.len(), plugins = plugins.len(), "Running middleware chain");
        let ctx = MessageContext::new(message, self.host.clone());
        let reply = Next::new(stages, terminal)
            .run(ctx)
            .await
            .map_err(DispatchError::from_chain)?;

        let command = claimed.lock().take();
        Ok(DispatchOutcome { reply, command })
    }
}

/// The terminal stage: first matching, permitted command wins.
async fn run_commands(
    ctx: MessageContext,
    plugins: &[Plugin],
    claimed: &Mutex<Option<String>>,
) -> MiddlewareResult {
    let gate = ctx.host().permissions();
    let text = ctx.message().text();

    for plugin in plugins {
        let Some(plugin_id) = plugin.id() else {
            continue;
        };
        for command in plugin.command_list() {
            let Some(matched) = command.parse(text) else {
                continue;
            };
            if !gate.allows_command(&command, ctx.message()).await {
                trace!(plugin = %plugin_id, command = %command.name(), "Command not permitted");
                continue;
            }

            debug!(plugin = %plugin_id, command = %command.name(), "Command matched");
            *claimed.lock() = Some(command.name().to_string());
            let cmd_ctx = CommandContext::new(ctx.clone(), Arc::from(plugin_id.as_str()), matched);
            return command.execute(cmd_ctx).await.map_err(|source| {
                Box::new(DispatchError::Action {
                    command: command.name().to_string(),
                    source,
                }) as BoxError
            });
        }
    }
    Ok(None)
}
