//! The built-in `manage` plugin.
//!
//! | Command | Permission | Effect |
//! |---------|------------|--------|
//! | `help [command]` | | lists visible commands, or one command's usage |
//! | `status` | | host summary and uptime |
//! | `plugin` | | hidden; lists the `plugin.*` commands |
//! | `plugin.list` | | mounted plugins with their status |
//! | `plugin.enable <name>` | `master` | removes `name` from `disable_plugins` |
//! | `plugin.disable <name>` | `master` | adds `name` to `disable_plugins` |
//!
//! Enabling and disabling go through [`ConfigStore::set`] and are saved right
//! away when the store has a backing file.

use std::sync::Arc;
use std::time::{Duration, Instant};

use weft_core::BoxError;
use weft_framework::{
    ArgValue, Command, CommandContext, CommandError, Plugin, PluginStatus,
};

use crate::config::{ConfigResult, ConfigStore};
use crate::runtime::set_plugin_enabled;

/// Id of the built-in plugin.
pub const MANAGE_PLUGIN_ID: &str = "weft-plugin-manage";

/// Builds the `manage` plugin around the runtime's config store.
pub fn manage_plugin(store: Arc<ConfigStore>, started_at: Instant) -> Plugin {
    Plugin::builder()
        .id(MANAGE_PLUGIN_ID)
        .name("manage")
        .desc("Host status and plugin management")
        .setup(move |plugin: Plugin| {
            let store = Arc::clone(&store);
            async move {
                register(&plugin, store, started_at).await?;
                Ok::<(), BoxError>(())
            }
        })
        .build()
}

async fn register(
    plugin: &Plugin,
    store: Arc<ConfigStore>,
    started_at: Instant,
) -> Result<(), CommandError> {
    plugin
        .command(
            Command::new("help [command:string]")?
                .desc("List available commands")
                .action(|ctx: CommandContext| async move { help(&ctx) }),
        )
        .await?;
    plugin
        .command(
            Command::new("status")?
                .desc("Show host status")
                .action(move |ctx: CommandContext| async move { status(&ctx, started_at) }),
        )
        .await?;
    plugin
        .command(
            Command::new("plugin")?
                .hidden()
                .desc("Plugin management")
                .action(|ctx: CommandContext| async move { subcommands(&ctx, "plugin") }),
        )
        .await?;
    plugin
        .command(
            Command::new("plugin.list")?
                .desc("List mounted plugins")
                .action(|ctx: CommandContext| async move { plugin_list(&ctx) }),
        )
        .await?;

    for (name, enabled, desc) in [
        ("plugin.enable", true, "Enable a plugin"),
        ("plugin.disable", false, "Disable a plugin"),
    ] {
        let store = Arc::clone(&store);
        plugin
            .command(
                Command::new(&format!("{name} <name:string>"))?
                    .desc(desc)
                    .permission("master")
                    .action(move |ctx: CommandContext| {
                        let store = Arc::clone(&store);
                        async move { toggle(&ctx, &store, enabled) }
                    }),
            )
            .await?;
    }
    Ok(())
}

fn describe(command: &Command) -> String {
    if command.description().is_empty() {
        command.usage()
    } else {
        format!("{}  {}", command.usage(), command.description())
    }
}

/// Plugins that would see the current message.
fn active_plugins(ctx: &CommandContext) -> Vec<Plugin> {
    let adapter = &ctx.message().adapter;
    ctx.host()
        .plugins()
        .into_iter()
        .filter(|p| p.status() == PluginStatus::Enabled && p.supports_adapter(adapter))
        .collect()
}

fn help(ctx: &CommandContext) -> String {
    let plugins = active_plugins(ctx);

    if let Some(name) = ctx.arg("command").and_then(ArgValue::as_str) {
        return plugins
            .iter()
            .find_map(|p| p.find_command(name))
            .map(|command| describe(&command))
            .unwrap_or_else(|| format!("No command named '{name}'"));
    }

    let lines: Vec<String> = plugins
        .iter()
        .flat_map(Plugin::visible_commands)
        .map(|command| describe(&command))
        .collect();
    if lines.is_empty() {
        "No commands available".to_string()
    } else {
        lines.join("\n")
    }
}

fn subcommands(ctx: &CommandContext, parent: &str) -> Option<String> {
    let plugin = ctx.host().plugin(ctx.plugin_id())?;
    let lines: Vec<String> = plugin.with_commands(|tree| {
        tree.children_of(parent)
            .iter()
            .filter_map(|name| tree.get(name))
            .map(|command| describe(command))
            .collect()
    });
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn status(ctx: &CommandContext, started_at: Instant) -> String {
    let host = ctx.host();
    let plugins = host.plugins();
    let disabled = plugins
        .iter()
        .filter(|p| p.status() == PluginStatus::Disabled)
        .count();
    let commands: usize = plugins.iter().map(|p| p.command_list().len()).sum();

    [
        format!("Weft v{}", env!("CARGO_PKG_VERSION")),
        format!("Adapter: {}", ctx.message().adapter),
        format!("Plugins: {} ({disabled} disabled)", plugins.len()),
        format!("Commands: {commands}"),
        format!("Services: {}", host.services().len()),
        format!("Uptime: {}", format_uptime(started_at.elapsed())),
    ]
    .join("\n")
}

fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (days, hours, minutes, seconds) =
        (secs / 86_400, secs / 3_600 % 24, secs / 60 % 60, secs % 60);
    match (days, hours, minutes) {
        (0, 0, 0) => format!("{seconds}s"),
        (0, 0, _) => format!("{minutes}m {seconds}s"),
        (0, _, _) => format!("{hours}h {minutes}m {seconds}s"),
        _ => format!("{days}d {hours}h {minutes}m {seconds}s"),
    }
}

fn plugin_list(ctx: &CommandContext) -> String {
    ctx.host()
        .plugins()
        .iter()
        .enumerate()
        .map(|(i, p)| {
            format!(
                "{} {}({}) {}",
                i + 1,
                p.display_name(),
                p.id().unwrap_or_default(),
                p.status_text()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn toggle(ctx: &CommandContext, store: &ConfigStore, enabled: bool) -> ConfigResult<String> {
    let Some(id) = ctx.arg("name").and_then(ArgValue::as_str) else {
        return Ok("Missing plugin name".to_string());
    };
    let host = ctx.host();
    if host.plugin(id).is_none() {
        return Ok(format!("Plugin '{id}' is not mounted"));
    }
    if !enabled && id == ctx.plugin_id() {
        return Ok("The manage plugin cannot disable itself".to_string());
    }

    let changed = set_plugin_enabled(store, host, id, enabled)?;
    Ok(match (changed, enabled) {
        (true, true) => format!("Plugin '{id}' enabled"),
        (true, false) => format!("Plugin '{id}' disabled"),
        (false, true) => format!("Plugin '{id}' is already enabled"),
        (false, false) => format!("Plugin '{id}' is already disabled"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WeftRuntime;
    use crate::config::{ConfigLoader, HostConfig};
    use weft_core::{Message, MessageScope, Reply, Sender};

    fn from(user: &str, text: &str) -> Message {
        let sender = if user == "owner" {
            Sender::new(user).permission("master")
        } else {
            Sender::new(user)
        };
        Message::new("qq", "bot", MessageScope::Private, text).sender(sender)
    }

    async fn ask(runtime: &WeftRuntime, user: &str, text: &str) -> Option<String> {
        runtime
            .handle_message(from(user, text))
            .await
            .and_then(|reply| reply.as_text().map(str::to_string))
    }

    async fn started(config: HostConfig) -> WeftRuntime {
        let runtime = WeftRuntime::from_config(config);
        let echo = Plugin::builder()
            .id("echo")
            .name("Echo")
            .setup(|plugin: Plugin| async move {
                plugin
                    .command(
                        Command::new("echo <text:text>")?
                            .desc("Repeat text")
                            .action(|ctx: CommandContext| async move {
                                ctx.arg("text").and_then(ArgValue::as_str).map(str::to_string)
                            }),
                    )
                    .await?;
                Ok::<(), BoxError>(())
            })
            .build();
        runtime.register_plugin(echo);
        runtime.start().await.unwrap();
        runtime
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(5)), "5s");
        assert_eq!(format_uptime(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_uptime(Duration::from_secs(3_725)), "1h 2m 5s");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 1h 1m 1s");
    }

    #[tokio::test]
    async fn test_help_lists_visible_commands() {
        let runtime = started(HostConfig::default()).await;

        let help = ask(&runtime, "anyone", "help").await.unwrap();
        assert!(help.contains("help [command:string]  List available commands"));
        assert!(help.contains("plugin.list  List mounted plugins"));
        assert!(help.contains("echo <text:text>  Repeat text"));
        assert!(!help.lines().any(|l| l.starts_with("plugin  ")));

        assert_eq!(
            ask(&runtime, "anyone", "help status").await.as_deref(),
            Some("status  Show host status")
        );
        assert_eq!(
            ask(&runtime, "anyone", "help nope").await.as_deref(),
            Some("No command named 'nope'")
        );
    }

    #[tokio::test]
    async fn test_plugin_parent_lists_children() {
        let runtime = started(HostConfig::default()).await;
        let listing = ask(&runtime, "anyone", "plugin").await.unwrap();
        assert_eq!(listing.lines().count(), 3);
        assert!(listing.contains("plugin.disable <name:string>"));
    }

    #[tokio::test]
    async fn test_disable_requires_master() {
        let runtime = started(HostConfig::default()).await;

        assert_eq!(ask(&runtime, "guest", "plugin.disable echo").await, None);
        assert_eq!(
            ask(&runtime, "guest", "echo still here").await.as_deref(),
            Some("still here")
        );

        assert_eq!(
            ask(&runtime, "owner", "plugin.disable echo").await.as_deref(),
            Some("Plugin 'echo' disabled")
        );
        assert_eq!(ask(&runtime, "guest", "echo gone").await, None);
        assert_eq!(runtime.config().get().disable_plugins, vec!["echo"]);

        let list = ask(&runtime, "guest", "plugin.list").await.unwrap();
        assert!(list.contains("Echo(echo) ❌"));
        assert!(list.contains("manage(weft-plugin-manage) ✅"));

        let status = ask(&runtime, "guest", "status").await.unwrap();
        assert!(status.contains("Plugins: 2 (1 disabled)"));
        assert!(status.contains("Adapter: qq"));

        assert_eq!(
            ask(&runtime, "owner", "plugin.disable echo").await.as_deref(),
            Some("Plugin 'echo' is already disabled")
        );
        assert_eq!(
            ask(&runtime, "owner", "plugin.enable echo").await.as_deref(),
            Some("Plugin 'echo' enabled")
        );
        assert_eq!(ask(&runtime, "guest", "echo back").await.as_deref(), Some("back"));
    }

    #[tokio::test]
    async fn test_toggle_guards() {
        let runtime = started(HostConfig::default()).await;
        assert_eq!(
            ask(&runtime, "owner", "plugin.disable ghost").await.as_deref(),
            Some("Plugin 'ghost' is not mounted")
        );
        assert_eq!(
            ask(&runtime, "owner", "plugin.disable weft-plugin-manage").await.as_deref(),
            Some("The manage plugin cannot disable itself")
        );
    }

    #[tokio::test]
    async fn test_disable_is_saved_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weft.json");
        std::fs::write(&path, "{}").unwrap();

        let runtime = WeftRuntime::builder()
            .config_file(&path)
            .without_env()
            .build()
            .unwrap();
        runtime.register_plugin(Plugin::new("echo"));
        runtime.start().await.unwrap();

        let reply = runtime.handle_message(from("owner", "plugin.disable echo")).await;
        assert_eq!(reply, Some(Reply::text("Plugin 'echo' disabled")));
        assert!(!runtime.config().is_dirty());

        let saved = ConfigLoader::new().file(&path).without_env().load().unwrap();
        assert_eq!(saved.disable_plugins, vec!["echo"]);
    }
}
