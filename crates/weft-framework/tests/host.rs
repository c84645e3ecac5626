//! End-to-end behaviour of a host with plugins mounted.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use weft_core::{BoxError, CommandAdd, Message, MessageScope, PluginBeforeUnmount, Reply};
use weft_framework::{
    Command, CommandContext, MessageContext, MiddlewareOptions, Next, Plugin, PluginError,
    PluginManager,
};

fn message(adapter: &str, text: &str) -> Message {
    Message::new(adapter, "bot", MessageScope::Group, text)
}

async fn reply_of(host: &PluginManager, adapter: &str, text: &str) -> Option<String> {
    host.dispatch(message(adapter, text))
        .await
        .unwrap()
        .reply
        .map(|r| r.plain_text())
}

#[tokio::test]
async fn remount_restores_commands_middlewares_and_services() {
    let host = PluginManager::new();
    let plugin = Plugin::builder()
        .id("stateful")
        .setup(|plugin| async move {
            plugin
                .command(Command::new("ping")?.action(|_ctx: CommandContext| async { "pong" }))
                .await?;
            plugin
                .command(Command::new("ping.loud")?.action(|_ctx: CommandContext| async { "PONG" }))
                .await?;
            plugin.middleware(|c: MessageContext, n: Next| n.run(c), MiddlewareOptions::default());
            plugin.provide("counter", Arc::new(AtomicUsize::new(0))).await;
            Ok::<(), BoxError>(())
        })
        .build();

    host.mount(&plugin).await.unwrap();
    let snapshot = || {
        let commands: Vec<String> = plugin
            .command_list()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        (commands, plugin.middleware_count(), plugin.service_names())
    };
    let before = snapshot();
    assert_eq!(before.0, vec!["ping", "ping.loud"]);
    assert!(host.services().contains("counter"));

    let report = plugin.unmount().await.unwrap();
    assert!(report.is_clean());
    assert!(plugin.command_list().is_empty());
    assert_eq!(plugin.middleware_count(), 0);
    assert!(!host.services().contains("counter"));

    host.mount(&plugin).await.unwrap();
    assert_eq!(snapshot(), before);
    assert!(host.services().contains("counter"));
    assert_eq!(reply_of(&host, "qq", "ping").await.as_deref(), Some("pong"));
}

#[tokio::test]
async fn remount_restores_registrations_made_outside_setup() {
    let host = PluginManager::new();
    let plugin = Plugin::new("declared");
    plugin
        .command(Command::new("ping").unwrap().action(|_ctx: CommandContext| async { "pong" }))
        .await
        .unwrap();
    plugin.provide("clock", Arc::new(7u64)).await;

    host.mount(&plugin).await.unwrap();
    let shout = plugin.middleware(
        |ctx: MessageContext, next: Next| async move {
            let reply = next.run(ctx).await?;
            Ok::<_, BoxError>(reply.map(|r| Reply::text(r.plain_text().to_uppercase())))
        },
        MiddlewareOptions::default(),
    );
    assert_eq!(reply_of(&host, "qq", "ping").await.as_deref(), Some("PONG"));

    plugin.unmount().await.unwrap();
    assert!(plugin.command_list().is_empty());
    assert_eq!(plugin.middleware_count(), 0);
    assert!(!host.services().contains("clock"));

    host.mount(&plugin).await.unwrap();
    assert_eq!(plugin.command_list().len(), 1);
    assert_eq!(plugin.middleware_count(), 1);
    assert_eq!(plugin.service_names(), vec!["clock"]);
    assert_eq!(*host.service::<u64>("clock").unwrap(), 7);
    assert_eq!(reply_of(&host, "qq", "ping").await.as_deref(), Some("PONG"));

    assert!(plugin.remove_middleware(shout));
    assert!(plugin.remove_command("ping").await.is_some());
    plugin.unmount().await.unwrap();
    host.mount(&plugin).await.unwrap();
    assert!(plugin.command_list().is_empty());
    assert_eq!(plugin.middleware_count(), 0);
    assert!(host.services().contains("clock"));
}

#[tokio::test]
async fn pending_gate_survives_remount() {
    let host = PluginManager::new();
    let plugin = Plugin::new("consumer");
    host.mount(&plugin).await.unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let consumer = plugin.clone();
    plugin
        .wait_for(["db"], move |_host| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            consumer
                .command(Command::new("query")?.action(|_ctx: CommandContext| async { "rows" }))
                .await?;
            Ok::<(), BoxError>(())
        })
        .await;
    assert_eq!(plugin.pending_gates(), 1);

    plugin.unmount().await.unwrap();
    assert_eq!(plugin.pending_gates(), 1);
    host.mount(&plugin).await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    host.provide("db", Arc::new(1u32)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(plugin.pending_gates(), 0);
    assert_eq!(reply_of(&host, "qq", "query").await.as_deref(), Some("rows"));

    plugin.unmount().await.unwrap();
    host.mount(&plugin).await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1, "a fired gate never re-arms");
    assert_eq!(reply_of(&host, "qq", "query").await.as_deref(), Some("rows"));
}

#[tokio::test]
async fn setup_gates_are_not_duplicated_by_remount() {
    let host = PluginManager::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let plugin = Plugin::builder()
        .id("setup-consumer")
        .setup(move |plugin: Plugin| {
            let counter = Arc::clone(&counter);
            async move {
                let owner = plugin.clone();
                plugin
                    .wait_for(["db"], move |_host| async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        owner
                            .command(Command::new("query")?.action(|_ctx: CommandContext| async { "rows" }))
                            .await?;
                        Ok::<(), BoxError>(())
                    })
                    .await;
                Ok::<(), BoxError>(())
            }
        })
        .build();

    host.mount(&plugin).await.unwrap();
    plugin.unmount().await.unwrap();
    host.mount(&plugin).await.unwrap();
    assert_eq!(plugin.pending_gates(), 1);

    host.provide("db", Arc::new(1u32)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    plugin.unmount().await.unwrap();
    host.mount(&plugin).await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 2, "setup re-registers its gate on every mount");
    assert_eq!(plugin.command_list().len(), 1);
    assert_eq!(reply_of(&host, "qq", "query").await.as_deref(), Some("rows"));
}

#[tokio::test]
async fn service_gate_fires_once_after_last_service() {
    let host = PluginManager::new();
    let plugin = Plugin::new("consumer");
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&fired);
    plugin
        .wait_for(["db", "cache", "http"], move |_host| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
    assert_eq!(plugin.need_services(), vec!["cache", "db", "http"]);

    host.provide("db", Arc::new(1u32)).await;
    host.provide("cache", Arc::new(2u32)).await;
    host.provide("http", Arc::new(3u32)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0, "plugin is not mounted yet");

    host.mount(&plugin).await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    host.remove_service("http");
    host.provide("http", Arc::new(4u32)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(plugin.pending_gates(), 0);
}

#[tokio::test]
async fn service_gate_waits_for_every_service() {
    let host = PluginManager::new();
    let plugin = Plugin::new("consumer");
    host.mount(&plugin).await.unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    plugin
        .wait_for(["a", "b"], move |host| async move {
            assert!(host.services().contains("a") && host.services().contains("b"));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

    host.provide("a", Arc::new(())).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    let provider = Plugin::new("provider");
    host.mount(&provider).await.unwrap();
    provider.provide("b", Arc::new(())).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    provider.provide("b", Arc::new(())).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn command_tree_parent_linkage() {
    let host = PluginManager::new();
    let plugin = Plugin::new("tree");
    host.mount(&plugin).await.unwrap();

    plugin.command(Command::new("x.y.z").unwrap()).await.unwrap();
    plugin.command(Command::new("a.b").unwrap()).await.unwrap();
    plugin.command(Command::new("a.b.c").unwrap()).await.unwrap();

    plugin.with_commands(|tree| {
        assert_eq!(tree.parent_of("a.b.c"), Some("a.b"));
        assert_eq!(tree.parent_of("x.y.z"), None);
        assert_eq!(tree.children_of("a.b").to_vec(), vec!["a.b.c".to_string()]);
    });
    assert!(plugin.find_command("a.b.c").is_some());
    assert!(plugin.find_command("a").is_none());
}

#[tokio::test]
async fn middleware_after_next_post_processes_reply() {
    let host = PluginManager::new();
    let plugin = Plugin::new("mw");
    host.mount(&plugin).await.unwrap();

    plugin.middleware(
        |ctx: MessageContext, next: Next| async move {
            let reply = next.run(ctx).await?;
            Ok::<_, BoxError>(reply.map(|r| Reply::text(format!("{}-X", r.plain_text()))))
        },
        MiddlewareOptions::default(),
    );
    plugin.middleware(
        |_ctx: MessageContext, _next: Next| async move { Ok(Some(Reply::text("ok"))) },
        MiddlewareOptions::default(),
    );

    assert_eq!(reply_of(&host, "qq", "whatever").await.as_deref(), Some("ok-X"));
}

#[tokio::test]
async fn actions_run_until_first_reply() {
    let host = PluginManager::new();
    let plugin = Plugin::new("actions");
    host.mount(&plugin).await.unwrap();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let (c1, c2, c3, c4) = (
        Arc::clone(&calls),
        Arc::clone(&calls),
        Arc::clone(&calls),
        Arc::clone(&calls),
    );
    plugin
        .command(
            Command::new("two")
                .unwrap()
                .action(move |_ctx: CommandContext| {
                    let calls = Arc::clone(&c1);
                    async move { calls.lock().push("A1") }
                })
                .action(move |_ctx: CommandContext| {
                    let calls = Arc::clone(&c2);
                    async move {
                        calls.lock().push("A2");
                        "done"
                    }
                }),
        )
        .await
        .unwrap();
    plugin
        .command(
            Command::new("first")
                .unwrap()
                .action(move |_ctx: CommandContext| {
                    let calls = Arc::clone(&c3);
                    async move {
                        calls.lock().push("B1");
                        "first"
                    }
                })
                .action(move |_ctx: CommandContext| {
                    let calls = Arc::clone(&c4);
                    async move {
                        calls.lock().push("B2");
                        "second"
                    }
                }),
        )
        .await
        .unwrap();

    assert_eq!(reply_of(&host, "qq", "two").await.as_deref(), Some("done"));
    assert_eq!(*calls.lock(), vec!["A1", "A2"]);

    calls.lock().clear();
    assert_eq!(reply_of(&host, "qq", "first").await.as_deref(), Some("first"));
    assert_eq!(*calls.lock(), vec!["B1"]);
}

#[tokio::test]
async fn permission_mismatch_yields_nothing() {
    let host = PluginManager::new();
    let plugin = Plugin::new("discord-only");
    host.mount(&plugin).await.unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    plugin
        .command(
            Command::new("hello")
                .unwrap()
                .permission("adapter(discord)")
                .action(move |_ctx: CommandContext| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { "hi" }
                }),
        )
        .await
        .unwrap();

    let outcome = host.dispatch(message("telegram", "hello")).await.unwrap();
    assert_eq!(outcome.reply, None);
    assert!(!outcome.is_claimed());
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    assert_eq!(reply_of(&host, "discord", "hello").await.as_deref(), Some("hi"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scope_mismatch_falls_through_to_next_command() {
    let host = PluginManager::new();
    let private = Plugin::builder().id("private").priority(5).build();
    let public = Plugin::new("public");
    host.mount(&private).await.unwrap();
    host.mount(&public).await.unwrap();

    private
        .command(
            Command::new("who")
                .unwrap()
                .scope(MessageScope::Private)
                .action(|_ctx: CommandContext| async { "private" }),
        )
        .await
        .unwrap();
    public
        .command(Command::new("who").unwrap().action(|_ctx: CommandContext| async { "public" }))
        .await
        .unwrap();

    assert_eq!(reply_of(&host, "qq", "who").await.as_deref(), Some("public"));
}

#[tokio::test]
async fn duplicate_ids_are_a_conflict() {
    let host = PluginManager::new();
    let first = Plugin::new("weft-plugin-echo");
    let second = Plugin::new("weft-plugin-echo");
    host.mount(&first).await.unwrap();

    let err = host.mount(&second).await.unwrap_err();
    assert!(matches!(err, PluginError::IdConflict { ref id } if id == "weft-plugin-echo"));
    assert!(host.plugin("weft-plugin-echo").unwrap().ptr_eq(&first));
    assert!(!second.is_mounted());
}

#[tokio::test]
async fn silent_command_still_claims_the_message() {
    let host = PluginManager::new();
    let high = Plugin::builder().id("high").priority(10).build();
    let low = Plugin::new("low");
    host.mount(&high).await.unwrap();
    host.mount(&low).await.unwrap();

    let low_runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&low_runs);
    high.command(Command::new("ask").unwrap().action(|_ctx: CommandContext| async {}))
        .await
        .unwrap();
    low.command(Command::new("ask").unwrap().action(move |_ctx: CommandContext| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { "answer" }
    }))
    .await
    .unwrap();

    let outcome = host.dispatch(message("qq", "ask")).await.unwrap();
    assert_eq!(outcome.reply, None);
    assert_eq!(outcome.command.as_deref(), Some("ask"));
    assert_eq!(low_runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn priority_decides_between_plugins() {
    let host = PluginManager::new();
    let early = Plugin::new("early");
    let late = Plugin::builder().id("late").priority(3).build();
    host.mount(&early).await.unwrap();
    host.mount(&late).await.unwrap();

    for (plugin, answer) in [(&early, "early"), (&late, "late")] {
        plugin
            .command(Command::new("who").unwrap().action(move |_ctx: CommandContext| async move { answer }))
            .await
            .unwrap();
    }
    assert_eq!(reply_of(&host, "qq", "who").await.as_deref(), Some("late"));

    host.set_disabled_plugins(["late"]);
    assert_eq!(reply_of(&host, "qq", "who").await.as_deref(), Some("early"));
}

#[tokio::test]
async fn failing_disposer_does_not_stop_the_rest() {
    let host = PluginManager::new();
    let plugin = Plugin::new("leaky");
    host.mount(&plugin).await.unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let o1 = Arc::clone(&order);
    plugin.on_dispose(move || o1.lock().push(1));
    plugin.on_dispose_async(|| async { Err::<(), BoxError>("socket already closed".into()) });
    let o3 = Arc::clone(&order);
    plugin.on_dispose(move || o3.lock().push(3));

    let report = plugin.unmount().await.unwrap();
    assert_eq!(report.disposed, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].to_string(), "socket already closed");
    assert_eq!(*order.lock(), vec![1, 3]);

    assert!(matches!(
        plugin.unmount().await,
        Err(PluginError::NotMounted { .. })
    ));
}

#[tokio::test]
async fn lifecycle_events_and_callbacks() {
    let host = PluginManager::new();
    let added = Arc::new(Mutex::new(Vec::new()));
    let unmounting = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&added);
    host.events().subscribe(move |event: CommandAdd| {
        let sink = Arc::clone(&sink);
        async move { sink.lock().push(event.command) }
    });
    let sink = Arc::clone(&unmounting);
    host.events().subscribe(move |event: PluginBeforeUnmount| {
        let sink = Arc::clone(&sink);
        async move { sink.lock().push(event.plugin) }
    });

    let plugin = Plugin::new("events");
    let mounted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&mounted);
    plugin
        .on_mounted(move |_host| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
    assert_eq!(mounted.load(Ordering::SeqCst), 0);

    host.mount(&plugin).await.unwrap();
    assert_eq!(mounted.load(Ordering::SeqCst), 1);

    let before = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&before);
    plugin.before_unmount(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    plugin.command(Command::new("hello").unwrap()).await.unwrap();
    assert_eq!(*added.lock(), vec!["hello".to_string()]);

    plugin.unmount().await.unwrap();
    assert_eq!(*unmounting.lock(), vec!["events".to_string()]);
    assert_eq!(before.load(Ordering::SeqCst), 1);

    host.mount(&plugin).await.unwrap();
    assert_eq!(mounted.load(Ordering::SeqCst), 1, "on_mounted fires at most once");
}

#[test]
fn registration_works_from_sync_code() {
    let plugin = Plugin::new("sync");
    tokio_test::block_on(async {
        plugin
            .command(Command::new("a").unwrap().desc("first"))
            .await
            .unwrap();
        plugin.command(Command::new("b").unwrap().hidden()).await.unwrap();
    });
    let visible: Vec<String> = plugin
        .visible_commands()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    assert_eq!(visible, vec!["a"]);
    assert_eq!(plugin.command_list().len(), 2);
}
