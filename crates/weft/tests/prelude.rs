//! End-to-end use of the facade: a plugin that waits for a service another
//! plugin provides, behind a host-level middleware.

use std::sync::Arc;

use weft::prelude::*;

struct Greeter {
    greeting: String,
}

fn greeting_plugin() -> Plugin {
    Plugin::builder()
        .id("greet")
        .setup(|plugin: Plugin| async move {
            plugin
                .wait_for(["greeter"], |host: PluginManager| async move {
                    let greet = host.plugin("greet").ok_or("greet plugin vanished")?;
                    greet
                        .command(Command::new("greet <name:string>")?.action(
                            |ctx: CommandContext| async move {
                                let greeter = ctx.service::<Greeter>("greeter")?;
                                let name = ctx.arg("name").and_then(ArgValue::as_str).unwrap_or("you");
                                Ok::<_, BoxError>(format!("{}, {name}!", greeter.greeting))
                            },
                        ))
                        .await?;
                    Ok::<(), BoxError>(())
                })
                .await;
            Ok::<(), BoxError>(())
        })
        .build()
}

fn provider_plugin() -> Plugin {
    Plugin::builder()
        .id("greeter-provider")
        .setup(|plugin: Plugin| async move {
            plugin
                .provide(
                    "greeter",
                    Arc::new(Greeter {
                        greeting: "Hello".to_string(),
                    }),
                )
                .await;
            Ok::<(), BoxError>(())
        })
        .build()
}

#[tokio::test]
async fn greet_waits_for_provider() {
    let runtime = WeftRuntime::from_config(HostConfig::default());
    runtime.manager().middleware(
        |ctx: MessageContext, next: Next| async move {
            let reply = next.run(ctx).await?;
            Ok::<_, BoxError>(reply.map(|r| Reply::text(format!("[bot] {}", r.plain_text()))))
        },
        MiddlewareOptions::new(),
    );

    runtime.register_plugin(greeting_plugin());
    runtime.start().await.unwrap();

    let message = || Message::new("qq", "bot", MessageScope::Group, "greet Ada");
    assert_eq!(runtime.handle_message(message()).await, None);

    runtime.mount(&provider_plugin()).await.unwrap();
    assert_eq!(
        runtime.handle_message(message()).await,
        Some(Reply::text("[bot] Hello, Ada!"))
    );
}
