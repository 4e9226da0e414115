//! Echo Bot Example
//!
//! A console bot driving the Brass engine: every line typed on stdin becomes
//! a message event of one session, and replies are printed to stdout.
//!
//! # Commands
//!
//! ```text
//! /echo <text>   echo the text back (prefix from [plugins.echo])
//! /add           ask for two numbers, one message each, then add them
//! /whoami        show who the bot thinks you are
//! /secret        superusers only
//! ping           pong
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot -- --config demos/echo_bot/brass.toml
//! ```

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use brass::core::{ApiResult, Bot, BoxedBot, BoxedEvent, Event, EventType, Message};
use brass::prelude::*;
use brass::runtime::BrassRuntime;
use clap::Parser;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(about = "Talk to a Brass bot from the terminal")]
struct Args {
    /// Configuration file; searched in the current directory if omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// User id attached to every line.
    #[arg(short, long, default_value = "operator")]
    user: String,

    /// Session id attached to every line.
    #[arg(short, long, default_value = "console")]
    session: String,
}

// ============================================================================
// Console adapter
// ============================================================================

#[derive(Clone)]
struct ConsoleLine {
    text: Message,
    user: String,
    session: String,
}

impl Event for ConsoleLine {
    fn event_name(&self) -> &str {
        "message.console"
    }

    fn event_type(&self) -> EventType {
        EventType::Message
    }

    fn session_id(&self) -> Option<String> {
        Some(self.session.clone())
    }

    fn user_id(&self) -> Option<String> {
        Some(self.user.clone())
    }

    fn message(&self) -> Option<&Message> {
        Some(&self.text)
    }

    fn is_tome(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct ConsoleBot;

#[async_trait]
impl Bot for ConsoleBot {
    fn id(&self) -> &str {
        "console"
    }

    async fn call_api(&self, action: &str, params: Value) -> ApiResult<Value> {
        debug!(action, %params, "API call ignored by console bot");
        Ok(Value::Null)
    }

    async fn send(&self, _event: &dyn Event, message: Message) -> ApiResult<String> {
        println!("bot> {message}");
        Ok(String::new())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ============================================================================
// Plugins
// ============================================================================

#[derive(Default, Deserialize)]
struct EchoConfig {
    #[serde(default)]
    prefix: String,
}

/// `/echo`, with a reply prefix read from `[plugins.echo]`.
struct Echo;

impl Plugin for Echo {
    type Config = EchoConfig;

    fn name() -> &'static str {
        "echo"
    }

    fn setup(config: EchoConfig, dispatcher: &mut DispatcherBuilder) -> RegistrationResult<()> {
        let prefix = config.prefix;
        dispatcher.register(on_command("echo").priority(5).block(true).handle(
            move |state: State| {
                let prefix = prefix.clone();
                async move {
                    let text = state.get_str(keys::COMMAND_ARG).unwrap_or_default();
                    (!text.is_empty()).then(|| format!("{prefix}{text}"))
                }
            },
        ))?;
        Ok(())
    }
}

/// The display name of whoever sent the event.
struct Speaker;

impl Injectable for Speaker {
    type Output = String;

    fn provider() -> Provider {
        Provider::new(|event: BoxedEvent| async move {
            event.user_id().unwrap_or_else(|| "stranger".to_string())
        })
    }
}

struct A;

impl ArgKey for A {
    const KEY: &'static str = "a";
}

struct B;

impl ArgKey for B {
    const KEY: &'static str = "b";
}

fn parse_number(matcher: &MatcherHandle, key: &str) -> Option<i64> {
    matcher
        .get_arg(key)
        .and_then(|msg| msg.extract_plain_text().trim().parse().ok())
}

fn number_slot(
    key: &'static str,
) -> impl Fn(MatcherHandle) -> std::future::Ready<Outcome> + Clone + Send + Sync + 'static {
    move |matcher: MatcherHandle| {
        let outcome = match parse_number(&matcher, key) {
            Some(_) => Outcome::next(),
            None => Outcome::reject().with_reply("That is not a number, try again:"),
        };
        std::future::ready(outcome)
    }
}

fn conversation(dispatcher: &mut DispatcherBuilder) -> RegistrationResult<()> {
    dispatcher.register(
        on_command("add")
            .priority(5)
            .block(true)
            .got("a", "First number?", number_slot("a"))
            .got("b", "Second number?", number_slot("b"))
            .handle(|a: ArgPlainText<A>, b: ArgPlainText<B>| async move {
                let a: i64 = a.as_deref().and_then(|t| t.trim().parse().ok()).unwrap_or_default();
                let b: i64 = b.as_deref().and_then(|t| t.trim().parse().ok()).unwrap_or_default();
                Outcome::finish().with_reply(format!("{a} + {b} = {}", a + b))
            }),
    )?;

    dispatcher.register(
        on_command("whoami")
            .priority(5)
            .block(true)
            .handle(|speaker: Depends<Speaker>| async move {
                format!("You are {}", *speaker)
            }),
    )?;

    dispatcher.register(
        on_fullmatch(["ping"], true)
            .priority(5)
            .handle(|| async { "pong" }),
    )?;
    Ok(())
}

fn admin(dispatcher: &mut DispatcherBuilder) -> RegistrationResult<()> {
    dispatcher.register(
        on_command("secret")
            .priority(1)
            .block(true)
            .permission(permission::superuser())
            .handle(|| async { "The cake is in the fridge." }),
    )?;

    // Lowest priority: only reached when nothing above blocked.
    dispatcher.register(
        on_message()
            .priority(100)
            .rule(rule::to_me())
            .handle(|event: BoxedEvent| async move {
                debug!(text = %event.plain_text(), "Unhandled line");
            }),
    )?;

    dispatcher.run_postprocessor(|exception: Exception| async move {
        if let Some(err) = exception.0 {
            warn!(error = %err, "A handler failed");
        }
    })?;
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

async fn read_lines(runtime: &BrassRuntime, bot: BoxedBot, args: &Args) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = runtime.shutdown_token();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line,
        };
        let text = match line {
            Ok(Some(text)) => text,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "Failed to read stdin");
                break;
            }
        };
        if text.trim().is_empty() {
            continue;
        }

        let event = BoxedEvent::new(ConsoleLine {
            text: Message::from(text),
            user: args.user.clone(),
            session: args.session.clone(),
        });
        // Wait for the reply so the console stays in order.
        if let Some(task) = runtime.handle_event(bot.clone(), event) {
            let _ = task.await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = BrassRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    let runtime = builder
        .plugin::<Echo>()
        .setup("conversation", conversation)
        .setup("admin", admin)
        .build()?;

    info!(
        user = args.user.as_str(),
        session = args.session.as_str(),
        "Type a message, Ctrl+D to quit"
    );

    let bot: BoxedBot = Arc::new(ConsoleBot);
    runtime.run_until(read_lines(&runtime, bot, &args)).await;

    let stats = runtime.stats();
    info!(
        events = stats.events_received,
        handled = stats.events_handled,
        "Goodbye"
    );
    Ok(())
}
