//! Console Bot Example
//!
//! Reads one payload per line from stdin and prints the bot's reply.
//! Plain text lines are sent as user `console`; JSON lines are passed through,
//! so several users can talk in one payload:
//!
//! ```text
//! hello
//! /name
//! Ada
//! {"events": [{"user": "bob", "text": "hi"}, {"user": "eve", "text": "/fail"}]}
//! ```
//!
//! `/name` starts a two-step dialog. The session remembers that a name is
//! expected, and the router continues with the step that stores it.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package console-bot
//! ```

mod connector;

use anyhow::Result;
use parley::prelude::*;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use crate::connector::{ConsoleConnector, ConsoleContext};

// ============================================================================
// Dialog
// ============================================================================

/// Picks the next step from the session and the message.
fn router() -> Action<ConsoleContext> {
    Action::new(|ctx: Arc<ConsoleContext>, _props: Props| async move {
        let awaiting = ctx.session().and_then(|s| s.get::<String>("awaiting"));
        let next = match (awaiting.as_deref(), ctx.event().text.trim()) {
            (Some("name"), _) => remember_name(),
            (_, "/name") => ask_name(),
            (_, "/fail") => return Err(BoxError::from("asked to fail")),
            _ => echo(),
        };
        Ok::<_, BoxError>(Some(next))
    })
}

fn ask_name() -> Action<ConsoleContext> {
    Action::new(|ctx: Arc<ConsoleContext>, _props: Props| async move {
        ctx.with_session(|s| s.set("awaiting", "name")).transpose()?;
        ctx.say("What should I call you?");
        Ok::<_, BoxError>(())
    })
}

fn remember_name() -> Action<ConsoleContext> {
    Action::new(|ctx: Arc<ConsoleContext>, _props: Props| async move {
        let name = ctx.event().text.trim().to_owned();
        ctx.with_session(|s| {
            s.remove("awaiting");
            s.set("name", &name)
        })
        .transpose()?;
        ctx.say(format!("Nice to meet you, {name}."));
        Ok::<_, BoxError>(Next::Done)
    })
}

fn echo() -> Action<ConsoleContext> {
    Action::new(|ctx: Arc<ConsoleContext>, _props: Props| async move {
        let session = ctx.session();
        let name = session
            .as_ref()
            .and_then(|s| s.get::<String>("name"))
            .unwrap_or_else(|| ctx.event().user.clone());
        let visits = session.and_then(|s| s.get::<u64>("visits")).unwrap_or(0);
        ctx.say(format!("{name} (visit {visits}): {}", ctx.event().text));
    })
}

fn apologize() -> Action<ConsoleContext> {
    Action::new(|ctx: Arc<ConsoleContext>, props: Props| async move {
        let cause = props.error().map(ToString::to_string).unwrap_or_default();
        ctx.say(format!("Sorry, that did not work ({cause})."));
        ctx.flush();
    })
}

/// Counts messages per session before the dialog runs.
fn visits() -> Plugin<ConsoleContext> {
    Plugin::new("visits", |ctx: Arc<ConsoleContext>| async move {
        ctx.with_session(|s| {
            let visits = s.get::<u64>("visits").unwrap_or(0) + 1;
            s.set("visits", visits)
        })
        .transpose()?;
        Ok::<_, BoxError>(())
    })
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let factory = BotFactory::load()?;
    factory.init_logging();

    let mut bot = factory.build(ConsoleConnector);
    bot.use_plugin(visits())
        .on_event(router())
        .on_error(apologize());
    let handler = bot.create_request_handler()?;

    if !handler.is_sync() {
        info!("bot.sync is false, replies are not printed");
    }
    info!("Type a message per line, or a JSON payload. Ctrl+D quits.");

    let request = RequestContext::new()
        .with_method("STDIN")
        .with_path("/console");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let body = serde_json::from_str::<Value>(line)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({ "user": "console", "text": line }));

        match handler.handle(body, Some(request.clone())).await {
            Ok(Some(reply)) => println!("{reply}"),
            Ok(None) => {}
            Err(err) => error!(error = %err, "Request rejected"),
        }
    }

    Ok(())
}
