//! # Parley
//!
//! A multi-platform conversational bot runtime.
//!
//! ## Overview
//!
//! A platform connector decodes inbound payloads into events. For every event
//! Parley resolves a persistent session, builds a context, and runs the
//! handler chain on its own task. Sessions are written back once the
//! handlers of a request have settled.
//!
//! ```text
//! ┌───────────┐     ┌──────────────────┐     ┌──────────────────────────────────┐
//! │ transport │────▶│  RequestHandler  │────▶│ event 1: plugins ─▶ handler chain│
//! │ (yours)   │◀────│  decode, resolve │────▶│ event 2: plugins ─▶ handler chain│
//! └───────────┘     └──────────────────┘────▶│ ...                              │
//!                            │               └──────────────────────────────────┘
//!                            ▼
//!                      SessionStore
//! ```
//!
//! - **Connectors**: platform adapters implementing [`Connector`](core::Connector)
//! - **Actions**: async handlers returning an optional continuation
//! - **Plugins**: per-context hooks run before the handler
//! - **Session stores**: persistence behind [`SessionStore`](core::SessionStore)
//!
//! ## Quick Start
//!
//! The `console-bot` package under `demos/console_bot` is a runnable version.
//!
//! ```rust,ignore
//! use parley::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let factory = BotFactory::load()?;
//!     factory.init_logging();
//!
//!     let mut bot = factory.build(ConsoleConnector);
//!     bot.on_event(Action::new(|ctx: Arc<ConsoleContext>, _props| async move {
//!         ctx.say(format!("you said {}", ctx.event().text));
//!     }));
//!
//!     let handler = bot.create_request_handler()?;
//!     let reply = handler.handle(body, None).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use parley_core as core;
pub use parley_framework as framework;
pub use parley_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use parley::prelude::*;
/// ```
pub mod prelude {
    pub use async_trait::async_trait;
    pub use std::sync::Arc;

    // Connector side
    pub use parley_core::prelude::*;

    // Handlers and dispatch
    pub use parley_framework::{Action, Bot, BotError, Next, Plugin, Props, RequestHandler};

    // Setup
    pub use parley_runtime::{BotFactory, ConfigLoader, LoggingBuilder, ParleyConfig};
}
