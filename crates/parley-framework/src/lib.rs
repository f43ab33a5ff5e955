//! # Parley Framework
//!
//! Dialog execution and request dispatching for Parley bots.
//!
//! This layer provides:
//! - Dialog actions and the continuation engine ([`Action`], [`Next`], [`run`])
//! - Pre-processing plugins ([`Plugin`])
//! - The bot registration surface ([`Bot`], [`BotBuilder`])
//! - The request dispatcher with its blocking and fire-and-forget modes
//!   ([`RequestHandler`])

pub mod action;
pub mod bot;
pub mod dispatch;
pub mod error;
pub mod plugin;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{Action, ActionFuture, IntoNext, Next, Props, chain, run};
pub use bot::{Bot, BotBuilder, DEFAULT_RESOLVE_CONCURRENCY};
pub use dispatch::RequestHandler;
pub use error::{BotError, BotResult};
pub use plugin::{Plugin, PluginFuture};
