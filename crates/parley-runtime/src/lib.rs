//! Parley Runtime - configuration and logging for Parley bots.
//!
//! This crate provides:
//! - Layered configuration (defaults, TOML/YAML files, `PARLEY_*` variables)
//! - Logging setup on top of `tracing-subscriber`
//! - [`BotFactory`], which builds configured [`Bot`]s
//!
//! ```ignore
//! use parley_runtime::BotFactory;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let factory = BotFactory::load()?;
//!     factory.init_logging();
//!
//!     let mut bot = factory.build(ConsoleConnector);
//!     bot.on_event(greet);
//!
//!     let handler = bot.create_request_handler()?;
//!     let reply = handler.handle(body, None).await?;
//!     Ok(())
//! }
//! ```
//!
//! [`Bot`]: parley_framework::Bot

pub mod config;
pub mod error;
pub mod factory;
pub mod logging;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, LogFormat, LogLevel, LogOutput, LoggingConfig,
    ParleyConfig, Profile, load_config, load_config_from_file,
};
pub use error::{RuntimeError, RuntimeResult};
pub use factory::BotFactory;
pub use logging::{LoggingBuilder, SpanEvents, init_from_config};

pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ConfigLoader, ParleyConfig};
    pub use crate::factory::BotFactory;
    pub use crate::logging::{LoggingBuilder, SpanEvents};
    pub use crate::{RuntimeError, RuntimeResult};
}
