//! Building bots from configuration.

use parley_core::{Connector, MemorySessionStore};
use parley_framework::Bot;
use tracing::info;

use crate::config::{ConfigLoader, ParleyConfig};
use crate::error::RuntimeResult;
use crate::logging;

/// Turns a [`ParleyConfig`] into configured bots.
///
/// ```rust,ignore
/// let factory = BotFactory::load()?;
/// factory.init_logging();
///
/// let mut bot = factory.build(ConsoleConnector);
/// bot.on_event(greet);
/// let handler = bot.create_request_handler()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct BotFactory {
    config: ParleyConfig,
}

impl BotFactory {
    /// Uses an already loaded configuration.
    pub fn from_config(config: &ParleyConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Loads configuration from the default files and `PARLEY_*` variables.
    pub fn load() -> RuntimeResult<Self> {
        Ok(Self {
            config: ConfigLoader::new().load()?,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    /// Installs the global subscriber described by `logging`.
    ///
    /// Returns `false` if a subscriber was already installed.
    pub fn init_logging(&self) -> bool {
        logging::init_from_config(&self.config.logging)
    }

    /// Creates a memory store with the configured limits.
    pub fn session_store(&self) -> MemorySessionStore {
        let session = &self.config.session;
        MemorySessionStore::with_limits(session.capacity, session.ttl())
    }

    /// Creates a bot for `connector` with the configured mode, store and state.
    ///
    /// Handlers, plugins and error subscribers are registered on the
    /// returned bot.
    pub fn build<C: Connector>(&self, connector: C) -> Bot<C> {
        let bot = &self.config.bot;
        info!(
            platform = %connector.platform(),
            sync = bot.sync,
            resolve_concurrency = bot.resolve_concurrency,
            "Building bot"
        );

        Bot::builder(connector)
            .session_store(self.session_store())
            .sync(bot.sync)
            .resolve_concurrency(bot.resolve_concurrency)
            .initial_state(bot.initial_state.clone())
            .build()
    }
}
