//! Bot registration surface.
//!
//! A [`Bot`] collects everything a request needs: the connector, the session
//! store, the primary and error handlers, plugins and the initial state.
//! [`Bot::create_request_handler`] freezes that configuration into a cloneable
//! [`RequestHandler`].

use std::sync::Arc;

use parley_core::{
    BoxedSessionStore, Connector, ErrorBus, HandlerError, MemorySessionStore, SessionStore,
};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::action::{Action, chain, run};
use crate::dispatch::{RequestHandler, Shared};
use crate::error::BotError;
use crate::plugin::Plugin;

/// Default number of events resolved concurrently per request.
pub const DEFAULT_RESOLVE_CONCURRENCY: usize = 5;

/// A conversational bot bound to one connector.
///
/// # Example
///
/// ```rust,ignore
/// let mut bot = Bot::new(ConsoleConnector::default());
/// bot.on_event(Action::new(greet))
///     .on_error(Action::new(apologize))
///     .set_initial_state(json!({ "greeting": "hello" }));
///
/// let handler = bot.create_request_handler()?;
/// let reply = handler.handle(body, None).await?;
/// ```
pub struct Bot<C: Connector> {
    connector: Arc<C>,
    store: BoxedSessionStore,
    sync: bool,
    resolve_concurrency: usize,
    handler: Option<Action<C::Context>>,
    error_handler: Option<Action<C::Context>>,
    initial_state: Arc<Value>,
    plugins: Vec<Plugin<C::Context>>,
    error_bus: ErrorBus,
    store_ready: Arc<OnceCell<()>>,
}

impl<C: Connector> Bot<C> {
    /// Creates a blocking bot backed by a [`MemorySessionStore`].
    pub fn new(connector: C) -> Self {
        Self::builder(connector).build()
    }

    /// Starts building a bot.
    pub fn builder(connector: C) -> BotBuilder<C> {
        BotBuilder::new(connector)
    }

    /// Registers the primary handler, replacing any previous one.
    pub fn on_event(&mut self, action: Action<C::Context>) -> &mut Self {
        self.handler = Some(action);
        self
    }

    /// Registers the error handler, replacing any previous one.
    ///
    /// It runs with the failure attached to its props
    /// ([`Props::error`](crate::Props::error)) and recovers the event when it
    /// succeeds.
    pub fn on_error(&mut self, action: Action<C::Context>) -> &mut Self {
        self.error_handler = Some(action);
        self
    }

    /// Sets the state shared read-only by every context.
    pub fn set_initial_state(&mut self, state: Value) -> &mut Self {
        self.initial_state = Arc::new(state);
        self
    }

    /// Appends a plugin.
    pub fn use_plugin(&mut self, plugin: Plugin<C::Context>) -> &mut Self {
        self.plugins.push(plugin);
        self
    }

    /// Subscribes to unhandled event failures.
    pub fn on_unhandled_error<F>(&mut self, subscriber: F) -> &mut Self
    where
        F: Fn(&HandlerError) + Send + Sync + 'static,
    {
        self.error_bus.subscribe(subscriber);
        self
    }

    /// Returns the bot's error bus.
    pub fn error_bus(&self) -> &ErrorBus {
        &self.error_bus
    }

    /// Returns the connector.
    pub fn connector(&self) -> &Arc<C> {
        &self.connector
    }

    /// Returns the session store.
    pub fn session_store(&self) -> &BoxedSessionStore {
        &self.store
    }

    /// Returns `true` if requests wait for their handlers.
    pub fn is_sync(&self) -> bool {
        self.sync
    }

    /// Returns the number of plugins registered so far.
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Freezes the current configuration into a request handler.
    ///
    /// Installs the logging subscriber on the error bus when nothing else
    /// subscribed. All handlers created from one bot share the session store
    /// initialization latch.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::MissingHandler`] if [`on_event`](Self::on_event)
    /// was never called.
    pub fn create_request_handler(&self) -> Result<RequestHandler<C>, BotError> {
        let handler = run(self.handler.clone())?;
        let error_handler = self.error_handler.clone().map(chain);

        if self.error_bus.ensure_default_subscriber() {
            debug!("No error subscriber registered, logging unhandled errors");
        }

        Ok(RequestHandler::new(Shared {
            connector: Arc::clone(&self.connector),
            store: Arc::clone(&self.store),
            sync: self.sync,
            resolve_concurrency: self.resolve_concurrency,
            handler,
            error_handler,
            initial_state: Arc::clone(&self.initial_state),
            plugins: self.plugins.iter().cloned().collect(),
            error_bus: self.error_bus.clone(),
            store_ready: Arc::clone(&self.store_ready),
        }))
    }
}

impl<C: Connector> std::fmt::Debug for Bot<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("platform", &self.connector.platform())
            .field("sync", &self.sync)
            .field("resolve_concurrency", &self.resolve_concurrency)
            .field("has_handler", &self.handler.is_some())
            .field("has_error_handler", &self.error_handler.is_some())
            .field("plugins", &self.plugins)
            .field("error_bus", &self.error_bus)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// BotBuilder
// ============================================================================

/// Construction-time options of a [`Bot`].
pub struct BotBuilder<C: Connector> {
    connector: C,
    store: Option<BoxedSessionStore>,
    sync: bool,
    resolve_concurrency: usize,
    initial_state: Value,
}

impl<C: Connector> BotBuilder<C> {
    fn new(connector: C) -> Self {
        Self {
            connector,
            store: None,
            sync: true,
            resolve_concurrency: DEFAULT_RESOLVE_CONCURRENCY,
            initial_state: Value::Object(Default::default()),
        }
    }

    /// Uses `store` instead of the default [`MemorySessionStore`].
    pub fn session_store(mut self, store: impl SessionStore) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Uses a store that is shared with other owners.
    pub fn shared_session_store(mut self, store: BoxedSessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Chooses between blocking (`true`, default) and fire-and-forget mode.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Sets how many events of one payload are resolved at once. Zero is raised to one.
    pub fn resolve_concurrency(mut self, limit: usize) -> Self {
        self.resolve_concurrency = limit.max(1);
        self
    }

    /// Sets the initial state.
    pub fn initial_state(mut self, state: Value) -> Self {
        self.initial_state = state;
        self
    }

    /// Builds the bot.
    pub fn build(self) -> Bot<C> {
        Bot {
            connector: Arc::new(self.connector),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemorySessionStore::new())),
            sync: self.sync,
            resolve_concurrency: self.resolve_concurrency,
            handler: None,
            error_handler: None,
            initial_state: Arc::new(self.initial_state),
            plugins: Vec::new(),
            error_bus: ErrorBus::new(),
            store_ready: Arc::new(OnceCell::new()),
        }
    }
}
