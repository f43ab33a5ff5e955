//! Per-event execution contexts.
//!
//! Contexts are built by the connector, one per event, and are split in two:
//!
//! - [`BaseContext`] — the platform-agnostic part every context carries: the
//!   event, its optional session, the bot's initial state, request metadata,
//!   the error bus, the response slot and the session-written flag.
//!
//! - [`BotContext`] — the trait a connector's own context type implements.
//!   It only has to expose its `BaseContext`; everything the dispatcher needs
//!   is provided on top of it. Connectors that buffer outgoing messages
//!   override [`handler_did_end`](BotContext::handler_did_end) to flush them.
//!
//! Contexts are handed to actions as `Arc<C>`, so mutable parts live behind
//! locks. Sessions are only reachable through synchronous closures, which
//! keeps lock guards from being held across `.await` points.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::bus::ErrorBus;
use crate::error::{BoxError, HandlerError};
use crate::session::Session;

// =============================================================================
// RequestContext
// =============================================================================

/// Metadata about the inbound HTTP request that carried the payload.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Request method (e.g. `POST`).
    pub method: Option<String>,
    /// Request path.
    pub path: Option<String>,
    /// Request headers, with lowercase names.
    pub headers: HashMap<String, String>,
    /// Query string parameters.
    pub query: HashMap<String, String>,
    /// Remote address, if known.
    pub remote_addr: Option<String>,
}

impl RequestContext {
    /// Creates empty request metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Sets the request path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Adds a header. The name is stored lowercase.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Adds a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Sets the remote address.
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

// =============================================================================
// ContextParams
// =============================================================================

/// Everything the dispatcher hands to [`Connector::create_context`].
///
/// [`Connector::create_context`]: crate::Connector::create_context
#[derive(Debug)]
pub struct ContextParams<E> {
    /// The event this context handles.
    pub event: E,
    /// The resolved session, or `None` for stateless events.
    pub session: Option<Session>,
    /// Bot-wide initial state, shared by every context.
    pub initial_state: Arc<Value>,
    /// Metadata of the request that carried the event.
    pub request: Option<RequestContext>,
    /// The bot's error bus.
    pub error_bus: ErrorBus,
}

// =============================================================================
// BaseContext
// =============================================================================

/// The platform-agnostic part of every context.
pub struct BaseContext<E> {
    event: E,
    session: Mutex<Option<Session>>,
    initial_state: Arc<Value>,
    request: Option<RequestContext>,
    error_bus: ErrorBus,
    response: Mutex<Option<Value>>,
    is_session_written: AtomicBool,
}

impl<E> BaseContext<E> {
    /// Creates the base from the dispatcher's parameters.
    pub fn new(params: ContextParams<E>) -> Self {
        Self {
            event: params.event,
            session: Mutex::new(params.session),
            initial_state: params.initial_state,
            request: params.request,
            error_bus: params.error_bus,
            response: Mutex::new(None),
            is_session_written: AtomicBool::new(false),
        }
    }

    /// Returns the event.
    pub fn event(&self) -> &E {
        &self.event
    }

    /// Returns the bot-wide initial state.
    pub fn initial_state(&self) -> &Value {
        &self.initial_state
    }

    /// Returns the request metadata, if any.
    pub fn request(&self) -> Option<&RequestContext> {
        self.request.as_ref()
    }

    /// Returns the error bus.
    pub fn error_bus(&self) -> &ErrorBus {
        &self.error_bus
    }

    /// Returns `true` if a session is attached.
    pub fn has_session(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Returns a copy of the session.
    pub fn session(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    /// Runs `f` against the session, if one is attached.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.session.lock().as_mut().map(f)
    }

    /// Replaces the outgoing response payload.
    pub fn set_response(&self, response: Value) {
        *self.response.lock() = Some(response);
    }

    /// Runs `f` against the response slot, creating it with `Value::Null`.
    pub fn with_response<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut guard = self.response.lock();
        f(guard.get_or_insert(Value::Null))
    }

    /// Returns a copy of the accumulated response.
    pub fn response(&self) -> Option<Value> {
        self.response.lock().clone()
    }

    /// Returns `true` once the dispatcher began persisting the session.
    pub fn is_session_written(&self) -> bool {
        self.is_session_written.load(Ordering::SeqCst)
    }

    /// Marks the session as persisted.
    pub fn mark_session_written(&self) {
        self.is_session_written.store(true, Ordering::SeqCst);
    }
}

impl<E: std::fmt::Debug> std::fmt::Debug for BaseContext<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseContext")
            .field("event", &self.event)
            .field("has_session", &self.has_session())
            .field("is_session_written", &self.is_session_written())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// BotContext
// =============================================================================

/// A connector-specific context.
///
/// # Example
///
/// ```rust,ignore
/// struct ConsoleContext {
///     base: BaseContext<ConsoleEvent>,
///     outbox: Mutex<Vec<String>>,
/// }
///
/// #[async_trait]
/// impl BotContext for ConsoleContext {
///     type Event = ConsoleEvent;
///
///     fn base(&self) -> &BaseContext<ConsoleEvent> {
///         &self.base
///     }
///
///     async fn handler_did_end(&self) -> Result<(), BoxError> {
///         let lines = std::mem::take(&mut *self.outbox.lock());
///         self.set_response(serde_json::json!({ "messages": lines }));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait BotContext: Send + Sync + 'static {
    /// The connector's event type.
    type Event: Send + Sync + 'static;

    /// Returns the platform-agnostic part of this context.
    fn base(&self) -> &BaseContext<Self::Event>;

    /// Called after the primary handler chain completed successfully.
    async fn handler_did_end(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Returns the event.
    fn event(&self) -> &Self::Event {
        self.base().event()
    }

    /// Returns a copy of the session.
    fn session(&self) -> Option<Session> {
        self.base().session()
    }

    /// Runs `f` against the session, if one is attached.
    fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Option<R>
    where
        Self: Sized,
    {
        self.base().with_session(f)
    }

    /// Replaces the outgoing response payload.
    fn set_response(&self, response: Value) {
        self.base().set_response(response);
    }

    /// Returns a copy of the accumulated response.
    fn response(&self) -> Option<Value> {
        self.base().response()
    }

    /// Emits `err` on the context's error bus.
    fn emit_error(&self, err: &HandlerError) {
        self.base().error_bus().emit(err);
    }

    /// Returns `true` once the dispatcher began persisting the session.
    fn is_session_written(&self) -> bool {
        self.base().is_session_written()
    }
}
