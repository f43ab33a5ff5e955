//! Request dispatching.
//!
//! Every inbound payload goes through two stages:
//!
//! 1. **Resolution** (bounded): each event gets its session and context.
//!    At most `resolve_concurrency` events are resolved at the same time to
//!    cap simultaneous store reads.
//! 2. **Execution** (unbounded): each context runs plugins, the handler chain
//!    and the error fallback in its own task.
//!
//! Sessions are persisted once every task settled, in event order.
//!
//! ```text
//!            ┌─ resolve ─┐        ┌─ task ─┐
//! payload ──►├─ resolve ─┤──────► ├─ task ─┤ ──► persist ──► first response
//!            └─ ...     ─┘ (≤ N)  └─ ...  ─┘
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt, TryStreamExt, stream};
use parley_core::{
    BotContext, BoxedSessionStore, Connector, ContextParams, ErrorBus, EventSource, HandlerError,
    RequestContext, Session, session_id,
};
use serde_json::Value;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::{Instrument, Level, Span, debug, error, field, span, trace, warn};

use crate::action::{Action, Props};
use crate::error::BotError;
use crate::plugin::{Plugin, run_plugins};

/// Frozen bot configuration shared by every clone of a [`RequestHandler`].
pub(crate) struct Shared<C: Connector> {
    pub(crate) connector: Arc<C>,
    pub(crate) store: BoxedSessionStore,
    pub(crate) sync: bool,
    pub(crate) resolve_concurrency: usize,
    pub(crate) handler: Action<C::Context>,
    pub(crate) error_handler: Option<Action<C::Context>>,
    pub(crate) initial_state: Arc<Value>,
    pub(crate) plugins: Arc<[Plugin<C::Context>]>,
    pub(crate) error_bus: ErrorBus,
    pub(crate) store_ready: Arc<OnceCell<()>>,
}

type EventTasks = JoinSet<Result<(), BotError>>;

/// Entry point for inbound payloads, created by
/// [`Bot::create_request_handler`](crate::Bot::create_request_handler).
///
/// Cloning is cheap; clones share the same configuration.
pub struct RequestHandler<C: Connector> {
    inner: Arc<Shared<C>>,
}

impl<C: Connector> Clone for RequestHandler<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> RequestHandler<C> {
    pub(crate) fn new(shared: Shared<C>) -> Self {
        Self {
            inner: Arc::new(shared),
        }
    }

    /// Handles one inbound payload.
    ///
    /// In blocking mode this waits for every event and returns the first
    /// context's response when it is a non-empty object or array. In
    /// fire-and-forget mode it returns `Ok(None)` as soon as the event tasks
    /// were started.
    ///
    /// Failures of individual events are never returned; they reach the
    /// error bus instead.
    ///
    /// # Errors
    ///
    /// - [`BotError::EmptyBody`] for `null`, `""` or `{}`, before any I/O.
    /// - [`BotError::Store`] if the store fails to initialize or to read.
    /// - [`BotError::Connector`] if the payload cannot be decoded or a
    ///   context cannot be created.
    ///
    /// Store and connector errors are only returned in blocking mode. In
    /// fire-and-forget mode they are logged and `Ok(None)` is returned.
    pub async fn handle(
        &self,
        body: Value,
        request: Option<RequestContext>,
    ) -> Result<Option<Value>, BotError> {
        if is_empty_body(&body) {
            return Err(BotError::EmptyBody);
        }

        let span = span!(
            Level::DEBUG,
            "dispatch",
            platform = %self.inner.connector.platform(),
            events = field::Empty
        );
        async move {
            match self.dispatch(body, request).await {
                Err(err) if !self.inner.sync => {
                    warn!(error = %err, "Dropping payload that failed before dispatch");
                    Ok(None)
                }
                result => result,
            }
        }
        .instrument(span)
        .await
    }

    /// Returns `true` if [`handle`](Self::handle) waits for the handlers.
    pub fn is_sync(&self) -> bool {
        self.inner.sync
    }

    async fn dispatch(
        &self,
        body: Value,
        request: Option<RequestContext>,
    ) -> Result<Option<Value>, BotError> {
        let shared = &*self.inner;

        shared
            .store_ready
            .get_or_try_init(|| shared.store.init())
            .await?;

        let body = shared.connector.normalize_body(body);
        let events = shared.connector.map_request_to_events(&body).await?;
        Span::current().record("events", events.len());
        debug!("Decoded payload");

        // Stage 1: bounded resolution, results kept in event order.
        let single = events.len() == 1;
        let (body, request) = (&body, request.as_ref());
        let contexts: Vec<Arc<C::Context>> = stream::iter(events)
            .map(move |event| self.resolve(event, body, single, request))
            .buffered(shared.resolve_concurrency)
            .map_ok(Arc::new)
            .try_collect()
            .await?;

        // Stage 2: one task per context, no bound.
        let mut tasks = EventTasks::new();
        for (index, ctx) in contexts.iter().enumerate() {
            let ctx = Arc::clone(ctx);
            let shared = Arc::clone(&self.inner);
            let span = span!(Level::DEBUG, "event", event_index = index);
            tasks.spawn(execute(shared, ctx).instrument(span));
        }

        if shared.sync {
            settle(&mut tasks).await;
            persist(&shared.store, &contexts).await;
            return Ok(first_response(&contexts));
        }

        let store = Arc::clone(&shared.store);
        tokio::spawn(
            async move {
                settle(&mut tasks).await;
                persist(&store, &contexts).await;
            }
            .in_current_span(),
        );
        Ok(None)
    }

    async fn resolve(
        &self,
        event: C::Event,
        body: &Value,
        single: bool,
        request: Option<&RequestContext>,
    ) -> Result<C::Context, BotError> {
        let shared = &*self.inner;
        let connector = &*shared.connector;

        let session = {
            let source = if single {
                EventSource::Body(body)
            } else {
                EventSource::Event(&event)
            };

            match connector.get_unique_session_key(source, request).await? {
                Some(key) => {
                    let id = session_id(connector.platform(), &key);
                    trace!(session_id = %id, "Reading session");
                    let mut session = shared.store.read(&id).await?.unwrap_or_default();
                    session.ensure_identity(id, connector.platform());
                    connector.update_session(&mut session, source).await?;
                    Some(session)
                }
                None => None,
            }
        };

        let params = ContextParams {
            event,
            session,
            initial_state: Arc::clone(&shared.initial_state),
            request: request.cloned(),
            error_bus: shared.error_bus.clone(),
        };
        Ok(connector.create_context(params).await?)
    }
}

impl<C: Connector> std::fmt::Debug for RequestHandler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("platform", &self.inner.connector.platform())
            .field("sync", &self.inner.sync)
            .field("resolve_concurrency", &self.inner.resolve_concurrency)
            .field("plugins", &self.inner.plugins.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Runs one context to completion, falling back to the error handler.
///
/// A panic in plugins, handlers or the end hook counts as a handler failure.
async fn execute<C: Connector>(
    shared: Arc<Shared<C>>,
    ctx: Arc<C::Context>,
) -> Result<(), BotError> {
    let err = match catch_panic(run_primary(&shared, &ctx)).await {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    debug!(error = %err, "Event handler failed");

    let err = match &shared.error_handler {
        Some(error_handler) => {
            let fallback = async {
                error_handler
                    .call(Arc::clone(&ctx), Props::with_error(err))
                    .await
                    .map(|_| ())
                    .map_err(HandlerError::from)
            };
            match catch_panic(fallback).await {
                Ok(()) => {
                    debug!("Error handler recovered the event");
                    return Ok(());
                }
                Err(fallback_err) => fallback_err,
            }
        }
        None => err,
    };

    ctx.emit_error(&err);
    Err(BotError::Handler(err))
}

async fn run_primary<C: Connector>(
    shared: &Shared<C>,
    ctx: &Arc<C::Context>,
) -> Result<(), HandlerError> {
    run_plugins(&shared.plugins, ctx).await?;
    shared.handler.call(Arc::clone(ctx), Props::new()).await?;
    ctx.handler_did_end().await?;
    Ok(())
}

async fn catch_panic<F>(fut: F) -> Result<(), HandlerError>
where
    F: Future<Output = Result<(), HandlerError>>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(panic_error(payload.as_ref())))
}

fn panic_error(payload: &(dyn Any + Send)) -> HandlerError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_owned());
    HandlerError::msg(format!("handler panicked: {message}"))
}

/// Waits for every event task. Failures and panics are only logged.
async fn settle(tasks: &mut EventTasks) {
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(error = %err, "Event task failed"),
            Err(err) => error!(error = %err, "Event task aborted"),
        }
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Writes back every context's session, one after the other.
async fn persist<X: BotContext>(store: &BoxedSessionStore, contexts: &[Arc<X>]) {
    for ctx in contexts {
        let base = ctx.base();
        if !base.has_session() {
            continue;
        }

        base.mark_session_written();
        let Some(session) = base.with_session(|session| {
            session.touch();
            session.clone()
        }) else {
            continue;
        };

        write_session(store, &session).await;
    }
}

async fn write_session(store: &BoxedSessionStore, session: &Session) {
    let Some(id) = session.id() else {
        warn!("Skipping session without an id");
        return;
    };

    match store.write(id, session).await {
        Ok(()) => trace!(session_id = %id, "Session persisted"),
        Err(err) => warn!(session_id = %id, error = %err, "Failed to persist session"),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn is_empty_body(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn first_response<X: BotContext>(contexts: &[Arc<X>]) -> Option<Value> {
    contexts
        .first()
        .and_then(|ctx| ctx.response())
        .filter(|response| match response {
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => false,
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::Bot;
    use crate::testing::{MockConnector, RecordingStore, TestContext, count};
    use parley_core::{BoxError, MemorySessionStore, SessionStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::{Barrier, Notify};
    use tokio_test::{assert_err, assert_ok};

    fn batch(users: &[Option<&str>]) -> Value {
        let events: Vec<Value> = users
            .iter()
            .map(|user| match user {
                Some(user) => json!({ "user": user, "text": format!("hi from {user}") }),
                None => json!({ "text": "anonymous" }),
            })
            .collect();
        json!({ "events": events })
    }

    fn echo() -> Action<TestContext> {
        Action::new(|ctx: Arc<TestContext>, _: Props| async move {
            let text = format!("{}: {}", ctx.user().unwrap_or("nobody"), ctx.text());
            ctx.reply(text);
        })
    }

    fn bot_with(connector: MockConnector, store: &Arc<RecordingStore>) -> Bot<MockConnector> {
        let store: BoxedSessionStore = store.clone();
        Bot::builder(connector).shared_session_store(store).build()
    }

    fn count_unhandled(bot: &mut Bot<MockConnector>) -> Arc<AtomicUsize> {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        bot.on_unhandled_error(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        counter
    }

    #[tokio::test]
    async fn test_one_context_per_event() {
        let connector = MockConnector::new();
        let stats = connector.stats();
        let store = RecordingStore::new();
        let mut bot = bot_with(connector, &store);
        bot.on_event(echo());

        let handler = bot.create_request_handler().unwrap();
        let body = batch(&[Some("a"), None, Some("b")]);
        assert_ok!(handler.handle(body, None).await);

        assert_eq!(count(&stats.contexts), 3);
        assert_eq!(count(&stats.ended), 3);
        assert_eq!(stats.sources(), ["event", "event", "event"]);
        // The stateless event is never persisted.
        assert_eq!(store.writes(), ["test:a", "test:b"]);
    }

    #[tokio::test]
    async fn test_single_event_resolves_from_body() {
        let connector = MockConnector::new();
        let stats = connector.stats();
        let store = RecordingStore::new();
        let mut bot = bot_with(connector, &store);
        bot.on_event(echo());

        let handler = bot.create_request_handler().unwrap();
        let response = handler
            .handle(json!({ "user": "a", "text": "hello" }), None)
            .await
            .unwrap();

        assert_eq!(response, Some(json!({ "text": "a: hello" })));
        assert_eq!(stats.sources(), ["body"]);
        assert_eq!(store.writes(), ["test:a"]);
    }

    #[tokio::test]
    async fn test_session_identity_is_preserved() {
        let store = RecordingStore::new();
        let mut legacy = Session::new();
        legacy.ensure_identity("test:a", "legacy");
        store.write("test:a", &legacy).await.unwrap();

        let mut bot = bot_with(MockConnector::new(), &store);
        bot.on_event(Action::new(|ctx: Arc<TestContext>, _: Props| async move {
            ctx.with_session(|s| s.insert("platform", json!("rewritten")).is_err())
                .filter(|rejected| *rejected)
                .ok_or("reserved key was accepted")?;
            Ok::<_, BoxError>(())
        }));

        let handler = bot.create_request_handler().unwrap();
        for _ in 0..2 {
            handler
                .handle(json!({ "user": "a", "text": "hi" }), None)
                .await
                .unwrap();
        }

        let stored = store.stored("test:a").await.unwrap();
        assert_eq!(stored.id(), Some("test:a"));
        assert_eq!(stored.platform(), Some("legacy"));
        assert_eq!(stored.get::<u64>("visits"), Some(2));
        assert!(stored.last_activity().is_some());
    }

    #[tokio::test]
    async fn test_empty_body_makes_no_calls() {
        let connector = MockConnector::new();
        let stats = connector.stats();
        let store = RecordingStore::new();
        let mut bot = bot_with(connector, &store);
        bot.on_event(echo());

        let handler = bot.create_request_handler().unwrap();
        for body in [Value::Null, json!(""), json!({})] {
            let err = assert_err!(handler.handle(body, None).await);
            assert!(matches!(err, BotError::EmptyBody));
        }

        assert_eq!(count(&stats.map_calls), 0);
        assert_eq!(count(&store.init_calls), 0);
        assert_eq!(count(&store.reads), 0);
    }

    #[tokio::test]
    async fn test_resolution_is_bounded() {
        let connector = MockConnector::new().with_resolve_delay(Duration::from_millis(20));
        let stats = connector.stats();
        let store = RecordingStore::new();
        let mut bot = bot_with(connector, &store);
        bot.on_event(echo());

        let handler = bot.create_request_handler().unwrap();
        let users = ["a", "b", "c", "d", "e", "f"].map(Some);
        handler.handle(batch(&users), None).await.unwrap();

        assert_eq!(count(&stats.max_in_flight), 5);
        assert_eq!(count(&stats.contexts), 6);
        assert_eq!(
            store.writes(),
            ["test:a", "test:b", "test:c", "test:d", "test:e", "test:f"]
        );
    }

    #[tokio::test]
    async fn test_custom_resolution_bound() {
        let connector = MockConnector::new().with_resolve_delay(Duration::from_millis(10));
        let stats = connector.stats();
        let mut bot = Bot::builder(connector).resolve_concurrency(2).build();
        bot.on_event(echo());

        let handler = bot.create_request_handler().unwrap();
        let users = ["a", "b", "c", "d"].map(Some);
        handler.handle(batch(&users), None).await.unwrap();

        assert_eq!(count(&stats.max_in_flight), 2);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let store = RecordingStore::new();
        let mut bot = bot_with(MockConnector::new(), &store);
        let unhandled = count_unhandled(&mut bot);
        bot.on_event(Action::new(|ctx: Arc<TestContext>, _: Props| async move {
            if ctx.user() == Some("a") {
                return Err::<(), BoxError>("a exploded".into());
            }
            ctx.reply("b is fine");
            Ok(())
        }));

        let handler = bot.create_request_handler().unwrap();
        let response = handler
            .handle(batch(&[Some("b"), Some("a")]), None)
            .await
            .unwrap();

        assert_eq!(response, Some(json!({ "text": "b is fine" })));
        assert_eq!(unhandled.load(Ordering::SeqCst), 1);
        assert_eq!(store.writes(), ["test:b", "test:a"]);
    }

    #[tokio::test]
    async fn test_error_handler_recovers() {
        let connector = MockConnector::new();
        let stats = connector.stats();
        let mut bot = Bot::new(connector);
        let unhandled = count_unhandled(&mut bot);
        bot.on_event(Action::new(|_: Arc<TestContext>, _: Props| async {
            Err::<(), BoxError>("handler exploded".into())
        }))
        .on_error(Action::new(|ctx: Arc<TestContext>, props: Props| async move {
            let cause = props.error().map(ToString::to_string).unwrap_or_default();
            ctx.reply(format!("sorry ({cause})"));
        }));

        let handler = bot.create_request_handler().unwrap();
        let response = handler
            .handle(json!({ "user": "a", "text": "hi" }), None)
            .await
            .unwrap();

        assert_eq!(response, Some(json!({ "text": "sorry (handler exploded)" })));
        assert_eq!(unhandled.load(Ordering::SeqCst), 0);
        // The end hook only follows a successful primary chain.
        assert_eq!(count(&stats.ended), 0);
    }

    #[tokio::test]
    async fn test_failing_error_handler_escalates() {
        let mut bot = Bot::new(MockConnector::new());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bot.on_unhandled_error(move |err| sink.lock().push(err.to_string()));
        bot.on_event(Action::new(|_: Arc<TestContext>, _: Props| async {
            Err::<(), BoxError>("first".into())
        }))
        .on_error(Action::new(|_: Arc<TestContext>, _: Props| async {
            Err::<(), BoxError>("fallback failed too".into())
        }));

        let handler = bot.create_request_handler().unwrap();
        let response = handler
            .handle(json!({ "user": "a", "text": "hi" }), None)
            .await
            .unwrap();

        assert_eq!(response, None);
        assert_eq!(*seen.lock(), ["fallback failed too"]);
    }

    #[tokio::test]
    async fn test_end_hook_failure_is_a_handler_failure() {
        let mut bot = Bot::new(MockConnector::new());
        let unhandled = count_unhandled(&mut bot);
        bot.on_event(echo());

        let handler = bot.create_request_handler().unwrap();
        handler
            .handle(json!({ "user": "a", "text": "fail_end" }), None)
            .await
            .unwrap();

        assert_eq!(unhandled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_only_first_response_is_returned() {
        let mut bot = Bot::new(MockConnector::new());
        bot.on_event(echo());

        let handler = bot.create_request_handler().unwrap();
        let response = handler
            .handle(batch(&[Some("a"), Some("b")]), None)
            .await
            .unwrap();

        assert_eq!(response, Some(json!({ "text": "a: hi from a" })));
    }

    #[tokio::test]
    async fn test_unstructured_responses_are_dropped() {
        for reply in [json!("plain"), json!({}), json!([]), json!(42)] {
            let mut bot = Bot::new(MockConnector::new());
            bot.on_event(Action::new(move |ctx: Arc<TestContext>, _: Props| {
                let reply = reply.clone();
                async move { ctx.set_response(reply) }
            }));

            let handler = bot.create_request_handler().unwrap();
            let response = handler
                .handle(json!({ "user": "a", "text": "hi" }), None)
                .await
                .unwrap();
            assert_eq!(response, None);
        }
    }

    #[tokio::test]
    async fn test_plugins_run_before_handler() {
        let mut bot = Bot::new(MockConnector::new());
        bot.use_plugin(crate::Plugin::new("enrich", |ctx: Arc<TestContext>| async move {
            ctx.with_session(|s| s.set("enriched", true)).transpose()?;
            Ok::<_, BoxError>(())
        }))
        .on_event(Action::new(|ctx: Arc<TestContext>, _: Props| async move {
            let enriched = ctx
                .session()
                .and_then(|s| s.get::<bool>("enriched"))
                .unwrap_or(false);
            ctx.reply(format!("enriched={enriched}"));
        }));

        let handler = bot.create_request_handler().unwrap();
        let response = handler
            .handle(json!({ "user": "a", "text": "hi" }), None)
            .await
            .unwrap();

        assert_eq!(response, Some(json!({ "text": "enriched=true" })));
    }

    #[tokio::test]
    async fn test_plugin_failure_skips_handler() {
        let connector = MockConnector::new();
        let stats = connector.stats();
        let mut bot = Bot::new(connector);
        let unhandled = count_unhandled(&mut bot);
        bot.use_plugin(crate::Plugin::new("broken", |_: Arc<TestContext>| async {
            Err::<(), BoxError>("plugin exploded".into())
        }))
        .on_event(echo());

        let handler = bot.create_request_handler().unwrap();
        let response = handler
            .handle(batch(&[Some("a"), Some("b")]), None)
            .await
            .unwrap();

        assert_eq!(response, None);
        assert_eq!(unhandled.load(Ordering::SeqCst), 2);
        assert_eq!(count(&stats.ended), 0);
    }

    #[tokio::test]
    async fn test_initial_state_and_request_reach_context() {
        let mut bot = Bot::new(MockConnector::new());
        bot.set_initial_state(json!({ "greeting": "welcome" }))
            .on_event(Action::new(|ctx: Arc<TestContext>, _: Props| async move {
                let base = ctx.base();
                let greeting = base.initial_state()["greeting"].as_str().unwrap_or("?");
                let token = base.request().and_then(|r| r.header("x-token")).unwrap_or("-");
                ctx.reply(format!("{greeting} {token}"));
            }));

        let handler = bot.create_request_handler().unwrap();
        let request = RequestContext::new()
            .with_method("POST")
            .with_header("X-Token", "secret");
        let response = handler
            .handle(json!({ "text": "hi" }), Some(request))
            .await
            .unwrap();

        assert_eq!(response, Some(json!({ "text": "welcome secret" })));
    }

    #[tokio::test]
    async fn test_store_initialized_once() {
        let store = RecordingStore::new();
        let mut bot = bot_with(MockConnector::new(), &store);
        bot.on_event(echo());

        let first = bot.create_request_handler().unwrap();
        let second = bot.create_request_handler().unwrap();
        let body = json!({ "user": "a", "text": "hi" });

        let (a, b) = tokio::join!(
            first.handle(body.clone(), None),
            second.handle(body.clone(), None)
        );
        assert_ok!(a);
        assert_ok!(b);
        first.handle(body, None).await.unwrap();

        assert_eq!(count(&store.init_calls), 1);
    }

    #[tokio::test]
    async fn test_decode_failure_aborts_request() {
        let mut bot = Bot::new(MockConnector::new());
        bot.on_event(echo());

        let handler = bot.create_request_handler().unwrap();
        let err = handler
            .handle(json!({ "fail_decode": true }), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Connector(_)));
        assert!(!err.is_configuration());
    }

    #[tokio::test]
    async fn test_fire_and_forget_hides_decode_failure() {
        let mut bot = Bot::builder(MockConnector::new()).sync(false).build();
        bot.on_event(echo());

        let handler = bot.create_request_handler().unwrap();
        let response = handler.handle(json!({ "fail_decode": true }), None).await;
        assert_eq!(assert_ok!(response), None);
    }

    #[tokio::test]
    async fn test_handlers_are_not_bounded() {
        const EVENTS: usize = 7;
        let mut bot = Bot::new(MockConnector::new());
        let barrier = Arc::new(Barrier::new(EVENTS));
        bot.on_event(Action::new(move |ctx: Arc<TestContext>, _: Props| {
            let barrier = Arc::clone(&barrier);
            async move {
                barrier.wait().await;
                ctx.reply("all running");
            }
        }));

        let handler = bot.create_request_handler().unwrap();
        let users = ["a", "b", "c", "d", "e", "f", "g"].map(Some);
        let response = tokio::time::timeout(
            Duration::from_secs(3),
            handler.handle(batch(&users), None),
        )
        .await
        .expect("handlers did not run concurrently")
        .unwrap();

        assert_eq!(response, Some(json!({ "text": "all running" })));
    }

    fn panicking() -> Action<TestContext> {
        Action::new(|ctx: Arc<TestContext>, _: Props| async move {
            if ctx.text() == "boom" {
                panic!("boom");
            }
            ctx.reply("calm");
        })
    }

    #[tokio::test]
    async fn test_panicking_handler_reaches_error_handler() {
        let mut bot = Bot::new(MockConnector::new());
        bot.on_event(panicking())
            .on_error(Action::new(|ctx: Arc<TestContext>, props: Props| async move {
                let cause = props.error().map(ToString::to_string).unwrap_or_default();
                ctx.reply(format!("recovered ({cause})"));
            }));

        let handler = bot.create_request_handler().unwrap();
        let response = handler
            .handle(json!({ "user": "a", "text": "boom" }), None)
            .await
            .unwrap();

        assert_eq!(
            response,
            Some(json!({ "text": "recovered (handler panicked: boom)" }))
        );
    }

    #[tokio::test]
    async fn test_panicking_handler_is_reported_on_bus() {
        let store = RecordingStore::new();
        let mut bot = bot_with(MockConnector::new(), &store);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bot.on_unhandled_error(move |err| sink.lock().push(err.to_string()));
        bot.on_event(panicking());

        let handler = bot.create_request_handler().unwrap();
        let body = json!({ "events": [
            { "user": "b", "text": "hi" },
            { "user": "a", "text": "boom" },
        ] });
        let response = handler.handle(body, None).await.unwrap();

        assert_eq!(response, Some(json!({ "text": "calm" })));
        assert_eq!(*seen.lock(), ["handler panicked: boom"]);
        // The panicked context still has its session written back.
        assert_eq!(store.writes(), ["test:b", "test:a"]);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_persistence() {
        let store = RecordingStore::new();
        store.fail_writes_for("test:a");
        let mut bot = bot_with(MockConnector::new(), &store);
        bot.on_event(echo());

        let handler = bot.create_request_handler().unwrap();
        let response = handler
            .handle(batch(&[Some("a"), Some("b")]), None)
            .await
            .unwrap();

        assert_eq!(response, Some(json!({ "text": "a: hi from a" })));
        assert_eq!(store.writes(), ["test:b"]);
    }

    #[tokio::test]
    async fn test_fire_and_forget_persists_later() {
        let store = RecordingStore::new();
        let store_handle: BoxedSessionStore = store.clone();
        let mut bot = Bot::builder(MockConnector::new())
            .shared_session_store(store_handle)
            .sync(false)
            .build();

        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);
        bot.on_event(Action::new(move |ctx: Arc<TestContext>, _: Props| {
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                ctx.reply("late");
            }
        }));

        let handler = bot.create_request_handler().unwrap();
        assert!(!handler.is_sync());
        let response = handler
            .handle(json!({ "user": "a", "text": "hi" }), None)
            .await
            .unwrap();

        assert_eq!(response, None);
        assert!(store.writes().is_empty());

        release.notify_one();
        store.wait_for_write().await;
        assert_eq!(store.writes(), ["test:a"]);
        assert!(store.stored("test:a").await.unwrap().last_activity().is_some());
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip_through_bot() {
        let mut bot = Bot::builder(MockConnector::new())
            .session_store(MemorySessionStore::new())
            .build();
        bot.on_event(Action::new(|ctx: Arc<TestContext>, _: Props| async move {
            ctx.with_session(|s| s.set("last_text", ctx.text())).transpose()?;
            Ok::<_, BoxError>(())
        }));

        let handler = bot.create_request_handler().unwrap();
        handler
            .handle(json!({ "user": "a", "text": "remember me" }), None)
            .await
            .unwrap();

        let stored = bot.session_store().read("test:a").await.unwrap().unwrap();
        assert_eq!(stored.id(), Some("test:a"));
        assert_eq!(stored.platform(), Some("test"));
        assert_eq!(stored.get::<String>("last_text").as_deref(), Some("remember me"));
    }
}
