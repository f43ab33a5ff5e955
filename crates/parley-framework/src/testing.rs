//! Test doubles for the dispatcher tests.
//!
//! Payloads are either a single event `{ "user": "a", "text": "hi" }` or a
//! batch `{ "events": [ {...}, {...} ] }`. Events without a `user` are
//! stateless.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_core::{
    BaseContext, BotContext, BoxError, Connector, ConnectorError, ConnectorResult, ContextParams,
    EventSource, MemorySessionStore, RequestContext, Session, SessionStore, StoreError,
    StoreResult,
};
use serde_json::{Value, json};
use tokio::sync::Notify;

/// Reads a test counter.
pub(crate) fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

// ============================================================================
// Events & contexts
// ============================================================================

#[derive(Debug, Clone)]
pub(crate) struct TestEvent {
    pub(crate) user: Option<String>,
    pub(crate) text: String,
}

impl TestEvent {
    fn from_value(value: &Value) -> Self {
        Self {
            user: user_of(value),
            text: value
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        }
    }
}

fn user_of(value: &Value) -> Option<String> {
    value.get("user").and_then(Value::as_str).map(str::to_owned)
}

pub(crate) struct TestContext {
    base: BaseContext<TestEvent>,
    stats: Arc<ConnectorStats>,
}

impl TestContext {
    pub(crate) fn text(&self) -> &str {
        &self.event().text
    }

    pub(crate) fn user(&self) -> Option<&str> {
        self.event().user.as_deref()
    }

    pub(crate) fn reply(&self, text: impl Into<String>) {
        self.set_response(json!({ "text": text.into() }));
    }
}

#[async_trait]
impl BotContext for TestContext {
    type Event = TestEvent;

    fn base(&self) -> &BaseContext<TestEvent> {
        &self.base
    }

    async fn handler_did_end(&self) -> Result<(), BoxError> {
        self.stats.ended.fetch_add(1, Ordering::SeqCst);
        if self.text() == "fail_end" {
            return Err("flush failed".into());
        }
        Ok(())
    }
}

// ============================================================================
// MockConnector
// ============================================================================

#[derive(Default)]
pub(crate) struct ConnectorStats {
    pub(crate) map_calls: AtomicUsize,
    pub(crate) contexts: AtomicUsize,
    pub(crate) ended: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
    in_flight: AtomicUsize,
    sources: Mutex<Vec<&'static str>>,
}

impl ConnectorStats {
    /// Kinds of [`EventSource`] seen by `get_unique_session_key`.
    pub(crate) fn sources(&self) -> Vec<&'static str> {
        self.sources.lock().clone()
    }
}

pub(crate) struct MockConnector {
    stats: Arc<ConnectorStats>,
    resolve_delay: Duration,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self {
            stats: Arc::default(),
            resolve_delay: Duration::ZERO,
        }
    }

    pub(crate) fn with_resolve_delay(mut self, delay: Duration) -> Self {
        self.resolve_delay = delay;
        self
    }

    pub(crate) fn stats(&self) -> Arc<ConnectorStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Event = TestEvent;
    type Context = TestContext;

    fn platform(&self) -> &str {
        "test"
    }

    async fn map_request_to_events(&self, body: &Value) -> ConnectorResult<Vec<TestEvent>> {
        self.stats.map_calls.fetch_add(1, Ordering::SeqCst);
        if body.get("fail_decode").is_some() {
            return Err(ConnectorError::parse("unsupported payload"));
        }

        Ok(match body.get("events").and_then(Value::as_array) {
            Some(events) => events.iter().map(TestEvent::from_value).collect(),
            None => vec![TestEvent::from_value(body)],
        })
    }

    async fn get_unique_session_key(
        &self,
        source: EventSource<'_, TestEvent>,
        _request: Option<&RequestContext>,
    ) -> ConnectorResult<Option<String>> {
        let current = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.resolve_delay.is_zero() {
            tokio::time::sleep(self.resolve_delay).await;
        }
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);

        let key = match source {
            EventSource::Body(body) => {
                self.stats.sources.lock().push("body");
                user_of(body)
            }
            EventSource::Event(event) => {
                self.stats.sources.lock().push("event");
                event.user.clone()
            }
        };
        Ok(key)
    }

    async fn update_session(
        &self,
        session: &mut Session,
        _source: EventSource<'_, TestEvent>,
    ) -> ConnectorResult<()> {
        // Identity is already fixed and must survive this.
        session.ensure_identity("hijack:0", "hijack");
        let visits = session.get::<u64>("visits").unwrap_or(0);
        session.set("visits", visits + 1)?;
        Ok(())
    }

    async fn create_context(&self, params: ContextParams<TestEvent>) -> ConnectorResult<TestContext> {
        self.stats.contexts.fetch_add(1, Ordering::SeqCst);
        Ok(TestContext {
            base: BaseContext::new(params),
            stats: Arc::clone(&self.stats),
        })
    }
}

// ============================================================================
// RecordingStore
// ============================================================================

/// A [`MemorySessionStore`] that records calls and can fail writes.
#[derive(Default)]
pub(crate) struct RecordingStore {
    inner: MemorySessionStore,
    pub(crate) init_calls: AtomicUsize,
    pub(crate) reads: AtomicUsize,
    writes: Mutex<Vec<String>>,
    failing_writes: Mutex<HashSet<String>>,
    written: Notify,
}

impl RecordingStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::default()
    }

    /// Ids written so far, in write order.
    pub(crate) fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    pub(crate) fn fail_writes_for(&self, id: &str) {
        self.failing_writes.lock().insert(id.to_owned());
    }

    /// Waits until at least one write happened since the last call.
    pub(crate) async fn wait_for_write(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.written.notified())
            .await
            .expect("no session was written");
    }

    pub(crate) async fn stored(&self, id: &str) -> Option<Session> {
        self.inner.read(id).await.unwrap()
    }
}

#[async_trait]
impl SessionStore for RecordingStore {
    async fn init(&self) -> StoreResult<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(())
    }

    async fn read(&self, id: &str) -> StoreResult<Option<Session>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(id).await
    }

    async fn write(&self, id: &str, session: &Session) -> StoreResult<()> {
        if self.failing_writes.lock().contains(id) {
            return Err(StoreError::backend(format!("cannot write {id}")));
        }
        self.inner.write(id, session).await?;
        self.writes.lock().push(id.to_owned());
        self.written.notify_one();
        Ok(())
    }

    async fn destroy(&self, id: &str) -> StoreResult<()> {
        self.inner.destroy(id).await
    }
}
