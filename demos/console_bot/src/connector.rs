//! A connector for JSON lines typed into the terminal.

use parking_lot::Mutex;
use parley::prelude::*;
use serde::Deserialize;
use serde_json::{Value, json};

/// One message typed by a user.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleEvent {
    pub user: String,
    pub text: String,
}

impl ConsoleEvent {
    fn parse(value: &Value) -> ConnectorResult<Self> {
        Self::deserialize(value).map_err(|e| ConnectorError::parse(e.to_string()))
    }
}

/// Context for one console message. Replies are buffered and returned together.
pub struct ConsoleContext {
    base: BaseContext<ConsoleEvent>,
    outbox: Mutex<Vec<String>>,
}

impl ConsoleContext {
    /// Queues a reply line.
    pub fn say(&self, line: impl Into<String>) {
        self.outbox.lock().push(line.into());
    }

    /// Moves the queued lines into the response.
    pub fn flush(&self) {
        let lines = std::mem::take(&mut *self.outbox.lock());
        if !lines.is_empty() {
            self.set_response(json!({ "to": self.event().user, "messages": lines }));
        }
    }
}

#[async_trait]
impl BotContext for ConsoleContext {
    type Event = ConsoleEvent;

    fn base(&self) -> &BaseContext<ConsoleEvent> {
        &self.base
    }

    async fn handler_did_end(&self) -> Result<(), BoxError> {
        self.flush();
        Ok(())
    }
}

/// Accepts `{"user", "text"}` or `{"events": [{"user", "text"}, ...]}`.
pub struct ConsoleConnector;

#[async_trait]
impl Connector for ConsoleConnector {
    type Event = ConsoleEvent;
    type Context = ConsoleContext;

    fn platform(&self) -> &str {
        "console"
    }

    async fn map_request_to_events(&self, body: &Value) -> ConnectorResult<Vec<ConsoleEvent>> {
        match body.get("events").and_then(Value::as_array) {
            Some(events) => events.iter().map(ConsoleEvent::parse).collect(),
            None => Ok(vec![ConsoleEvent::parse(body)?]),
        }
    }

    async fn get_unique_session_key(
        &self,
        source: EventSource<'_, ConsoleEvent>,
        _request: Option<&RequestContext>,
    ) -> ConnectorResult<Option<String>> {
        Ok(match source {
            EventSource::Body(body) => body["user"].as_str().map(str::to_owned),
            EventSource::Event(event) => Some(event.user.clone()),
        })
    }

    async fn update_session(
        &self,
        session: &mut Session,
        source: EventSource<'_, ConsoleEvent>,
    ) -> ConnectorResult<()> {
        let user = match source {
            EventSource::Body(body) => body["user"].as_str().map(str::to_owned),
            EventSource::Event(event) => Some(event.user.clone()),
        };
        if let Some(user) = user {
            session.set("user", user)?;
        }
        Ok(())
    }

    async fn create_context(
        &self,
        params: ContextParams<ConsoleEvent>,
    ) -> ConnectorResult<ConsoleContext> {
        Ok(ConsoleContext {
            base: BaseContext::new(params),
            outbox: Mutex::new(Vec::new()),
        })
    }
}
