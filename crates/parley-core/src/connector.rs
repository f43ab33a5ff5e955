//! Connector trait.
//!
//! Connectors bridge a messaging platform with the Parley dispatcher. The
//! dispatcher calls them in a fixed order for every inbound payload:
//!
//! ```text
//! normalize_body ─► map_request_to_events ─┬─► get_unique_session_key ─► update_session ─► create_context
//!                                          ├─► ...                      (one pipeline per event)
//!                                          └─► ...
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! #[async_trait]
//! impl Connector for ConsoleConnector {
//!     type Event = ConsoleEvent;
//!     type Context = ConsoleContext;
//!
//!     fn platform(&self) -> &str {
//!         "console"
//!     }
//!
//!     async fn map_request_to_events(&self, body: &Value) -> ConnectorResult<Vec<ConsoleEvent>> {
//!         ConsoleEvent::parse_all(body).map_err(ConnectorError::parse)
//!     }
//!
//!     async fn get_unique_session_key(
//!         &self,
//!         source: EventSource<'_, ConsoleEvent>,
//!         _request: Option<&RequestContext>,
//!     ) -> ConnectorResult<Option<String>> {
//!         Ok(match source {
//!             EventSource::Body(body) => body["user"].as_str().map(str::to_owned),
//!             EventSource::Event(event) => Some(event.user.clone()),
//!         })
//!     }
//!
//!     async fn update_session(
//!         &self,
//!         session: &mut Session,
//!         _source: EventSource<'_, ConsoleEvent>,
//!     ) -> ConnectorResult<()> {
//!         Ok(())
//!     }
//!
//!     async fn create_context(&self, params: ContextParams<ConsoleEvent>) -> ConnectorResult<ConsoleContext> {
//!         Ok(ConsoleContext::new(BaseContext::new(params)))
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde_json::Value;

use crate::context::{BotContext, ContextParams, RequestContext};
use crate::error::ConnectorResult;
use crate::session::Session;

/// What a connector should derive session information from.
///
/// Payloads carrying exactly one event hand the connector the whole body,
/// matching the call shape connectors had before multi-event payloads.
/// Payloads with several events hand over each event individually.
#[derive(Debug)]
pub enum EventSource<'a, E> {
    /// The full normalized body (single-event payloads).
    Body(&'a Value),
    /// One event taken from a multi-event payload.
    Event(&'a E),
}

impl<E> Clone for EventSource<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for EventSource<'_, E> {}

impl<'a, E> EventSource<'a, E> {
    /// Returns the body, if this source is the whole payload.
    pub fn body(&self) -> Option<&'a Value> {
        match *self {
            Self::Body(body) => Some(body),
            Self::Event(_) => None,
        }
    }

    /// Returns the event, if this source is a single event.
    pub fn event(&self) -> Option<&'a E> {
        match *self {
            Self::Body(_) => None,
            Self::Event(event) => Some(event),
        }
    }
}

/// A platform adapter consumed by the dispatcher.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// One platform-native event decoded from a payload.
    type Event: Send + Sync + 'static;

    /// The context type built for every event.
    type Context: BotContext<Event = Self::Event>;

    /// Platform identifier, used as the session id prefix.
    fn platform(&self) -> &str;

    /// Rewrites the raw body before it is decoded (e.g. key casing).
    ///
    /// The default implementation returns the body unchanged.
    fn normalize_body(&self, body: Value) -> Value {
        body
    }

    /// Decodes the body into an ordered list of events.
    async fn map_request_to_events(&self, body: &Value) -> ConnectorResult<Vec<Self::Event>>;

    /// Returns the key identifying the conversation, or `None` for stateless events.
    async fn get_unique_session_key(
        &self,
        source: EventSource<'_, Self::Event>,
        request: Option<&RequestContext>,
    ) -> ConnectorResult<Option<String>>;

    /// Writes platform-specific data (user profile, channel, ...) into the session.
    async fn update_session(
        &self,
        session: &mut Session,
        source: EventSource<'_, Self::Event>,
    ) -> ConnectorResult<()>;

    /// Builds the context for one event.
    async fn create_context(
        &self,
        params: ContextParams<Self::Event>,
    ) -> ConnectorResult<Self::Context>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_source_accessors() {
        let body = json!({ "text": "hi" });
        let source: EventSource<'_, u32> = EventSource::Body(&body);
        assert_eq!(source.body(), Some(&body));
        assert_eq!(source.event(), None);

        let event = 7_u32;
        let source = EventSource::Event(&event);
        let copied = source;
        assert_eq!(copied.event(), Some(&7));
        assert_eq!(source.body(), None);
    }
}
