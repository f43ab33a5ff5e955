//! # Parley Core
//!
//! Core abstractions of the Parley conversational bot runtime.
//!
//! This crate defines the vocabulary shared between the dispatcher
//! (`parley-framework`), platform connectors and session backends:
//!
//! - **Sessions**: durable per-conversation records ([`Session`])
//! - **Session stores**: pluggable persistence ([`SessionStore`], [`MemorySessionStore`])
//! - **Connectors**: the platform adapter contract ([`Connector`], [`EventSource`])
//! - **Contexts**: per-event execution state ([`BaseContext`], [`BotContext`])
//! - **Error bus**: fan-out of unhandled failures ([`ErrorBus`])
//!
//! ## Data Flow
//!
//! ```text
//! ┌─────────────┐   events   ┌────────────┐  contexts  ┌───────────┐
//! │  Connector  │───────────▶│ Dispatcher │───────────▶│  Actions  │
//! │ (platform)  │            │ (framework)│◀───────────│ (dialog)  │
//! └─────────────┘            └────────────┘  sessions  └───────────┘
//!                                  │ ▲
//!                                  ▼ │
//!                            ┌──────────────┐
//!                            │ SessionStore │
//!                            └──────────────┘
//! ```

pub mod bus;
pub mod connector;
pub mod context;
pub mod error;
pub mod session;
pub mod store;

pub use bus::{ErrorBus, ErrorSubscriber};
pub use connector::{Connector, EventSource};
pub use context::{BaseContext, BotContext, ContextParams, RequestContext};
pub use error::{
    BoxError, ConnectorError, ConnectorResult, HandlerError, SessionError, StoreError,
    StoreResult,
};
pub use session::{RESERVED_KEYS, Session, session_id};
pub use store::{BoxedSessionStore, MemorySessionStore, SessionStore};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        BaseContext, BotContext, BoxError, Connector, ConnectorError, ConnectorResult,
        ContextParams, ErrorBus, EventSource, HandlerError, MemorySessionStore, RequestContext,
        Session, SessionStore, StoreError, StoreResult,
    };
}
