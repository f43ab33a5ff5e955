//! Error types for the Parley dispatcher.

use parley_core::{ConnectorError, HandlerError, StoreError};
use thiserror::Error;

/// Errors returned by [`Bot`](crate::Bot) and [`RequestHandler`](crate::RequestHandler).
#[derive(Debug, Clone, Error)]
pub enum BotError {
    /// No primary handler was registered with [`Bot::on_event`](crate::Bot::on_event).
    #[error("no event handler registered")]
    MissingHandler,

    /// The inbound body was `null`, an empty string or an empty object.
    #[error("request body is empty")]
    EmptyBody,

    /// An event's handler failed and no error handler recovered it.
    #[error("event handling failed: {0}")]
    Handler(#[from] HandlerError),

    /// The session store failed while a request was being resolved.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The connector failed while a request was being resolved.
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

impl BotError {
    /// Returns `true` for wiring mistakes raised before any work started.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingHandler | Self::EmptyBody)
    }
}

/// Result type for dispatcher operations.
pub type BotResult<T> = Result<T, BotError>;
