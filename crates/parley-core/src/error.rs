//! Error types shared by every Parley crate.
//!
//! Dispatch-level errors (like `BotError`) are defined in parley-framework.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// A boxed error returned by dialog actions, plugins and context hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Session Errors
// =============================================================================

/// Errors raised while manipulating a [`Session`](crate::Session).
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The key is managed by the runtime and cannot be written as state.
    #[error("session key '{key}' is reserved")]
    ReservedKey {
        /// The rejected key.
        key: String,
    },

    /// A state value could not be converted to or from JSON.
    #[error("session state serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors reported by a [`SessionStore`](crate::SessionStore) backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend failed to complete the operation.
    #[error("session store error: {0}")]
    Backend(String),

    /// A stored record could not be encoded or decoded.
    #[error("session record serialization failed: {0}")]
    Serialization(String),

    /// The store has been shut down.
    #[error("session store is closed")]
    Closed,
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Connector Errors
// =============================================================================

/// Errors that can occur in connector operations.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// The payload could not be decoded into events.
    #[error("failed to parse request: {reason}")]
    Parse {
        /// Reason for failure.
        reason: String,
    },

    /// Internal connector error.
    #[error("connector error: {0}")]
    Internal(String),

    /// The connector tried to write an invalid session field.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ConnectorError {
    /// Creates an internal connector error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Creates a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse { reason: msg.into() }
    }
}

// =============================================================================
// Handler Errors
// =============================================================================

/// A failure raised while handling one event.
///
/// Cloning is cheap: the same failure is handed to the error handler, emitted
/// on the [`ErrorBus`](crate::ErrorBus) and returned from the event's task.
#[derive(Clone)]
pub struct HandlerError {
    inner: Arc<dyn std::error::Error + Send + Sync>,
}

impl HandlerError {
    /// Wraps any error.
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self {
            inner: Arc::from(err.into()),
        }
    }

    /// Creates an error from a plain message.
    pub fn msg(msg: impl Into<String>) -> Self {
        Self::new(msg.into())
    }

    /// Returns the wrapped error.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.inner.as_ref()
    }

    /// Attempts to downcast the wrapped error to a concrete type.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }
}

impl From<BoxError> for HandlerError {
    fn from(err: BoxError) -> Self {
        Self {
            inner: Arc::from(err),
        }
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for session store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
