//! Notification channel for unhandled per-event failures.
//!
//! Every context receives a clone of the bot's [`ErrorBus`]. When an event's
//! handler fails and no error handler recovers it, the failure is emitted to
//! every subscriber before the event's task resolves with the error.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use crate::error::HandlerError;

/// Callback invoked for every emitted error.
pub type ErrorSubscriber = Arc<dyn Fn(&HandlerError) + Send + Sync>;

/// Append-only list of error subscribers shared by all contexts of a bot.
///
/// Clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct ErrorBus {
    subscribers: Arc<RwLock<Vec<ErrorSubscriber>>>,
}

impl ErrorBus {
    /// Creates a bus without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber.
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&HandlerError) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Arc::new(subscriber));
    }

    /// Installs the logging sink if nobody subscribed yet.
    ///
    /// Returns `true` when the sink was installed.
    pub fn ensure_default_subscriber(&self) -> bool {
        let mut subscribers = self.subscribers.write();
        if !subscribers.is_empty() {
            return false;
        }
        subscribers.push(Arc::new(log_error));
        true
    }

    /// Delivers `err` to every subscriber in subscription order.
    pub fn emit(&self, err: &HandlerError) {
        // Snapshot so subscribers may subscribe while being notified.
        let subscribers = self.subscribers.read().clone();
        for subscriber in &subscribers {
            subscriber(err);
        }
    }

    /// Returns the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns `true` if nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }
}

impl std::fmt::Debug for ErrorBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

fn log_error(err: &HandlerError) {
    error!(error = %err, "Unhandled error while handling event");
}
