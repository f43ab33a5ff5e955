//! Session store abstraction.
//!
//! The dispatcher reads a session before running an event's handler and
//! writes it back once the handler finished. Backends only need to provide
//! keyed reads and writes; eviction and durability are their own concern.

mod memory;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::session::Session;

pub use memory::{DEFAULT_CAPACITY, DEFAULT_TTL, MemorySessionStore};

/// An asynchronous key/value store of [`Session`] records.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Prepares the backend (connections, tables, ...).
    ///
    /// The dispatcher calls this once per bot before the first read.
    async fn init(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Reads the session stored under `id`.
    async fn read(&self, id: &str) -> StoreResult<Option<Session>>;

    /// Stores `session` under `id`, replacing any previous record.
    async fn write(&self, id: &str, session: &Session) -> StoreResult<()>;

    /// Deletes the session stored under `id`.
    async fn destroy(&self, id: &str) -> StoreResult<()>;
}

/// A shared session store trait object.
pub type BoxedSessionStore = std::sync::Arc<dyn SessionStore>;
