//! In-process session store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use super::SessionStore;
use crate::error::StoreResult;
use crate::session::Session;

/// Default number of sessions kept in memory.
pub const DEFAULT_CAPACITY: usize = 500;

/// Default time-to-live of an idle session (one year).
pub const DEFAULT_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

struct Entry {
    session: Session,
    /// `None` when `now + ttl` is past what `Instant` can represent.
    expires_at: Option<Instant>,
    last_used: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Monotonic use counter for least-recently-used eviction.
    clock: u64,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            trace!(session_id = %id, "Evicting least recently used session");
            self.entries.remove(&id);
        }
    }
}

/// A bounded in-memory cache of sessions.
///
/// Records expire `ttl` after their last write and the least recently used
/// record is evicted once `capacity` is exceeded. A `ttl` too large for the
/// platform clock never expires. Contents are lost when the
/// process exits.
pub struct MemorySessionStore {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

impl MemorySessionStore {
    /// Creates a store with [`DEFAULT_CAPACITY`] and [`DEFAULT_TTL`].
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    /// Creates a store with explicit limits. A zero capacity is raised to one.
    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the number of stored records, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn read(&self, id: &str) -> StoreResult<Option<Session>> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let expired = match inner.entries.get(id) {
            None => return Ok(None),
            Some(entry) => entry.expires_at.is_some_and(|at| at <= now),
        };
        if expired {
            trace!(session_id = %id, "Dropping expired session");
            inner.entries.remove(id);
            return Ok(None);
        }

        let tick = inner.tick();
        Ok(inner.entries.get_mut(id).map(|entry| {
            entry.last_used = tick;
            entry.session.clone()
        }))
    }

    async fn write(&self, id: &str, session: &Session) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let tick = inner.tick();
        let entry = Entry {
            session: session.clone(),
            expires_at: Instant::now().checked_add(self.ttl),
            last_used: tick,
        };

        if inner.entries.insert(id.to_owned(), entry).is_none()
            && inner.entries.len() > self.capacity
        {
            // The fresh entry holds the newest tick, so it is never the one evicted.
            inner.evict_lru();
        }
        Ok(())
    }

    async fn destroy(&self, id: &str) -> StoreResult<()> {
        self.inner.lock().entries.remove(id);
        Ok(())
    }
}

impl std::fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySessionStore")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}
