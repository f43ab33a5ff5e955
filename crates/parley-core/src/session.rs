//! Durable per-conversation session records.
//!
//! A [`Session`] is serialized as one flat JSON object:
//!
//! ```json
//! { "id": "console:42", "platform": "console", "lastActivity": "2026-01-01T00:00:00Z", "step": 2 }
//! ```
//!
//! `id` and `platform` are write-once. They are filled by
//! [`ensure_identity`](Session::ensure_identity) and can never be replaced
//! afterwards, neither through that method nor through the state API.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SessionError;

/// Keys managed by the runtime that dialog state may not use.
pub const RESERVED_KEYS: [&str; 3] = ["id", "platform", "lastActivity"];

/// Builds the canonical session id for a platform and connector session key.
pub fn session_id(platform: &str, session_key: &str) -> String {
    format!("{platform}:{session_key}")
}

/// Durable state for one logical conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    platform: Option<String>,
    #[serde(
        default,
        rename = "lastActivity",
        skip_serializing_if = "Option::is_none"
    )]
    last_activity: Option<DateTime<Utc>>,
    #[serde(flatten)]
    state: Map<String, Value>,
}

impl Session {
    /// Creates an empty session with no identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session id, once assigned.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the platform identifier, once assigned.
    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    /// Returns when the session was last persisted after handling an event.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    /// Fills `id` and `platform` if they are still unset.
    ///
    /// Values already present (for example on a record read back from the
    /// store) are kept unchanged.
    pub fn ensure_identity(&mut self, id: impl Into<String>, platform: impl Into<String>) {
        if self.id.is_none() {
            self.id = Some(id.into());
        }
        if self.platform.is_none() {
            self.platform = Some(platform.into());
        }
    }

    /// Stamps `lastActivity` with the current time.
    pub fn touch(&mut self) {
        self.last_activity = Some(Utc::now());
    }

    /// Read-only view of the application state.
    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    /// Returns the raw JSON value stored under `key`.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// Deserializes the value stored under `key`.
    ///
    /// Returns `None` when the key is missing or holds an incompatible value.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.state
            .get(key)
            .and_then(|value| T::deserialize(value).ok())
    }

    /// Returns `true` if application state exists under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.state.contains_key(key)
    }

    /// Stores a raw JSON value, returning the previous one.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<Option<Value>, SessionError> {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) {
            return Err(SessionError::ReservedKey { key });
        }
        Ok(self.state.insert(key, value))
    }

    /// Serializes `value` and stores it under `key`.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)?;
        self.insert(key, value).map(|_| ())
    }

    /// Removes application state under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.state.remove(key)
    }
}
