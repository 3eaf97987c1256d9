//! Ephemeral session state
//!
//! Whole structured values (the workspace instance list, the combination
//! cache, the "crafting started" flag, the credential) live here for the
//! lifetime of one session and are never written to disk. Every mutation is
//! broadcast so other observers sharing the state can re-sync.

use crate::error::StoreError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Keys of the values kept in session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionKey {
    WorkspaceInstances,
    CombinationCache,
    CraftingStarted,
    Credential,
}

impl SessionKey {
    /// Keys that hold crafting progress; cleared together on reset
    pub const PROGRESS: [SessionKey; 3] = [
        SessionKey::WorkspaceInstances,
        SessionKey::CombinationCache,
        SessionKey::CraftingStarted,
    ];
}

/// Notification that a session value changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionChange {
    pub key: SessionKey,
    pub removed: bool,
}

/// Opaque credential attached to collaborator calls
///
/// Held only in session state. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into().trim().to_string())
    }

    #[inline]
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Session-scoped key/value state with change notifications
#[derive(Debug)]
pub struct SessionStore {
    values: RwLock<HashMap<SessionKey, serde_json::Value>>,
    changes: broadcast::Sender<SessionChange>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            values: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Read and decode the value under `key`
    ///
    /// # Errors
    /// Returns [`StoreError::Serialization`] if the stored value does not
    /// decode as `T`
    pub fn get<T: DeserializeOwned>(&self, key: SessionKey) -> Result<Option<T>, StoreError> {
        let guard = self.values.read();
        match guard.get(&key) {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }

    /// Encode and store `value` under `key`, replacing any previous value
    ///
    /// # Errors
    /// Returns [`StoreError::Serialization`] if `value` fails to encode
    pub fn set<T: Serialize + ?Sized>(&self, key: SessionKey, value: &T) -> Result<(), StoreError> {
        let encoded = serde_json::to_value(value)?;
        self.values.write().insert(key, encoded);
        self.notify(key, false);
        Ok(())
    }

    /// Remove the value under `key`
    pub fn remove(&self, key: SessionKey) {
        if self.values.write().remove(&key).is_some() {
            self.notify(key, true);
        }
    }

    #[must_use]
    pub fn contains(&self, key: SessionKey) -> bool {
        self.values.read().contains_key(&key)
    }

    /// Drop all crafting progress, keeping the credential
    pub fn clear_progress(&self) {
        for key in SessionKey::PROGRESS {
            self.remove(key);
        }
    }

    /// Receive a [`SessionChange`] for every subsequent mutation
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }

    /// Stored credential, if any
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.get::<Credential>(SessionKey::Credential)
            .ok()
            .flatten()
            .filter(|c| !c.is_blank())
    }

    /// Whether a crafting session has been started (seeds acquired)
    #[must_use]
    pub fn crafting_started(&self) -> bool {
        self.get::<bool>(SessionKey::CraftingStarted)
            .ok()
            .flatten()
            .unwrap_or(false)
    }

    fn notify(&self, key: SessionKey, removed: bool) {
        // No receivers is fine.
        let _ = self.changes.send(SessionChange { key, removed });
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
