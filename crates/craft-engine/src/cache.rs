//! Combination cache using moka
//!
//! Memoizes `pair → result element`. The cache never evicts and never
//! overwrites: the first successful combination of a pair is the answer
//! for the rest of the session. moka's `try_get_with` coalesces concurrent
//! initialisations of one key, so at most one generation per pair is in
//! flight; every other caller awaits and shares its outcome.

use craft_element::{ElementId, PairKey};
use craft_store::{SessionKey, SessionStore, StoreError};
use moka::future::Cache;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of memoized pairs
    pub entry_count: u64,
}

/// Session-scoped memo of combination results
#[derive(Debug, Clone)]
pub struct CombinationCache {
    inner: Cache<PairKey, ElementId>,
}

impl CombinationCache {
    /// Create an empty, unbounded cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().build(),
        }
    }

    /// Result recorded for `key`, if any
    #[inline]
    pub async fn get(&self, key: &PairKey) -> Option<ElementId> {
        self.inner.get(key).await
    }

    /// Record `result` for `key` unless an entry already exists
    ///
    /// Returns the value now held for `key`.
    pub async fn insert_if_absent(&self, key: PairKey, result: ElementId) -> ElementId {
        self.inner.get_with(key, async move { result }).await
    }

    /// Resolve `key`, running `init` only if no value exists and no other
    /// caller is already running it
    ///
    /// A failed `init` leaves no entry behind; the error is shared with any
    /// callers that were waiting on the same key.
    pub async fn try_get_or_init<F, E>(&self, key: PairKey, init: F) -> Result<ElementId, Arc<E>>
    where
        F: Future<Output = Result<ElementId, E>>,
        E: Send + Sync + 'static,
    {
        self.inner.try_get_with(key, init).await
    }

    #[inline]
    pub async fn contains(&self, key: &PairKey) -> bool {
        self.inner.get(key).await.is_some()
    }

    /// Drop the entry for `key`
    #[inline]
    pub async fn invalidate(&self, key: &PairKey) {
        self.inner.invalidate(key).await;
    }

    /// Drop every entry
    #[inline]
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// All entries, keyed by the pair key string form
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, ElementId> {
        self.inner
            .iter()
            .map(|(key, id)| (key.to_string(), id))
            .collect()
    }

    /// Mirror the cache into session state
    ///
    /// # Errors
    /// Returns error if the snapshot cannot be encoded
    pub fn save(&self, session: &SessionStore) -> Result<(), StoreError> {
        session.set(SessionKey::CombinationCache, &self.snapshot())
    }

    /// Load entries from session state; malformed keys are skipped
    ///
    /// Returns the number of entries loaded.
    ///
    /// # Errors
    /// Returns error if the stored value is not a string map
    pub async fn load(&self, session: &SessionStore) -> Result<usize, StoreError> {
        let Some(stored) =
            session.get::<BTreeMap<String, ElementId>>(SessionKey::CombinationCache)?
        else {
            return Ok(0);
        };

        let mut loaded = 0;
        for (raw, id) in stored {
            match raw.parse::<PairKey>() {
                Ok(key) => {
                    self.insert_if_absent(key, id).await;
                    loaded += 1;
                }
                Err(err) => tracing::warn!(key = %raw, error = %err, "skipping malformed cache key"),
            }
        }
        Ok(loaded)
    }

    /// Get cache statistics
    #[inline]
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
        }
    }
}

impl Default for CombinationCache {
    fn default() -> Self {
        Self::new()
    }
}
