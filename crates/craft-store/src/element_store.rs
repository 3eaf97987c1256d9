//! Durable element store contract
//!
//! The durable store is the source of truth for discovered elements. It is
//! keyed by element id, survives restarts, and is wiped only by `clear`.

use crate::error::StoreError;
use async_trait::async_trait;
use craft_element::{ContentHash, Element, ElementId};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};

/// Key-value record store for discovered elements
///
/// Every method except [`initialize`](Self::initialize) fails with
/// [`StoreError::Uninitialized`] until `initialize` has succeeded.
#[async_trait]
pub trait ElementStore: Send + Sync + Debug {
    /// Prepare the store; idempotent
    async fn initialize(&self) -> Result<(), StoreError>;

    /// Insert or replace the record for `element.id()`
    async fn put(&self, element: &Element) -> Result<(), StoreError>;

    /// All stored elements
    async fn get_all(&self) -> Result<Vec<Element>, StoreError>;

    /// Remove the records for `ids`; ids without a record are ignored
    async fn remove(&self, ids: &[ElementId]) -> Result<(), StoreError>;

    /// Remove every record; irreversible
    async fn clear(&self) -> Result<(), StoreError>;
}

/// On-disk form of an element: the element plus a digest of its image bytes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(flatten)]
    element: Element,
    checksum: ContentHash,
}

impl StoredRecord {
    #[must_use]
    pub fn new(element: Element) -> Self {
        let checksum = element.image().digest();
        Self { element, checksum }
    }

    /// Whether the stored digest still matches the image bytes
    #[must_use]
    pub fn verify(&self) -> bool {
        self.element.image().digest() == self.checksum
    }

    #[must_use]
    pub fn into_element(self) -> Element {
        self.element
    }
}

/// In-process element store
///
/// Keeps insertion order; an upsert keeps the record's original position.
#[derive(Debug, Default)]
pub struct MemoryElementStore {
    initialized: AtomicBool,
    records: RwLock<IndexMap<ElementId, Element>>,
}

impl MemoryElementStore {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_initialized(&self) -> Result<(), StoreError> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Uninitialized)
        }
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Whether a record exists for `id`
    #[must_use]
    pub fn contains(&self, id: ElementId) -> bool {
        self.records.read().contains_key(&id)
    }
}

#[async_trait]
impl ElementStore for MemoryElementStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn put(&self, element: &Element) -> Result<(), StoreError> {
        self.ensure_initialized()?;
        self.records.write().insert(element.id(), element.clone());
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Element>, StoreError> {
        self.ensure_initialized()?;
        Ok(self.records.read().values().cloned().collect())
    }

    async fn remove(&self, ids: &[ElementId]) -> Result<(), StoreError> {
        self.ensure_initialized()?;
        let mut records = self.records.write();
        for id in ids {
            records.shift_remove(id);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.ensure_initialized()?;
        self.records.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use craft_element::{ImagePayload, MediaType};

    fn element(title: &str) -> Element {
        Element::seed(title, "test", ImagePayload::new(title.as_bytes().to_vec(), MediaType::png()))
    }

    #[tokio::test]
    async fn access_before_initialize_fails() {
        let store = MemoryElementStore::new();
        assert!(matches!(store.get_all().await, Err(StoreError::Uninitialized)));
        assert!(matches!(store.put(&element("Fire")).await, Err(StoreError::Uninitialized)));
        assert!(matches!(store.clear().await, Err(StoreError::Uninitialized)));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let store = MemoryElementStore::new();
        store.initialize().await.unwrap();
        store.put(&element("Fire")).await.unwrap();
        store.initialize().await.unwrap();
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn put_upserts_by_id() {
        let store = MemoryElementStore::new();
        store.initialize().await.unwrap();

        let mut fire = element("Fire");
        store.put(&fire).await.unwrap();
        store.put(&element("Water")).await.unwrap();

        fire.title = "Blaze".to_string();
        store.put(&fire).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "Blaze");
    }

    #[tokio::test]
    async fn clear_empties_store() {
        let store = MemoryElementStore::new();
        store.initialize().await.unwrap();
        store.put(&element("Earth")).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_keeps_order_of_the_rest() {
        let store = MemoryElementStore::new();
        store.initialize().await.unwrap();
        let (fire, water, earth) = (element("Fire"), element("Water"), element("Earth"));
        for e in [&fire, &water, &earth] {
            store.put(e).await.unwrap();
        }

        store.remove(&[water.id(), ElementId::new()]).await.unwrap();

        let titles: Vec<String> = store.get_all().await.unwrap().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, ["Fire", "Earth"]);
    }

    #[test]
    fn record_verifies_checksum() {
        let record = StoredRecord::new(element("Air"));
        assert!(record.verify());

        let mut json = serde_json::to_value(&record).unwrap();
        json["imageB64"] = serde_json::Value::String("dGFtcGVyZWQ=".to_string());
        let tampered: StoredRecord = serde_json::from_value(json).unwrap();
        assert!(!tampered.verify());
    }
}
