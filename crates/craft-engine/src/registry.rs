//! In-memory element registry
//!
//! Read-through index over the durable store, rebuilt at session start and
//! only ever appended to afterwards (until a full reset). Iteration order is
//! discovery order.

use crate::error::CraftError;
use craft_element::{Element, ElementId};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Ordered, append-only map of discovered elements
#[derive(Debug, Default)]
pub struct Registry {
    elements: RwLock<IndexMap<ElementId, Arc<Element>>>,
}

impl Registry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace contents with `elements`, keeping their order
    pub fn hydrate(&self, elements: impl IntoIterator<Item = Element>) {
        let mut guard = self.elements.write();
        guard.clear();
        for element in elements {
            guard.insert(element.id(), Arc::new(element));
        }
        tracing::debug!(count = guard.len(), "registry hydrated");
    }

    /// Add a newly discovered element
    ///
    /// Returns the registered element. An id that is already present keeps
    /// its existing entry: elements are immutable once registered.
    pub fn insert(&self, element: Element) -> Arc<Element> {
        let mut guard = self.elements.write();
        guard
            .entry(element.id())
            .or_insert_with(|| Arc::new(element))
            .clone()
    }

    #[must_use]
    pub fn get(&self, id: ElementId) -> Option<Arc<Element>> {
        self.elements.read().get(&id).cloned()
    }

    /// Look up `id`, treating a miss as corrupted state
    ///
    /// # Errors
    /// Returns [`CraftError::InconsistentState`] if `id` is not registered
    pub fn require(&self, id: ElementId) -> Result<Arc<Element>, CraftError> {
        self.get(id).ok_or_else(|| CraftError::missing_element(id))
    }

    #[must_use]
    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.read().contains_key(&id)
    }

    /// All elements in discovery order
    #[must_use]
    pub fn list(&self) -> Vec<Arc<Element>> {
        self.elements.read().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }

    /// Forget every element (full reset only)
    pub fn clear(&self) {
        self.elements.write().clear();
    }
}
