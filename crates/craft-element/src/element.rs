//! Discovered elements

use crate::id::ElementId;
use crate::image::ImagePayload;
use crate::pair::{PairKey, ParentPair};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discovered artifact: title, description, picture and provenance
///
/// `id` and `parents` never change once the element exists. Seed elements
/// have no parents; combined elements record the sorted pair they came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    id: ElementId,
    pub title: String,
    pub description: String,
    #[serde(flatten)]
    image: ImagePayload,
    parents: Option<ParentPair>,
    #[serde(default = "Utc::now")]
    discovered_at: DateTime<Utc>,
}

impl Element {
    /// A seed element (no parents) with a fresh id
    #[must_use]
    pub fn seed(title: impl Into<String>, description: impl Into<String>, image: ImagePayload) -> Self {
        Self {
            id: ElementId::new(),
            title: title.into(),
            description: description.into(),
            image,
            parents: None,
            discovered_at: Utc::now(),
        }
    }

    /// An element produced by combining the pair behind `key`
    #[must_use]
    pub fn combined(
        key: PairKey,
        title: impl Into<String>,
        description: impl Into<String>,
        image: ImagePayload,
    ) -> Self {
        Self {
            id: ElementId::new(),
            title: title.into(),
            description: description.into(),
            image,
            parents: Some(key.parents()),
            discovered_at: Utc::now(),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ElementId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn image(&self) -> &ImagePayload {
        &self.image
    }

    #[inline]
    #[must_use]
    pub fn parents(&self) -> Option<ParentPair> {
        self.parents
    }

    #[inline]
    #[must_use]
    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }

    #[inline]
    #[must_use]
    pub fn is_seed(&self) -> bool {
        self.parents.is_none()
    }
}
