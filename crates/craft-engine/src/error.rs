//! Error types for the crafting engine
//!
//! - [`AcquisitionError`]: seed image fetch/decode failures
//! - [`GenerationError`]: describe/fuse collaborator failures
//! - [`CraftError`]: everything an engine entry point can surface
//!
//! All of them are `Clone`: concurrent merges of the same pair share one
//! in-flight call, and its failure is handed to each of them.

use craft_element::{ElementId, InstanceId};
use craft_store::StoreError;
use std::path::PathBuf;
use std::sync::Arc;

/// Main engine error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum CraftError {
    /// Seed acquisition failed
    #[error("acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// External generation failed
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Durable or session store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A referenced element is missing from the registry
    #[error("inconsistent state: {reason}")]
    InconsistentState { reason: String },

    /// Crafting was started but the durable store holds no elements
    #[error("no elements found")]
    NoElements,

    /// No credential held for collaborator calls
    #[error("no credential configured")]
    MissingCredential,

    /// Workspace instance does not exist
    #[error("workspace instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// An instance cannot be merged with itself
    #[error("cannot merge instance {0} with itself")]
    SelfMerge(InstanceId),

    /// Progress was reset while the operation ran; its result was dropped
    #[error("progress was reset before the combination finished")]
    Superseded,
}

impl CraftError {
    /// Registry lookup miss for `id`
    #[inline]
    pub fn missing_element(id: ElementId) -> Self {
        Self::InconsistentState {
            reason: format!("element {id} is not in the registry"),
        }
    }

    /// Check if retrying the same operation may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Generation(_) => true,
            Self::Acquisition(e) => e.is_transient(),
            Self::Store(StoreError::Io { .. }) => true,
            _ => false,
        }
    }

    /// Check if the only sensible recovery is a full reset
    #[inline]
    #[must_use]
    pub fn recommends_reset(&self) -> bool {
        matches!(
            self,
            Self::InconsistentState { .. }
                | Self::NoElements
                | Self::Store(StoreError::Corrupted { .. })
        )
    }

    /// Text for a dismissible user notification
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NoElements => {
                "No elements found. Please reset your progress to choose new starting images."
                    .to_string()
            }
            Self::Generation(e) => format!("Failed to combine: {e}"),
            Self::Acquisition(e) => {
                format!("{e}. Please try again or use your own images.")
            }
            Self::MissingCredential => "Please enter an API key to continue.".to_string(),
            other if other.recommends_reset() => {
                format!("{other}. You may need to reset your progress.")
            }
            other => other.to_string(),
        }
    }
}

/// Seed acquisition errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum AcquisitionError {
    /// Batch had no sources
    #[error("no image sources supplied")]
    NoSources,

    /// Local file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Bytes are not a supported image format
    #[error("unsupported image format in {source_name}")]
    UnsupportedFormat { source_name: String },

    /// Remote answered with a non-success status
    #[error("HTTP error {status} fetching {url}")]
    Http { url: String, status: u16 },

    /// Remote could not be reached or the body could not be read
    #[error("failed to fetch image from {url}: {message}")]
    Network { url: String, message: String },

    /// Remote returned no bytes
    #[error("empty response body from {url}")]
    EmptyBody { url: String },
}

impl AcquisitionError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Whether another attempt could plausibly succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NoSources | Self::UnsupportedFormat { .. } => false,
            Self::Io { source, .. } => !matches!(
                source.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ),
            Self::Http { .. } | Self::Network { .. } | Self::EmptyBody { .. } => true,
        }
    }
}

/// External collaborator errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Describe call failed
    #[error("image description failed: {0}")]
    Describe(String),

    /// Fusion call failed
    #[error("image fusion failed: {0}")]
    Fusion(String),

    /// Fusion response carried no image
    #[error("API did not return a new image")]
    NoImage,

    /// Response could not be interpreted
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_errors_are_retryable() {
        let err = CraftError::from(GenerationError::NoImage);
        assert!(err.is_retryable());
        assert!(!err.recommends_reset());
        assert!(err.user_message().starts_with("Failed to combine"));
    }

    #[test]
    fn inconsistent_state_recommends_reset() {
        let err = CraftError::missing_element(ElementId::new());
        assert!(err.recommends_reset());
        assert!(!err.is_retryable());
        assert!(err.user_message().contains("reset"));
        assert!(CraftError::NoElements.user_message().starts_with("No elements found"));
    }

    #[test]
    fn superseded_needs_no_recovery() {
        let err = CraftError::Superseded;
        assert!(!err.is_retryable());
        assert!(!err.recommends_reset());
        assert!(CraftError::SelfMerge(InstanceId::new()).user_message().contains("itself"));
    }

    #[test]
    fn uninitialized_store_is_not_retryable() {
        let err = CraftError::from(StoreError::Uninitialized);
        assert!(!err.is_retryable());
        assert!(!err.recommends_reset());
    }

    #[test]
    fn acquisition_transience() {
        assert!(AcquisitionError::Http { url: "u".into(), status: 503 }.is_transient());
        assert!(!AcquisitionError::UnsupportedFormat { source_name: "a.txt".into() }.is_transient());
        assert!(!AcquisitionError::io(
            "missing.png",
            std::io::Error::from(std::io::ErrorKind::NotFound)
        )
        .is_transient());
        assert!(AcquisitionError::io(
            "busy.png",
            std::io::Error::from(std::io::ErrorKind::Interrupted)
        )
        .is_transient());
    }
}
