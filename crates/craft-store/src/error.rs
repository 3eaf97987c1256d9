//! Error types for the store layer
//!
//! Errors are cheap to clone: a failure inside a shared in-flight
//! combination is handed to every caller awaiting it.

use std::path::PathBuf;
use std::sync::Arc;

/// Errors raised by the durable store and session state
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Store used before `initialize` completed
    #[error("element store accessed before initialization")]
    Uninitialized,

    /// Filesystem failure
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Record or session value could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),

    /// Record failed integrity checks
    #[error("corrupted record {path}: {reason}")]
    Corrupted { path: PathBuf, reason: String },
}

impl StoreError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(err))
    }
}
