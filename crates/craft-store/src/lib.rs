//! Craft Store Layer
//!
//! Where crafting state lives, split by lifetime:
//!
//! - **Durable**: [`ElementStore`] holds every discovered element and
//!   survives restarts ([`FileElementStore`] on disk, [`MemoryElementStore`]
//!   in process).
//! - **Ephemeral**: [`SessionStore`] holds the workspace layout, the
//!   combination cache and the credential for one session only.
//!
//! # Architecture
//!
//! ```text
//! Element ──put──▶ ElementStore (durable, keyed by id)
//!                      │ get_all at startup
//!                      ▼
//!                  Registry (engine)      SessionStore (ephemeral)
//!                                            ├─ workspaceInstances
//!                                            ├─ combinationCache
//!                                            ├─ craftingStarted
//!                                            └─ credential
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod element_store;
pub mod error;
pub mod file;
pub mod session;

pub use element_store::{ElementStore, MemoryElementStore, StoredRecord};
pub use error::StoreError;
pub use file::FileElementStore;
pub use session::{Credential, SessionChange, SessionKey, SessionStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
