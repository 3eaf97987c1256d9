//! Craft Engine - placement, combination and seed acquisition
//!
//! The engine behind the crafting sandbox:
//! - Tracks placed instances and turns drags into merge requests
//! - Combines element pairs through an external fuser, at most once per pair
//! - Commits discoveries durably before anything else can see them
//! - Acquires seed elements with bounded retry and placeholder fallback
//!
//! # Example
//!
//! ```rust,ignore
//! use craft_engine::prelude::*;
//!
//! # async fn example(collaborators: Collaborators) -> Result<(), CraftError> {
//! let session = CraftSession::open(
//!     CraftConfig::new(),
//!     Arc::new(FileElementStore::new("nanocraft-db")),
//!     Arc::new(SessionStore::new()),
//!     collaborators,
//! )
//! .await?;
//!
//! session.set_credential(Credential::new("api-key"))?;
//! let seeds = session.acquire_random_seeds().await?;
//! let a = session.place(seeds[0].id(), Point::new(200.0, 200.0))?;
//! let b = session.place(seeds[1].id(), Point::new(260.0, 200.0))?;
//! let outcome = session.merge_instances(a, b).await?;
//! println!("discovered {}", outcome.element().title);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod acquisition;
pub mod cache;
pub mod collaborator;
pub mod combine;
pub mod config;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod registry;
pub mod session;
pub mod workspace;

pub use acquisition::{
    read_local, AcquisitionProgress, Acquirer, Placeholder, RetryOutcome, RetryPolicy, RetryState,
    SeedSource,
};
pub use cache::{CacheStats, CombinationCache};
pub use collaborator::{
    fusion_prompt, FusionOutput, FusionPart, ImageDescriber, ImageFuser, Labels,
    DESCRIBE_INSTRUCTION, FUSION_INSTRUCTION,
};
pub use combine::{Combination, CombinationEngine};
pub use config::{AcquisitionConfig, CanvasConfig, CraftConfig, TieBreak};
pub use error::{AcquisitionError, CraftError, GenerationError};
pub use fetch::{HttpImageFetcher, ImageFetcher};
pub use geometry::{Point, Rect};
pub use registry::Registry;
pub use session::{Collaborators, CraftSession, DropResult, MergeOutcome, Phase};
pub use workspace::{DragOutcome, Instance, Workspace};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving a crafting session
    pub use crate::{
        Collaborators, CraftConfig, CraftError, CraftSession, DropResult, MergeOutcome, Phase,
        Point, SeedSource,
    };
    pub use craft_element::{Element, ElementId, InstanceId};
    pub use craft_store::{Credential, FileElementStore, MemoryElementStore, SessionStore};
    pub use std::sync::Arc;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
