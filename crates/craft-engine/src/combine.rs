//! Combination engine
//!
//! Resolves a pair of elements into a result element. A cache hit never
//! reaches the fuser. A miss runs one generation per pair, however many
//! callers ask concurrently, and commits the result in a fixed order:
//! durable store, then registry, then cache. A failure at any step leaves
//! none of the later ones written.
//!
//! A full reset and a commit never interleave. A generation that was
//! started before a reset is discarded when it finishes, so nothing from
//! the previous progress reappears in the wiped store.

use crate::cache::CombinationCache;
use crate::collaborator::{fusion_prompt, ImageFuser};
use crate::error::CraftError;
use crate::registry::Registry;
use craft_element::{Element, ElementId, PairKey};
use craft_store::{Credential, ElementStore, SessionStore};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};

/// Result of [`CombinationEngine::combine`]
#[derive(Debug, Clone)]
pub struct Combination {
    /// The element the pair resolves to
    pub element: Arc<Element>,
    /// True only for the caller whose generation produced `element`
    pub discovered: bool,
}

/// Orders commits against a full reset
///
/// Commits hold the lock shared, a reset holds it exclusively. The epoch
/// counts completed resets.
#[derive(Debug, Default)]
struct ResetFence {
    epoch: AtomicU64,
    lock: RwLock<()>,
}

impl ResetFence {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}

/// Memoized, write-ordered pair combination
#[derive(Debug, Clone)]
pub struct CombinationEngine {
    store: Arc<dyn ElementStore>,
    registry: Arc<Registry>,
    cache: CombinationCache,
    session: Arc<SessionStore>,
    fuser: Arc<dyn ImageFuser>,
    fence: Arc<ResetFence>,
}

impl CombinationEngine {
    pub fn new(
        store: Arc<dyn ElementStore>,
        registry: Arc<Registry>,
        cache: CombinationCache,
        session: Arc<SessionStore>,
        fuser: Arc<dyn ImageFuser>,
    ) -> Self {
        Self {
            store,
            registry,
            cache,
            session,
            fuser,
            fence: Arc::new(ResetFence::default()),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &CombinationCache {
        &self.cache
    }

    /// Combine `a` and `b` (in either order)
    ///
    /// # Errors
    /// - [`CraftError::InconsistentState`] if either source, or a cached
    ///   result, is missing from the registry
    /// - [`CraftError::Generation`] if the fuser fails
    /// - [`CraftError::Store`] if the result cannot be persisted
    /// - [`CraftError::Superseded`] if a reset ran while generating
    #[tracing::instrument(skip(self, credential), fields(key))]
    pub async fn combine(
        &self,
        a: ElementId,
        b: ElementId,
        credential: &Credential,
    ) -> Result<Combination, CraftError> {
        let key = PairKey::new(a, b);
        tracing::Span::current().record("key", tracing::field::display(key));
        let epoch = self.fence.epoch();

        let first = self.registry.require(key.low())?;
        let second = self.registry.require(key.high())?;

        if let Some(id) = self.cache.get(&key).await {
            tracing::debug!(result = %id, "combination cache hit");
            return Ok(Combination {
                element: self.registry.require(id)?,
                discovered: false,
            });
        }

        let generated = AtomicBool::new(false);
        let id = self
            .cache
            .try_get_or_init(key, async {
                generated.store(true, Ordering::Release);
                self.generate(key, &first, &second, credential, epoch).await
            })
            .await
            .map_err(|shared| {
                let err = (*shared).clone();
                tracing::error!(error = %err, "combination failed");
                err
            })?;

        // a reset between commit and cache insertion leaves a dangling entry
        if self.fence.epoch() != epoch {
            self.cache.invalidate(&key).await;
            tracing::warn!("combination finished after a reset; result dropped");
            return Err(CraftError::Superseded);
        }

        let element = self.registry.require(id)?;
        let discovered = generated.load(Ordering::Acquire);
        if discovered {
            tracing::info!(element = %id, title = %element.title, "new element discovered");
            if let Err(err) = self.cache.save(&self.session) {
                tracing::warn!(error = %err, "failed to mirror combination cache into session");
            }
        } else {
            tracing::debug!(result = %id, "joined in-flight combination");
        }

        Ok(Combination {
            element,
            discovered,
        })
    }

    async fn generate(
        &self,
        key: PairKey,
        first: &Element,
        second: &Element,
        credential: &Credential,
        epoch: u64,
    ) -> Result<ElementId, CraftError> {
        let prompt = fusion_prompt(first, second);
        let output = self.fuser.fuse(credential, first, second, &prompt).await?;

        let element = Element::combined(
            key,
            output.labels.title,
            output.labels.description,
            output.image,
        );

        let _commit = self.commit_guard().await;
        if self.fence.epoch() != epoch {
            tracing::warn!(title = %element.title, "progress was reset during generation; discarding result");
            return Err(CraftError::Superseded);
        }
        self.store.put(&element).await?;
        Ok(self.registry.insert(element).id())
    }

    /// Hold off [`reset`](Self::reset) while the guard lives
    pub(crate) async fn commit_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.fence.lock.read().await
    }

    /// Wipe the durable store, registry and cache
    ///
    /// Waits for commits in progress. Generations still running will be
    /// discarded when they finish.
    ///
    /// # Errors
    /// Returns [`CraftError::Store`] if the store cannot be cleared; nothing
    /// else is touched in that case
    pub async fn reset(&self) -> Result<(), CraftError> {
        let _exclusive = self.fence.lock.write().await;
        self.store.clear().await?;
        self.fence.epoch.fetch_add(1, Ordering::AcqRel);
        self.registry.clear();
        self.cache.invalidate_all();
        Ok(())
    }
}
