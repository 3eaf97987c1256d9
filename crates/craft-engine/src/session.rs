//! Crafting session orchestrator
//!
//! [`CraftSession`] wires the durable store, session state, registry,
//! workspace, combination engine and acquisition pipeline together. It is
//! constructed explicitly with its collaborators; nothing is global.
//!
//! Workspace and cache are mirrored into [`SessionStore`] after every
//! mutating gesture (place, drop, merge, clear), not on every pointer move.

use crate::acquisition::{Acquirer, SeedSource};
use crate::cache::CombinationCache;
use crate::collaborator::{ImageDescriber, ImageFuser};
use crate::combine::CombinationEngine;
use crate::config::CraftConfig;
use crate::error::CraftError;
use crate::fetch::ImageFetcher;
use crate::geometry::Point;
use crate::registry::Registry;
use crate::workspace::{DragOutcome, Instance, Workspace};
use craft_element::{Element, ElementId, InstanceId};
use craft_store::{Credential, ElementStore, SessionChange, SessionKey, SessionStore};
use std::sync::Arc;
use tokio::sync::broadcast;

/// External services a session calls out to
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub describer: Arc<dyn ImageDescriber>,
    pub fuser: Arc<dyn ImageFuser>,
    pub fetcher: Arc<dyn ImageFetcher>,
}

/// Which step the user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No credential held
    NeedsCredential,
    /// Credential held, no seeds acquired this session
    AwaitingSeeds,
    /// Crafting was started but the durable store is empty
    NeedsReset,
    Crafting,
}

/// Result of merging two instances
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    /// Sources replaced by `instance`
    Merged {
        element: Arc<Element>,
        instance: Instance,
        /// First time this element was produced
        discovered: bool,
    },
    /// A source instance disappeared while the combination ran; the
    /// discovery is kept but the workspace was not changed
    Stale { element: Arc<Element> },
}

impl MergeOutcome {
    #[must_use]
    pub fn element(&self) -> &Arc<Element> {
        match self {
            Self::Merged { element, .. } | Self::Stale { element } => element,
        }
    }
}

/// Result of releasing a dragged instance
#[derive(Debug, Clone)]
pub enum DropResult {
    /// The instance was not being dragged
    Ignored,
    /// Click without movement: show this element's details
    Selected(Arc<Element>),
    Moved,
    Merged(MergeOutcome),
}

/// One user's crafting session
#[derive(Debug)]
pub struct CraftSession {
    config: CraftConfig,
    store: Arc<dyn ElementStore>,
    session: Arc<SessionStore>,
    registry: Arc<Registry>,
    workspace: Workspace,
    engine: CombinationEngine,
    acquirer: Acquirer,
}

impl CraftSession {
    /// Open a session over `store` and `session`
    ///
    /// Initializes the store, hydrates the registry and restores workspace
    /// and cache from session state. An empty store after crafting started
    /// is not repaired: [`phase`](Self::phase) reports
    /// [`Phase::NeedsReset`].
    ///
    /// # Errors
    /// Returns [`CraftError::Store`] if the durable store cannot be read
    #[tracing::instrument(skip_all)]
    pub async fn open(
        config: CraftConfig,
        store: Arc<dyn ElementStore>,
        session: Arc<SessionStore>,
        collaborators: Collaborators,
    ) -> Result<Self, CraftError> {
        store.initialize().await?;
        let registry = Arc::new(Registry::new());
        registry.hydrate(store.get_all().await?);

        let cache = CombinationCache::new();
        let engine = CombinationEngine::new(
            store.clone(),
            registry.clone(),
            cache,
            session.clone(),
            collaborators.fuser,
        );
        let acquirer = Acquirer::new(
            collaborators.fetcher,
            collaborators.describer,
            &config.acquisition,
        );

        let this = Self {
            workspace: Workspace::new(config.canvas),
            config,
            store,
            session,
            registry,
            engine,
            acquirer,
        };
        this.restore_workspace();
        this.restore_cache().await;

        if let Err(err) = this.ensure_elements() {
            tracing::error!(error = %err, "crafting started but no elements were found");
        }
        tracing::info!(
            elements = this.registry.len(),
            instances = this.workspace.len(),
            phase = ?this.phase(),
            "session opened"
        );
        Ok(this)
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        if self.session.credential().is_none() {
            Phase::NeedsCredential
        } else if !self.session.crafting_started() {
            Phase::AwaitingSeeds
        } else if self.registry.is_empty() {
            Phase::NeedsReset
        } else {
            Phase::Crafting
        }
    }

    #[must_use]
    pub fn config(&self) -> &CraftConfig {
        &self.config
    }

    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    #[must_use]
    pub fn cache(&self) -> &CombinationCache {
        self.engine.cache()
    }

    /// Set a new credential; crafting restarts from seed acquisition
    ///
    /// # Errors
    /// Returns [`CraftError::MissingCredential`] for a blank credential
    pub fn set_credential(&self, credential: Credential) -> Result<(), CraftError> {
        self.store_credential(&credential)?;
        self.session.remove(SessionKey::CraftingStarted);
        Ok(())
    }

    /// Replace the credential, keeping crafting progress
    ///
    /// # Errors
    /// Returns [`CraftError::MissingCredential`] for a blank credential
    pub fn update_credential(&self, credential: Credential) -> Result<(), CraftError> {
        self.store_credential(&credential)
    }

    /// Drop the credential and return to the credential step
    pub fn forget_credential(&self) {
        self.session.remove(SessionKey::Credential);
        self.session.remove(SessionKey::CraftingStarted);
    }

    fn store_credential(&self, credential: &Credential) -> Result<(), CraftError> {
        if credential.is_blank() {
            return Err(CraftError::MissingCredential);
        }
        self.session.set(SessionKey::Credential, credential)?;
        Ok(())
    }

    fn credential(&self) -> Result<Credential, CraftError> {
        self.session.credential().ok_or(CraftError::MissingCredential)
    }

    /// `NoElements` when crafting started but nothing was discovered
    ///
    /// # Errors
    /// Returns [`CraftError::NoElements`] in that state
    pub fn ensure_elements(&self) -> Result<(), CraftError> {
        if self.session.crafting_started() && self.registry.is_empty() {
            Err(CraftError::NoElements)
        } else {
            Ok(())
        }
    }

    /// Acquire, describe and persist a batch of seed elements
    ///
    /// Nothing is persisted unless every source succeeds (remote sources
    /// may succeed with a placeholder).
    ///
    /// # Errors
    /// - [`CraftError::MissingCredential`] without a credential
    /// - [`CraftError::Acquisition`] / [`CraftError::Generation`] from the
    ///   pipeline
    /// - [`CraftError::Store`] if a seed cannot be persisted; seeds already
    ///   written for this batch are removed again
    pub async fn acquire_seeds(
        &self,
        sources: Vec<SeedSource>,
    ) -> Result<Vec<Arc<Element>>, CraftError> {
        let credential = self.credential()?;
        let seeds = self.acquirer.acquire(sources, &credential).await?;

        let _commit = self.engine.commit_guard().await;
        self.persist_batch(&seeds).await?;
        let registered: Vec<_> = seeds.into_iter().map(|seed| self.registry.insert(seed)).collect();
        self.session.set(SessionKey::CraftingStarted, &true)?;
        tracing::info!(count = registered.len(), "seed elements persisted");
        Ok(registered)
    }

    /// Put every seed or none of them
    async fn persist_batch(&self, seeds: &[Element]) -> Result<(), CraftError> {
        let mut written = Vec::with_capacity(seeds.len());
        for seed in seeds {
            if let Err(err) = self.store.put(seed).await {
                tracing::error!(error = %err, written = written.len(), "seed batch failed; rolling back");
                if let Err(rollback) = self.store.remove(&written).await {
                    tracing::error!(error = %rollback, "failed to roll back partial seed batch");
                }
                return Err(err.into());
            }
            written.push(seed.id());
        }
        Ok(())
    }

    /// Acquire one random remote seed per slot
    ///
    /// # Errors
    /// See [`acquire_seeds`](Self::acquire_seeds)
    pub async fn acquire_random_seeds(&self) -> Result<Vec<Arc<Element>>, CraftError> {
        let acquisition = &self.config.acquisition;
        let sources = SeedSource::random_batch(acquisition.max_seeds, &acquisition.random_url_template);
        self.acquire_seeds(sources).await
    }

    /// Drop an instance of `element_id` centred on `at`
    ///
    /// # Errors
    /// Returns [`CraftError::InconsistentState`] for an unknown element
    pub fn place(&self, element_id: ElementId, at: Point) -> Result<InstanceId, CraftError> {
        self.registry.require(element_id)?;
        let id = self.workspace.place(element_id, at);
        self.save_workspace();
        Ok(id)
    }

    /// # Errors
    /// Returns [`CraftError::InstanceNotFound`] for an unknown instance
    pub fn begin_drag(&self, instance_id: InstanceId, pointer: Point) -> Result<(), CraftError> {
        self.workspace.begin_drag(instance_id, pointer)
    }

    pub fn update_drag(&self, instance_id: InstanceId, pointer: Point) -> Option<Point> {
        self.workspace.update_drag(instance_id, pointer)
    }

    /// Release a dragged instance, merging it if it landed on another
    ///
    /// # Errors
    /// Propagates merge failures; the workspace is left as it was at drop
    pub async fn end_drag(&self, instance_id: InstanceId) -> Result<DropResult, CraftError> {
        let Some(outcome) = self.workspace.end_drag(instance_id) else {
            return Ok(DropResult::Ignored);
        };

        match outcome {
            DragOutcome::Select(element_id) => {
                Ok(DropResult::Selected(self.registry.require(element_id)?))
            }
            DragOutcome::Moved => {
                self.save_workspace();
                Ok(DropResult::Moved)
            }
            DragOutcome::Merge { moved, partner } => {
                self.save_workspace();
                Ok(DropResult::Merged(self.merge_instances(moved, partner).await?))
            }
        }
    }

    /// Combine the elements behind two instances and swap the instances for
    /// one result instance at their midpoint
    ///
    /// # Errors
    /// - [`CraftError::SelfMerge`] if `a` and `b` are the same instance
    /// - [`CraftError::InstanceNotFound`] if either instance is missing
    /// - [`CraftError::MissingCredential`] without a credential
    /// - any [`CombinationEngine::combine`] error, with the workspace
    ///   unchanged
    #[tracing::instrument(skip(self))]
    pub async fn merge_instances(
        &self,
        a: InstanceId,
        b: InstanceId,
    ) -> Result<MergeOutcome, CraftError> {
        if a == b {
            return Err(CraftError::SelfMerge(a));
        }
        let first = self
            .workspace
            .get(a)
            .ok_or(CraftError::InstanceNotFound(a))?;
        let second = self
            .workspace
            .get(b)
            .ok_or(CraftError::InstanceNotFound(b))?;
        let credential = self.credential()?;

        let combination = match self
            .engine
            .combine(first.element_id, second.element_id, &credential)
            .await
        {
            Ok(combination) => combination,
            Err(err) => {
                tracing::error!(error = %err, "merge failed");
                return Err(err);
            }
        };

        let element = combination.element;
        match self.workspace.replace_pair(a, b, element.id()) {
            Some(instance) => {
                self.save_workspace();
                Ok(MergeOutcome::Merged {
                    element,
                    instance,
                    discovered: combination.discovered,
                })
            }
            None => {
                tracing::warn!(result = %element.id(), "merge sources vanished during combination");
                Ok(MergeOutcome::Stale { element })
            }
        }
    }

    /// Remove every instance from the workspace
    pub fn clear_workspace(&self) {
        self.workspace.clear();
        self.save_workspace();
    }

    /// Wipe discoveries, cache, workspace and progress; keeps the credential
    ///
    /// # Errors
    /// Returns [`CraftError::Store`] if the durable store cannot be cleared;
    /// in-memory state is left intact in that case
    #[tracing::instrument(skip(self))]
    pub async fn reset(&self) -> Result<(), CraftError> {
        self.engine.reset().await?;
        self.workspace.clear();
        self.session.clear_progress();
        tracing::info!("progress reset");
        Ok(())
    }

    /// Every discovered element, in discovery order
    #[must_use]
    pub fn discoveries(&self) -> Vec<Arc<Element>> {
        self.registry.list()
    }

    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<Arc<Element>> {
        self.registry.get(id)
    }

    #[must_use]
    pub fn instances(&self) -> Vec<Instance> {
        self.workspace.instances()
    }

    /// Receive every change made to session state
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.session.subscribe()
    }

    /// Re-read state another observer changed
    ///
    /// # Errors
    /// Returns [`CraftError::Store`] if discoveries must be reloaded and the
    /// durable store cannot be read
    pub async fn resync(&self, change: SessionChange) -> Result<(), CraftError> {
        tracing::debug!(?change, "resyncing from session change");
        match change.key {
            SessionKey::WorkspaceInstances => {
                self.absorb_new_elements().await?;
                self.restore_workspace();
            }
            SessionKey::CombinationCache => {
                if change.removed {
                    self.engine.cache().invalidate_all();
                }
                self.absorb_new_elements().await?;
                self.restore_cache().await;
            }
            // set after seeding, removed by a reset: either way the store
            // is the authority
            SessionKey::CraftingStarted => {
                self.registry.hydrate(self.store.get_all().await?);
            }
            SessionKey::Credential => {}
        }
        Ok(())
    }

    /// Register elements another observer discovered
    async fn absorb_new_elements(&self) -> Result<(), CraftError> {
        for element in self.store.get_all().await? {
            if !self.registry.contains(element.id()) {
                self.registry.insert(element);
            }
        }
        Ok(())
    }

    fn save_workspace(&self) {
        if let Err(err) = self.workspace.save(&self.session) {
            tracing::warn!(error = %err, "failed to mirror workspace into session");
        }
    }

    /// Load instances from session state, dropping any whose element is
    /// not registered
    fn restore_workspace(&self) {
        if let Err(err) = self.workspace.load(&self.session) {
            tracing::warn!(error = %err, "discarding unreadable workspace state");
            self.workspace.clear();
            return;
        }
        let orphans: Vec<InstanceId> = self
            .workspace
            .instances()
            .into_iter()
            .filter(|i| !self.registry.contains(i.element_id))
            .map(|i| i.instance_id)
            .collect();
        if !orphans.is_empty() {
            tracing::warn!(count = orphans.len(), "dropping instances of unknown elements");
            self.workspace.remove(&orphans);
        }
    }

    async fn restore_cache(&self) {
        match self.engine.cache().load(&self.session).await {
            Ok(loaded) => tracing::debug!(loaded, "combination cache restored"),
            Err(err) => tracing::warn!(error = %err, "discarding unreadable combination cache"),
        }
    }
}
