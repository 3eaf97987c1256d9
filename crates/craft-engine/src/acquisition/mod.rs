//! Seed acquisition
//!
//! Turns up to four sources into described seed elements. Each image load
//! runs under a [`RetryPolicy`]: remote sources fall back to a
//! [`Placeholder`] once their attempts are exhausted, local files never do.
//! Descriptions are retried under the same bound with no fallback.
//!
//! Nothing is persisted here. The caller receives the whole batch only once
//! every slot has an image and labels, so a fatal failure in any slot leaves
//! the stores untouched.

mod placeholder;
mod retry;

pub use placeholder::{Placeholder, PLACEHOLDERS};
pub use retry::{RetryOutcome, RetryPolicy, RetryState};

use crate::collaborator::{ImageDescriber, Labels};
use crate::config::AcquisitionConfig;
use crate::error::{AcquisitionError, CraftError, GenerationError};
use crate::fetch::ImageFetcher;
use craft_element::{Element, ImageFormat, ImagePayload};
use craft_store::Credential;
use futures::future::try_join_all;
use rand::Rng;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Where a seed image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedSource {
    /// User-supplied local file
    File(PathBuf),
    /// Remote URL
    Remote(String),
}

impl SeedSource {
    /// Random remote source for `slot`; `{n}` in `template` becomes a
    /// number unique to the slot
    #[must_use]
    pub fn random_remote(slot: usize, template: &str) -> Self {
        let n = slot * 1000 + rand::rng().random_range(0..1000);
        Self::Remote(template.replace("{n}", &n.to_string()))
    }

    /// `count` random remote sources
    #[must_use]
    pub fn random_batch(count: usize, template: &str) -> Vec<Self> {
        (0..count).map(|slot| Self::random_remote(slot, template)).collect()
    }

    /// Whether exhausted attempts may be replaced by a placeholder
    #[must_use]
    pub fn allows_fallback(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl fmt::Display for SeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

/// Progress report for one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionProgress {
    /// 0-based slot
    pub slot: usize,
    pub total: usize,
    /// 1-based attempt
    pub attempt: u32,
}

impl fmt::Display for AcquisitionProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Analyzing element {} of {}", self.slot + 1, self.total)?;
        if self.attempt > 1 {
            write!(f, " (retry {})", self.attempt - 1)?;
        }
        f.write_str("...")
    }
}

/// Read a local image and identify its format
///
/// # Errors
/// Returns [`AcquisitionError::Io`] if the file cannot be read, or
/// [`AcquisitionError::UnsupportedFormat`] if it is not a known image type
pub async fn read_local(path: &Path) -> Result<ImagePayload, AcquisitionError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AcquisitionError::io(path, e))?;
    let format = ImageFormat::sniff(&bytes).ok_or_else(|| AcquisitionError::UnsupportedFormat {
        source_name: path.display().to_string(),
    })?;
    Ok(ImagePayload::new(bytes, format.media_type()))
}

/// Seed acquisition pipeline
#[derive(Debug, Clone)]
pub struct Acquirer {
    fetcher: Arc<dyn ImageFetcher>,
    describer: Arc<dyn ImageDescriber>,
    policy: RetryPolicy,
    max_seeds: usize,
    progress: Option<mpsc::UnboundedSender<AcquisitionProgress>>,
}

impl Acquirer {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        describer: Arc<dyn ImageDescriber>,
        config: &AcquisitionConfig,
    ) -> Self {
        Self {
            fetcher,
            describer,
            policy: RetryPolicy::from_config(config),
            max_seeds: config.max_seeds.max(1),
            progress: None,
        }
    }

    /// Report per-slot progress on `tx`
    #[must_use]
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<AcquisitionProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Acquire and describe one seed element per source
    ///
    /// Elements come back in source order and are not persisted.
    ///
    /// # Errors
    /// - [`AcquisitionError::NoSources`] for an empty batch
    /// - [`CraftError::Acquisition`] if a local source fails
    /// - [`CraftError::Generation`] if a description fails every attempt
    #[tracing::instrument(skip_all, fields(sources = sources.len()))]
    pub async fn acquire(
        &self,
        mut sources: Vec<SeedSource>,
        credential: &Credential,
    ) -> Result<Vec<Element>, CraftError> {
        if sources.is_empty() {
            return Err(AcquisitionError::NoSources.into());
        }
        if sources.len() > self.max_seeds {
            tracing::warn!(
                supplied = sources.len(),
                max = self.max_seeds,
                "dropping extra seed sources"
            );
            sources.truncate(self.max_seeds);
        }

        let total = sources.len();
        let slots = sources
            .iter()
            .enumerate()
            .map(|(slot, source)| self.acquire_slot(slot, total, source, credential));
        let acquired = match try_join_all(slots).await {
            Ok(acquired) => acquired,
            Err(err) => {
                tracing::error!(error = %err, "seed acquisition failed");
                return Err(err);
            }
        };

        let seeds: Vec<Element> = acquired
            .into_iter()
            .map(|(image, labels)| Element::seed(labels.title, labels.description, image))
            .collect();
        tracing::info!(count = seeds.len(), "seeds acquired");
        Ok(seeds)
    }

    async fn acquire_slot(
        &self,
        slot: usize,
        total: usize,
        source: &SeedSource,
        credential: &Credential,
    ) -> Result<(ImagePayload, Labels), CraftError> {
        let image = self.load_image(slot, total, source).await?;
        let labels = self.describe(&image, credential).await?;
        tracing::debug!(slot, title = %labels.title, "seed described");
        Ok((image, labels))
    }

    async fn load_image(
        &self,
        slot: usize,
        total: usize,
        source: &SeedSource,
    ) -> Result<ImagePayload, AcquisitionError> {
        let policy = self.policy.with_fallback(source.allows_fallback());
        let outcome = policy
            .run(
                |attempt| {
                    self.report(AcquisitionProgress {
                        slot,
                        total,
                        attempt,
                    });
                    async move {
                        match source {
                            SeedSource::File(path) => read_local(path).await,
                            SeedSource::Remote(url) => self.fetcher.fetch(url).await,
                        }
                    }
                },
                AcquisitionError::is_transient,
            )
            .await;

        match outcome {
            RetryOutcome::Success(image) => Ok(image),
            RetryOutcome::Fallback(err) => {
                let placeholder = Placeholder::for_slot(slot);
                tracing::warn!(
                    slot,
                    %source,
                    error = %err,
                    placeholder = placeholder.label,
                    "remote source exhausted, using placeholder"
                );
                Ok(placeholder.image())
            }
            RetryOutcome::Fatal(err) => Err(err),
        }
    }

    async fn describe(
        &self,
        image: &ImagePayload,
        credential: &Credential,
    ) -> Result<Labels, GenerationError> {
        match self
            .policy
            .with_fallback(false)
            .run(|_| self.describer.describe(credential, image), |_| true)
            .await
        {
            RetryOutcome::Success(labels) => Ok(labels),
            RetryOutcome::Fallback(err) | RetryOutcome::Fatal(err) => Err(err),
        }
    }

    fn report(&self, progress: AcquisitionProgress) {
        tracing::debug!(%progress);
        if let Some(tx) = &self.progress {
            // receiver may have gone away; progress is advisory
            let _ = tx.send(progress);
        }
    }
}
