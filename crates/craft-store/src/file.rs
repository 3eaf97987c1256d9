//! Directory-backed element store
//!
//! One JSON record per element at `<dir>/<id>.json`. Writes go to a sibling
//! temp file that is then renamed over the record, so a crash mid-write
//! leaves either the old record or the new one, never a torn file.

use crate::element_store::{ElementStore, StoredRecord};
use crate::error::StoreError;
use async_trait::async_trait;
use craft_element::{Element, ElementId};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;

const RECORD_EXT: &str = "json";
const TEMP_EXT: &str = "json.tmp";

/// Element store persisting records as files in one directory
#[derive(Debug)]
pub struct FileElementStore {
    dir: PathBuf,
    initialized: AtomicBool,
}

impl FileElementStore {
    /// Store rooted at `dir`; nothing touches the disk until `initialize`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            initialized: AtomicBool::new(false),
        }
    }

    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_initialized(&self) -> Result<(), StoreError> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Uninitialized)
        }
    }

    fn record_path(&self, id: ElementId) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXT}"))
    }

    async fn entries(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut dir = fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;
        let mut paths = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            paths.push(entry.path());
        }
        Ok(paths)
    }

    async fn read_record(path: &Path) -> Result<Element, StoreError> {
        let bytes = fs::read(path).await.map_err(|e| StoreError::io(path, e))?;
        let record: StoredRecord =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupted {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if !record.verify() {
            return Err(StoreError::Corrupted {
                path: path.to_path_buf(),
                reason: "image checksum mismatch".to_string(),
            });
        }
        Ok(record.into_element())
    }
}

fn is_record(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == RECORD_EXT)
}

fn is_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(TEMP_EXT))
}

#[async_trait]
impl ElementStore for FileElementStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;
        self.initialized.store(true, Ordering::Release);
        tracing::debug!(dir = %self.dir.display(), "element store initialized");
        Ok(())
    }

    async fn put(&self, element: &Element) -> Result<(), StoreError> {
        self.ensure_initialized()?;

        let path = self.record_path(element.id());
        let temp = path.with_extension(TEMP_EXT);
        let json = serde_json::to_vec(&StoredRecord::new(element.clone()))?;

        fs::write(&temp, &json)
            .await
            .map_err(|e| StoreError::io(&temp, e))?;
        fs::rename(&temp, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        tracing::trace!(id = %element.id(), bytes = json.len(), "element record written");
        Ok(())
    }

    /// Records that fail to parse or verify are skipped and logged, not repaired.
    async fn get_all(&self) -> Result<Vec<Element>, StoreError> {
        self.ensure_initialized()?;

        let mut elements = Vec::new();
        for path in self.entries().await? {
            if !is_record(&path) || is_temp(&path) {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(element) => elements.push(element),
                Err(err @ StoreError::Corrupted { .. }) => {
                    tracing::warn!(error = %err, "skipping unreadable element record");
                }
                Err(err) => return Err(err),
            }
        }

        elements.sort_by(|a, b| {
            a.discovered_at()
                .cmp(&b.discovered_at())
                .then_with(|| a.id().cmp(&b.id()))
        });
        Ok(elements)
    }

    async fn remove(&self, ids: &[ElementId]) -> Result<(), StoreError> {
        self.ensure_initialized()?;

        for id in ids {
            let path = self.record_path(*id);
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }
        tracing::debug!(count = ids.len(), "element records removed");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.ensure_initialized()?;

        let mut removed = 0usize;
        for path in self.entries().await? {
            if is_record(&path) || is_temp(&path) {
                fs::remove_file(&path)
                    .await
                    .map_err(|e| StoreError::io(&path, e))?;
                removed += 1;
            }
        }
        tracing::info!(removed, dir = %self.dir.display(), "element store cleared");
        Ok(())
    }
}
