//! Engine configuration
//!
//! Defaults mirror the shipped crafting experience: 120px tiles, up to four
//! seeds, three acquisition attempts one second apart.

use anyhow::Context as _;
use craft_store::FileElementStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How to choose among several instances overlapping a dropped one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Closest center wins; equal distances fall back to list order
    #[default]
    NearestCenter,
    /// First overlapping instance in list order wins
    FirstInOrder,
}

/// Canvas and tile geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: f64,
    pub height: f64,
    pub instance_width: f64,
    pub instance_height: f64,
    /// Pointer travel (px) below which a press-release counts as a click
    pub drag_threshold: f64,
    pub tie_break: TieBreak,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1024.0,
            height: 768.0,
            instance_width: 120.0,
            instance_height: 120.0,
            drag_threshold: 3.0,
            tie_break: TieBreak::default(),
        }
    }
}

/// Seed acquisition settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_seeds: usize,
    /// `{n}` is replaced with a random number per slot
    pub random_url_template: String,
}

impl AcquisitionConfig {
    #[inline]
    #[must_use]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
            max_seeds: 4,
            random_url_template: "https://picsum.photos/200/200?random={n}".to_string(),
        }
    }
}

/// Top-level crafting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CraftConfig {
    pub canvas: CanvasConfig,
    pub acquisition: AcquisitionConfig,
    /// Directory of the durable element store
    pub store_dir: PathBuf,
}

impl CraftConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing fields take defaults
    ///
    /// # Errors
    /// Returns error if the document is not valid TOML for this shape
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&source).with_context(|| format!("parsing config {}", path.display()))
    }

    /// With canvas size
    #[inline]
    #[must_use]
    pub fn with_canvas(mut self, width: f64, height: f64) -> Self {
        self.canvas.width = width;
        self.canvas.height = height;
        self
    }

    /// With tie-break rule
    #[inline]
    #[must_use]
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.canvas.tie_break = tie_break;
        self
    }

    /// With drag threshold
    #[inline]
    #[must_use]
    pub fn with_drag_threshold(mut self, px: f64) -> Self {
        self.canvas.drag_threshold = px;
        self
    }

    /// With acquisition retry settings
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.acquisition.max_attempts = max_attempts;
        self.acquisition.backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With store directory
    #[inline]
    #[must_use]
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = dir.into();
        self
    }

    /// Durable element store rooted at [`store_dir`](Self::store_dir)
    #[must_use]
    pub fn file_store(&self) -> FileElementStore {
        FileElementStore::new(&self.store_dir)
    }
}

impl Default for CraftConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig::default(),
            acquisition: AcquisitionConfig::default(),
            store_dir: PathBuf::from("nanocraft-db"),
        }
    }
}
