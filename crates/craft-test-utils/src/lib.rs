//! Testing utilities for the craft workspace
//!
//! Fake collaborators, a failure-injecting store, element fixtures and a
//! ready-made session harness.

#![allow(missing_docs)]

use async_trait::async_trait;
use craft_element::{Element, ElementId, ImagePayload, MediaType, PairKey};
use craft_engine::{
    AcquisitionError, Collaborators, CraftConfig, CraftSession, FusionOutput, GenerationError,
    ImageDescriber, ImageFetcher, ImageFuser, Labels,
};
use craft_store::{
    Credential, ElementStore, MemoryElementStore, SessionStore, StoreError,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Install a `RUST_LOG`-filtered subscriber once per test binary
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// PNG-tagged bytes carrying `title`, readable back by [`FakeDescriber`]
pub fn fixture_image(title: &str) -> ImagePayload {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.extend_from_slice(title.as_bytes());
    ImagePayload::new(bytes, MediaType::png())
}

pub fn seed(title: &str) -> Element {
    Element::seed(title, format!("The element {title}."), fixture_image(title))
}

/// Fire, Water, Earth, Air
pub fn classic_seeds() -> [Element; 4] {
    ["Fire", "Water", "Earth", "Air"].map(seed)
}

pub fn credential() -> Credential {
    Credential::new("test-api-key")
}

/// Title a fixture or placeholder image was made for
pub fn title_of(image: &ImagePayload) -> String {
    let bytes = image.bytes();
    if let Some(rest) = bytes.strip_prefix(PNG_MAGIC) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    let text = String::from_utf8_lossy(bytes);
    text.rsplit_once("</text>")
        .and_then(|(head, _)| head.rsplit_once('>'))
        .map_or_else(|| "Unknown".to_string(), |(_, label)| label.to_string())
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Describer that reads the title back out of fixture images
#[derive(Debug, Default)]
pub struct FakeDescriber {
    pub calls: AtomicUsize,
    failures: AtomicUsize,
}

impl FakeDescriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `n` calls
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageDescriber for FakeDescriber {
    async fn describe(
        &self,
        credential: &Credential,
        image: &ImagePayload,
    ) -> Result<Labels, GenerationError> {
        assert!(!credential.is_blank());
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failures) {
            return Err(GenerationError::Describe("injected failure".to_string()));
        }
        let title = title_of(image);
        Ok(Labels::new(title.clone(), format!("The element {title}.")))
    }
}

/// Fuser that names results `"<first> + <second>"` and counts calls per pair
#[derive(Debug, Default)]
pub struct FakeFuser {
    pub calls: AtomicUsize,
    per_pair: DashMap<PairKey, usize>,
    failures: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    started: Notify,
}

impl FakeFuser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fuser whose calls block until [`Semaphore::add_permits`] on `gate`
    pub fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Self::default()
        })
    }

    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, a: &Element, b: &Element) -> usize {
        self.per_pair
            .get(&PairKey::new(a.id(), b.id()))
            .map_or(0, |n| *n)
    }

    /// Wait until a fusion call has started
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }
}

#[async_trait]
impl ImageFuser for FakeFuser {
    async fn fuse(
        &self,
        credential: &Credential,
        first: &Element,
        second: &Element,
        prompt: &str,
    ) -> Result<FusionOutput, GenerationError> {
        assert!(!credential.is_blank());
        assert!(prompt.contains(&first.title) && prompt.contains(&second.title));
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .per_pair
            .entry(PairKey::new(first.id(), second.id()))
            .or_insert(0) += 1;
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.map_err(|e| GenerationError::Fusion(e.to_string()))?;
        }
        if take_failure(&self.failures) {
            return Err(GenerationError::Fusion("injected failure".to_string()));
        }

        let title = format!("{} + {}", first.title, second.title);
        Ok(FusionOutput {
            image: fixture_image(&title),
            labels: Labels::new(title, "A fusion."),
        })
    }
}

/// Fetcher serving fixture images, with per-URL failure injection
#[derive(Debug, Default)]
pub struct FakeFetcher {
    titles: DashMap<String, String>,
    failures: DashMap<String, usize>,
    calls: DashMap<String, usize>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve a fixture image titled `title` at `url`
    pub fn serve(&self, url: &str, title: &str) {
        self.titles.insert(url.to_string(), title.to_string());
    }

    /// Fail the next `n` fetches of `url`
    pub fn fail_times(&self, url: &str, n: usize) {
        self.failures.insert(url.to_string(), n);
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.get(url).map_or(0, |n| *n)
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<ImagePayload, AcquisitionError> {
        *self.calls.entry(url.to_string()).or_insert(0) += 1;
        if let Some(mut remaining) = self.failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AcquisitionError::Http {
                    url: url.to_string(),
                    status: 503,
                });
            }
        }
        match self.titles.get(url) {
            Some(title) => Ok(fixture_image(&title)),
            None => Err(AcquisitionError::Http {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// In-memory store with switchable write failures
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryElementStore,
    fail_puts: AtomicBool,
    fail_clear: AtomicBool,
    puts: AtomicUsize,
    /// 1-based put that fails once; 0 for none
    fail_put_at: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Fail only the `n`th put counted from now
    pub fn fail_nth_put(&self, n: usize) {
        self.puts.store(0, Ordering::SeqCst);
        self.fail_put_at.store(n, Ordering::SeqCst);
    }

    pub fn fail_clear(&self, fail: bool) {
        self.fail_clear.store(fail, Ordering::SeqCst);
    }

    fn injected(op: &str) -> StoreError {
        StoreError::io(op, std::io::Error::other("injected store failure"))
    }
}

#[async_trait]
impl ElementStore for FlakyStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        self.inner.initialize().await
    }

    async fn put(&self, element: &Element) -> Result<(), StoreError> {
        let n = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_puts.load(Ordering::SeqCst) || self.fail_put_at.load(Ordering::SeqCst) == n {
            return Err(Self::injected("put"));
        }
        self.inner.put(element).await
    }

    async fn get_all(&self) -> Result<Vec<Element>, StoreError> {
        self.inner.get_all().await
    }

    async fn remove(&self, ids: &[ElementId]) -> Result<(), StoreError> {
        self.inner.remove(ids).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(Self::injected("clear"));
        }
        self.inner.clear().await
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Config with millisecond backoff for tests
pub fn test_config() -> CraftConfig {
    CraftConfig::new().with_retry(3, Duration::from_millis(5))
}

/// A session over fakes, with handles to every fake
#[derive(Debug)]
pub struct Harness {
    pub session: CraftSession,
    pub store: Arc<FlakyStore>,
    pub state: Arc<SessionStore>,
    pub describer: Arc<FakeDescriber>,
    pub fuser: Arc<FakeFuser>,
    pub fetcher: Arc<FakeFetcher>,
}

impl Harness {
    /// Fresh store and session state, credential already set
    pub async fn new() -> Self {
        Self::with_fuser(FakeFuser::new()).await
    }

    pub async fn with_fuser(fuser: Arc<FakeFuser>) -> Self {
        let harness = Self::open(
            FlakyStore::new(),
            Arc::new(SessionStore::new()),
            fuser,
        )
        .await;
        harness.session.set_credential(credential()).unwrap();
        harness
    }

    /// Open a session over existing stores
    pub async fn open(
        store: Arc<FlakyStore>,
        state: Arc<SessionStore>,
        fuser: Arc<FakeFuser>,
    ) -> Self {
        init_tracing();
        let describer = FakeDescriber::new();
        let fetcher = FakeFetcher::new();
        let session = CraftSession::open(
            test_config(),
            store.clone(),
            state.clone(),
            Collaborators {
                describer: describer.clone(),
                fuser: fuser.clone(),
                fetcher: fetcher.clone(),
            },
        )
        .await
        .unwrap();
        Self {
            session,
            store,
            state,
            describer,
            fuser,
            fetcher,
        }
    }

    /// Acquire Fire, Water, Earth and Air from fake remote URLs
    pub async fn classic_seeds(&self) -> Vec<Arc<Element>> {
        let sources = ["Fire", "Water", "Earth", "Air"]
            .into_iter()
            .map(|title| {
                let url = format!("https://seeds.test/{title}");
                self.fetcher.serve(&url, title);
                craft_engine::SeedSource::Remote(url)
            })
            .collect();
        self.session.acquire_seeds(sources).await.unwrap()
    }

    /// Seed element with `title`
    pub fn element(&self, title: &str) -> Arc<Element> {
        self.session
            .discoveries()
            .into_iter()
            .find(|e| e.title == title)
            .unwrap_or_else(|| panic!("no element titled {title}"))
    }
}
