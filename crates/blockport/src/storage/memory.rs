//! In-memory collaborators for testing and embedding.
//!
//! Each instance is isolated; clones share the same data, so a test can keep
//! a handle and inspect what the pipeline did through another one.

use crate::document::{AssetId, Locator};
use crate::errors::FetchError;
use crate::storage::{AssetLookup, AssetUploader, ContentStore};
use crate::sync::AssetFetcher;
use anyhow::{anyhow, bail, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// An asset held by [`InMemoryAssetStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub name: String,
    pub bytes: Vec<u8>,
    pub url: String,
}

#[derive(Debug, Default)]
struct AssetState {
    assets: BTreeMap<AssetId, StoredAsset>,
    next_id: AssetId,
}

/// In-memory asset store.
///
/// # Examples
///
/// ```
/// use blockport::storage::{AssetLookup, AssetUploader, InMemoryAssetStore};
///
/// let store = InMemoryAssetStore::new("https://dest.test/media");
/// let id = store.upload(b"png bytes", "hero.png").unwrap();
/// assert_eq!(
///     store.url_for_id(id).unwrap().as_deref(),
///     Some("https://dest.test/media/1-hero.png")
/// );
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryAssetStore {
    base_url: String,
    state: Arc<Mutex<AssetState>>,
    uploads: Arc<AtomicUsize>,
    lookups: Arc<AtomicUsize>,
    offline: Arc<AtomicBool>,
}

impl InMemoryAssetStore {
    /// Create an empty store whose asset URLs start with `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            state: Arc::new(Mutex::new(AssetState {
                assets: BTreeMap::new(),
                next_id: 1,
            })),
            uploads: Arc::new(AtomicUsize::new(0)),
            lookups: Arc::new(AtomicUsize::new(0)),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Seed an existing asset under a fixed ID and URL.
    pub fn with_asset(self, id: AssetId, url: impl Into<String>) -> Self {
        let url = url.into();
        {
            let mut state = lock(&self.state);
            let name = url.rsplit('/').next().unwrap_or("asset").to_string();
            state.assets.insert(
                id,
                StoredAsset {
                    name,
                    bytes: Vec::new(),
                    url,
                },
            );
            state.next_id = state.next_id.max(id + 1);
        }
        self
    }

    /// Simulate a transport failure on every following call.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Look at a stored asset.
    pub fn asset(&self, id: AssetId) -> Option<StoredAsset> {
        lock(&self.state).assets.get(&id).cloned()
    }

    /// Number of successful uploads.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Number of single-ID lookups served.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            bail!("asset store unreachable");
        }
        Ok(())
    }
}

impl AssetLookup for InMemoryAssetStore {
    fn url_for_id(&self, id: AssetId) -> Result<Option<String>> {
        self.ensure_online()?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.state).assets.get(&id).map(|a| a.url.clone()))
    }
}

impl AssetUploader for InMemoryAssetStore {
    fn upload(&self, bytes: &[u8], suggested_name: &str) -> Result<AssetId> {
        self.ensure_online()?;
        if bytes.is_empty() {
            bail!("refusing to store an empty file: {}", suggested_name);
        }

        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        let url = format!("{}/{}-{}", self.base_url, id, suggested_name);
        state.assets.insert(
            id,
            StoredAsset {
                name: suggested_name.to_string(),
                bytes: bytes.to_vec(),
                url,
            },
        );
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }
}

/// In-memory content store that counts writes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContentStore {
    documents: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryContentStore {
    /// Create an empty content store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `update` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ContentStore for InMemoryContentStore {
    fn load(&self, content_id: &str) -> Result<String> {
        lock(&self.documents)
            .get(content_id)
            .cloned()
            .ok_or_else(|| anyhow!("Content not found: {}", content_id))
    }

    fn update(&self, content_id: &str, content: &str) -> Result<()> {
        lock(&self.documents).insert(content_id.to_string(), content.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Canned HTTP responses keyed by URL.
///
/// Unknown URLs answer 404. Responses can be delayed to exercise the
/// concurrent fetch stage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFetcher {
    responses: Arc<Mutex<HashMap<String, Result<Vec<u8>, FetchError>>>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl InMemoryFetcher {
    /// Create a fetcher with no responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` for `url`.
    pub fn with_image(self, url: &str, bytes: &[u8]) -> Self {
        lock(&self.responses).insert(url.to_string(), Ok(bytes.to_vec()));
        self
    }

    /// Fail every fetch of `url` with `error`.
    pub fn with_failure(self, url: &str, error: FetchError) -> Self {
        lock(&self.responses).insert(url.to_string(), Err(error));
        self
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of fetches attempted.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl AssetFetcher for InMemoryFetcher {
    fn fetch(&self, locator: &Locator) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let response = lock(&self.responses)
            .get(locator.as_str())
            .cloned()
            .unwrap_or(Err(FetchError::Status(404)));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

// A poisoned lock only means another test thread panicked mid-update; the
// maps stay structurally valid, so keep going with the inner data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_upload_assigns_increasing_ids() {
        let store = InMemoryAssetStore::new("https://d.test/");
        let a = store.upload(b"a", "a.png").unwrap();
        let b = store.upload(b"b", "b.png").unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(store.upload_count(), 2);
        assert_eq!(store.asset(b).unwrap().url, "https://d.test/2-b.png");
    }

    #[test]
    fn test_seeded_assets_do_not_collide_with_uploads() {
        let store = InMemoryAssetStore::new("https://d.test").with_asset(40, "https://s.test/x.jpg");
        assert_eq!(store.upload(b"y", "y.jpg").unwrap(), 41);
    }

    #[test]
    fn test_lookup_unknown_is_none() {
        let store = InMemoryAssetStore::new("https://d.test").with_asset(3, "https://s.test/3.jpg");
        let urls = store.urls_for_ids(&BTreeSet::from([3, 4])).unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[&3], "https://s.test/3.jpg");
        assert_eq!(store.lookup_count(), 2);
    }

    #[test]
    fn test_offline_store_errors() {
        let store = InMemoryAssetStore::new("https://d.test");
        store.set_offline(true);
        assert!(store.url_for_id(1).is_err());
        assert!(store.upload(b"x", "x.png").is_err());
    }

    #[test]
    fn test_empty_upload_rejected() {
        let store = InMemoryAssetStore::new("https://d.test");
        assert!(store.upload(b"", "x.png").is_err());
        assert_eq!(store.upload_count(), 0);
    }

    #[test]
    fn test_content_store_clones_share_data() {
        let store = InMemoryContentStore::new();
        let handle = store.clone();
        store.update("post-1", "hello").unwrap();
        assert_eq!(handle.load("post-1").unwrap(), "hello");
        assert_eq!(handle.write_count(), 1);
        assert!(handle.load("post-2").is_err());
    }

    #[test]
    fn test_fetcher_unknown_url_is_404() {
        let fetcher = InMemoryFetcher::new().with_image("https://s.test/a.png", b"A");
        let ok = Locator::parse("https://s.test/a.png").unwrap();
        let missing = Locator::parse("https://s.test/b.png").unwrap();
        assert_eq!(fetcher.fetch(&ok).unwrap(), b"A");
        assert_eq!(fetcher.fetch(&missing), Err(FetchError::Status(404)));
        assert_eq!(fetcher.call_count(), 2);
    }
}
