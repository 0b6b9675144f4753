//! Time-bounded locator to local asset ID memo.

use crate::document::{AssetId, Locator};
use moka::sync::Cache;
use sha2::{Digest, Sha256};
use std::time::Duration;

const CACHE_KEY_PREFIX: &str = "blockport_url_to_id_";

/// Resolution cache shared by pipeline invocations.
///
/// Within the TTL a locator that was uploaded once resolves to the same local
/// ID without any network work. After expiry a fresh download may happen even
/// if the asset already exists locally. Concurrent misses on the same locator
/// are not serialized: both invocations upload, which is tolerated.
///
/// Clones share the same entries.
#[derive(Debug, Clone)]
pub struct ResolutionCache {
    inner: Cache<String, AssetId>,
    ttl: Duration,
}

impl ResolutionCache {
    /// Default time-to-live of an entry.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

    /// Default maximum number of entries.
    pub const DEFAULT_CAPACITY: u64 = 10_000;

    /// Create a cache with the given TTL and capacity.
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
            ttl,
        }
    }

    /// Stable key for a locator: prefix plus SHA-256 hex digest.
    pub fn cache_key(locator: &Locator) -> String {
        let mut hasher = Sha256::new();
        hasher.update(locator.as_str().as_bytes());
        format!("{}{:x}", CACHE_KEY_PREFIX, hasher.finalize())
    }

    /// Local ID previously recorded for `locator`, if still fresh.
    pub fn get(&self, locator: &Locator) -> Option<AssetId> {
        self.inner.get(&Self::cache_key(locator))
    }

    /// Record a successful upload.
    pub fn insert(&self, locator: &Locator, id: AssetId) {
        self.inner.insert(Self::cache_key(locator), id);
    }

    /// Forget everything.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL, Self::DEFAULT_CAPACITY)
    }
}
