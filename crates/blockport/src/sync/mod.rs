//! Import side: turn sentinel-wrapped locators back into local asset IDs.
//!
//! One [`AssetSyncPipeline::process`] call walks a document through
//! `Scanning → Fetching → Rewriting → Persisting` and returns to `Idle`, or
//! stops early in `Skipped` when there is nothing to do. Per-locator failures
//! never abort the document: the locator keeps its sentinel wrapper and the
//! next save retries it.

mod cache;
mod fetch;
mod hook;

pub use cache::ResolutionCache;
pub use fetch::{AssetFetcher, HttpFetcher};
pub use hook::{ContentSaveHook, SaveKind};

use crate::config::SyncConfig;
use crate::document::{rewrite_urls_to_ids, scan_locators, AssetId, Locator};
use crate::errors::SyncError;
use crate::storage::{AssetUploader, ContentStore};
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, info, info_span, trace, warn};

/// Where a document is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Scanning,
    Fetching,
    Rewriting,
    Persisting,
    /// No sentinel locators in the document.
    Skipped,
    /// At least one locator could not be resolved.
    FailedPartial,
}

/// How a `process` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Nothing to import; no network, no write.
    Skipped,
    /// Locators were found but the text did not change.
    Unchanged,
    /// Every locator resolved and the document was written back.
    Persisted,
    /// Some locators failed; the rest were written back if any resolved.
    FailedPartial { persisted: bool },
    /// A newer save replaced the document while it was being imported;
    /// nothing was written and the newer save runs its own import.
    Superseded,
}

/// A locator that could not be turned into a local ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatorFailure {
    pub locator: Locator,
    pub error: SyncError,
}

/// Result of one pipeline run over one document.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub content_id: String,
    pub outcome: SyncOutcome,
    pub resolved: BTreeMap<Locator, AssetId>,
    pub failed: Vec<LocatorFailure>,
    /// Locators answered from the resolution cache
    pub cache_hits: usize,
    /// Locators downloaded and uploaded during this run
    pub uploads: usize,
    /// Rewritten text, present when it was persisted
    #[serde(skip)]
    pub content: Option<String>,
}

impl SyncReport {
    fn skipped(content_id: &str) -> Self {
        Self {
            content_id: content_id.to_string(),
            outcome: SyncOutcome::Skipped,
            resolved: BTreeMap::new(),
            failed: Vec::new(),
            cache_hits: 0,
            uploads: 0,
            content: None,
        }
    }

    /// State the pipeline settled in.
    pub fn final_state(&self) -> SyncState {
        match self.outcome {
            SyncOutcome::Skipped => SyncState::Skipped,
            SyncOutcome::FailedPartial { .. } => SyncState::FailedPartial,
            SyncOutcome::Unchanged | SyncOutcome::Persisted | SyncOutcome::Superseded => {
                SyncState::Idle
            }
        }
    }

    /// True when the document was written back.
    pub fn persisted(&self) -> bool {
        matches!(
            self.outcome,
            SyncOutcome::Persisted | SyncOutcome::FailedPartial { persisted: true }
        )
    }
}

/// What happened to a write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBack {
    Written,
    /// The stored document no longer matched the imported text.
    Superseded,
}

/// Persists the rewritten document.
///
/// Save hooks implement this so the write does not re-trigger them and does
/// not clobber a save that landed during the import; any [`ContentStore`]
/// can be used directly when no hook is involved.
pub trait ContentWriter {
    /// Replace `original` with `rewritten` under `content_id`.
    fn write_back(&self, content_id: &str, original: &str, rewritten: &str) -> Result<WriteBack>;
}

impl<C: ContentStore> ContentWriter for C {
    fn write_back(&self, content_id: &str, _original: &str, rewritten: &str) -> Result<WriteBack> {
        self.update(content_id, rewritten)?;
        Ok(WriteBack::Written)
    }
}

enum Resolution {
    Cached(AssetId),
    Uploaded(AssetId),
    Failed(SyncError),
}

/// Downloads, uploads and rewrites sentinel-wrapped locators.
///
/// Holds no per-document state; one instance serves every document and
/// shares its [`ResolutionCache`] across calls.
pub struct AssetSyncPipeline {
    fetcher: Arc<dyn AssetFetcher>,
    uploader: Arc<dyn AssetUploader>,
    cache: ResolutionCache,
    max_concurrent_fetches: usize,
}

impl AssetSyncPipeline {
    pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

    pub fn new(
        fetcher: Arc<dyn AssetFetcher>,
        uploader: Arc<dyn AssetUploader>,
        cache: ResolutionCache,
    ) -> Self {
        Self {
            fetcher,
            uploader,
            cache,
            max_concurrent_fetches: Self::DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }

    /// Pipeline with an HTTP fetcher and cache built from `[sync]` settings.
    pub fn from_config(config: &SyncConfig, uploader: Arc<dyn AssetUploader>) -> Self {
        let fetcher = HttpFetcher::new(config.fetch_timeout(), config.max_download_bytes());
        let cache = ResolutionCache::new(config.cache_ttl(), config.cache_capacity());
        Self::new(Arc::new(fetcher), uploader, cache)
            .with_max_concurrent_fetches(config.max_concurrent_fetches())
    }

    /// Bound the number of parallel downloads (at least one).
    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max.max(1);
        self
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Import one document.
    ///
    /// # Errors
    ///
    /// Only a failed write-back is an error. Download and upload failures are
    /// reported per locator in [`SyncReport::failed`].
    pub fn process(
        &self,
        content_id: &str,
        content: &str,
        writer: &dyn ContentWriter,
    ) -> Result<SyncReport> {
        let span = info_span!("sync", content_id);
        let _enter = span.enter();

        let mut state = SyncState::Idle;
        transition(&mut state, SyncState::Scanning);

        let locators: Vec<Locator> = scan_locators(content).into_iter().collect();
        if locators.is_empty() {
            transition(&mut state, SyncState::Skipped);
            return Ok(SyncReport::skipped(content_id));
        }

        transition(&mut state, SyncState::Fetching);
        let results = self.resolve_all(&locators);

        let mut report = SyncReport::skipped(content_id);
        for (locator, result) in locators.into_iter().zip(results) {
            match result {
                Some(Resolution::Cached(id)) => {
                    report.cache_hits += 1;
                    report.resolved.insert(locator, id);
                }
                Some(Resolution::Uploaded(id)) => {
                    report.uploads += 1;
                    report.resolved.insert(locator, id);
                }
                Some(Resolution::Failed(error)) => {
                    report.failed.push(LocatorFailure { locator, error });
                }
                None => report.failed.push(LocatorFailure {
                    locator,
                    error: SyncError::Interrupted,
                }),
            }
        }

        transition(&mut state, SyncState::Rewriting);
        let rewritten = rewrite_urls_to_ids(content, &report.resolved);

        // Sentinels outside a quoted token are never rewritten.
        let unreplaced: Vec<Locator> = report
            .resolved
            .keys()
            .filter(|locator| rewritten.contains(&locator.marked()))
            .cloned()
            .collect();
        for locator in unreplaced {
            report.resolved.remove(&locator);
            debug!(%locator, "locator left in place outside a quoted token");
            report.failed.push(LocatorFailure {
                locator,
                error: SyncError::NotQuoted,
            });
        }

        let mut superseded = false;
        let persisted = if rewritten != content {
            transition(&mut state, SyncState::Persisting);
            match writer.write_back(content_id, content, &rewritten)? {
                WriteBack::Written => {
                    report.content = Some(rewritten);
                    true
                }
                WriteBack::Superseded => {
                    superseded = true;
                    false
                }
            }
        } else {
            false
        };

        report.outcome = if superseded {
            transition(&mut state, SyncState::Idle);
            info!("document changed during import; leaving it to the newer save");
            SyncOutcome::Superseded
        } else if !report.failed.is_empty() {
            transition(&mut state, SyncState::FailedPartial);
            warn!(
                resolved = report.resolved.len(),
                failed = report.failed.len(),
                "some locators could not be imported"
            );
            SyncOutcome::FailedPartial { persisted }
        } else {
            transition(&mut state, SyncState::Idle);
            if persisted {
                SyncOutcome::Persisted
            } else {
                SyncOutcome::Unchanged
            }
        };

        info!(
            resolved = report.resolved.len(),
            cache_hits = report.cache_hits,
            uploads = report.uploads,
            cached = self.cache.entry_count(),
            "import finished"
        );
        Ok(report)
    }

    /// Resolve every locator with a bounded worker pool.
    ///
    /// All workers are joined before returning. A slot left empty means the
    /// worker handling it panicked.
    fn resolve_all(&self, locators: &[Locator]) -> Vec<Option<Resolution>> {
        let workers = self.max_concurrent_fetches.min(locators.len()).max(1);
        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<Resolution>>> =
            locators.iter().map(|_| Mutex::new(None)).collect();

        let (next_ref, slots_ref) = (&next, &slots);
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                handles.push(scope.spawn(move || loop {
                    let index = next_ref.fetch_add(1, Ordering::SeqCst);
                    let Some(locator) = locators.get(index) else {
                        break;
                    };
                    let resolution = self.resolve_one(locator);
                    *slots_ref[index]
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(resolution);
                }));
            }

            for handle in handles {
                if handle.join().is_err() {
                    warn!("fetch worker panicked");
                }
            }
        });

        slots
            .into_iter()
            .map(|slot| slot.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()))
            .collect()
    }

    fn resolve_one(&self, locator: &Locator) -> Resolution {
        if let Some(id) = self.cache.get(locator) {
            trace!(%locator, id, "cache hit");
            return Resolution::Cached(id);
        }

        let bytes = match self.fetcher.fetch(locator) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%locator, error = %err, "download failed");
                return Resolution::Failed(err.into());
            }
        };

        match self.uploader.upload(&bytes, &locator.suggested_file_name()) {
            Ok(id) => {
                self.cache.insert(locator, id);
                debug!(%locator, id, size = bytes.len(), "uploaded");
                Resolution::Uploaded(id)
            }
            Err(err) => {
                warn!(%locator, error = %err, "upload failed");
                Resolution::Failed(SyncError::Upload(format!("{:#}", err)))
            }
        }
    }
}

fn transition(state: &mut SyncState, next: SyncState) {
    trace!(from = ?*state, to = ?next, "state");
    *state = next;
}
