//! Content-save trigger for the import pipeline.

use super::{AssetSyncPipeline, ContentWriter, SyncReport, WriteBack};
use crate::storage::ContentStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// What caused a save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveKind {
    /// Explicit save from an editor.
    #[default]
    Editor,
    /// Programmatic save through the API.
    Api,
    /// Periodic draft save.
    Autosave,
    /// Revision snapshot.
    Revision,
}

impl SaveKind {
    /// Autosaves and revisions never import.
    pub fn triggers_sync(self) -> bool {
        matches!(self, SaveKind::Editor | SaveKind::Api)
    }
}

/// Who issued a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// An editor or API client.
    Caller,
    /// The pipeline writing back an import.
    WriteBack,
}

/// Runs the pipeline after every qualifying save of a document.
///
/// The hook is also the pipeline's [`ContentWriter`]. A write-back goes
/// through the normal save path, but the event it raises carries its origin,
/// so the hook skips exactly that event and nothing else. Stores and
/// write-backs are serialized, and a write-back is dropped when another save
/// replaced the document while it was being imported.
pub struct ContentSaveHook<C: ContentStore> {
    store: C,
    pipeline: Arc<AssetSyncPipeline>,
    writes: Mutex<()>,
    suppressed_triggers: AtomicUsize,
}

impl<C: ContentStore> ContentSaveHook<C> {
    pub fn new(store: C, pipeline: Arc<AssetSyncPipeline>) -> Self {
        Self {
            store,
            pipeline,
            writes: Mutex::new(()),
            suppressed_triggers: AtomicUsize::new(0),
        }
    }

    /// Persist `content`, then fire [`after_save`](Self::after_save).
    pub fn save(&self, content_id: &str, content: &str, kind: SaveKind) -> Result<Option<SyncReport>> {
        {
            let _write = self.write_lock();
            self.store.update(content_id, content)?;
        }
        self.dispatch(content_id, content, kind, Origin::Caller)
    }

    /// Handle a save event. Returns `None` when the event was ignored.
    pub fn after_save(
        &self,
        content_id: &str,
        content: &str,
        kind: SaveKind,
    ) -> Result<Option<SyncReport>> {
        self.dispatch(content_id, content, kind, Origin::Caller)
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    /// Save events ignored because the pipeline itself issued them.
    pub fn suppressed_triggers(&self) -> usize {
        self.suppressed_triggers.load(Ordering::SeqCst)
    }

    fn dispatch(
        &self,
        content_id: &str,
        content: &str,
        kind: SaveKind,
        origin: Origin,
    ) -> Result<Option<SyncReport>> {
        if !kind.triggers_sync() {
            debug!(content_id, ?kind, "save kind does not import");
            return Ok(None);
        }

        if origin == Origin::WriteBack {
            self.suppressed_triggers.fetch_add(1, Ordering::SeqCst);
            debug!(content_id, "ignoring save issued by the pipeline");
            return Ok(None);
        }

        self.pipeline.process(content_id, content, self).map(Some)
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<C: ContentStore> ContentWriter for ContentSaveHook<C> {
    fn write_back(&self, content_id: &str, original: &str, rewritten: &str) -> Result<WriteBack> {
        {
            let _write = self.write_lock();
            // A missing document cannot have been replaced.
            if let Ok(current) = self.store.load(content_id) {
                if current != original {
                    debug!(content_id, "document replaced during import; dropping write-back");
                    return Ok(WriteBack::Superseded);
                }
            }
            self.store.update(content_id, rewritten)?;
        }

        self.dispatch(content_id, rewritten, SaveKind::Api, Origin::WriteBack)?;
        Ok(WriteBack::Written)
    }
}
