//! Collaborator abstractions for asset and content storage.
//!
//! The core never talks to a concrete host. It consumes these traits:
//!
//! - [`AssetLookup`]: "given an ID, give me a URL" (export side)
//! - [`AssetUploader`]: "store these bytes, give me an ID" (import side)
//! - [`ContentStore`]: load and update content documents
//!
//! Backends: in-memory (tests, embedding), a directory-backed media library
//! with JSON index, and a client for a remote control endpoint.

use crate::document::AssetId;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub mod json;
pub mod memory;
pub mod remote;

// Re-export for convenience
pub use json::{JsonContentStore, MediaLibrary};
pub use memory::{InMemoryAssetStore, InMemoryContentStore, InMemoryFetcher};
pub use remote::ControlClient;

/// Resolves local asset IDs to environment-independent URLs.
///
/// "Not found" is `Ok(None)`, a normal outcome for deleted or inaccessible
/// assets. `Err` is reserved for transport and authorization failures.
pub trait AssetLookup: Send + Sync {
    /// Look up the public URL of one asset.
    fn url_for_id(&self, id: AssetId) -> Result<Option<String>>;

    /// Look up several assets at once.
    ///
    /// Unknown IDs are absent from the result. The default asks one ID at a
    /// time; backends with a batch primitive override it.
    fn urls_for_ids(&self, ids: &BTreeSet<AssetId>) -> Result<BTreeMap<AssetId, String>> {
        let mut urls = BTreeMap::new();
        for &id in ids {
            if let Some(url) = self.url_for_id(id)? {
                urls.insert(id, url);
            }
        }
        Ok(urls)
    }
}

/// Creates local assets from downloaded bytes.
pub trait AssetUploader: Send + Sync {
    /// Store `bytes` as a new asset and return its local ID.
    fn upload(&self, bytes: &[u8], suggested_name: &str) -> Result<AssetId>;
}

/// Both halves of an asset store.
pub trait AssetStore: AssetLookup + AssetUploader {}

impl<T: AssetLookup + AssetUploader + ?Sized> AssetStore for T {}

/// Persists content documents by stable identifier.
pub trait ContentStore: Send + Sync {
    /// Load the current text of a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not exist or cannot be read.
    fn load(&self, content_id: &str) -> Result<String>;

    /// Replace the text of a document (create if absent).
    fn update(&self, content_id: &str, content: &str) -> Result<()>;
}

impl<T: AssetLookup + ?Sized> AssetLookup for Arc<T> {
    fn url_for_id(&self, id: AssetId) -> Result<Option<String>> {
        (**self).url_for_id(id)
    }

    fn urls_for_ids(&self, ids: &BTreeSet<AssetId>) -> Result<BTreeMap<AssetId, String>> {
        (**self).urls_for_ids(ids)
    }
}

impl<T: AssetUploader + ?Sized> AssetUploader for Arc<T> {
    fn upload(&self, bytes: &[u8], suggested_name: &str) -> Result<AssetId> {
        (**self).upload(bytes, suggested_name)
    }
}

impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    fn load(&self, content_id: &str) -> Result<String> {
        (**self).load(content_id)
    }

    fn update(&self, content_id: &str, content: &str) -> Result<()> {
        (**self).update(content_id, content)
    }
}

impl<T: AssetLookup + ?Sized> AssetLookup for &T {
    fn url_for_id(&self, id: AssetId) -> Result<Option<String>> {
        (**self).url_for_id(id)
    }

    fn urls_for_ids(&self, ids: &BTreeSet<AssetId>) -> Result<BTreeMap<AssetId, String>> {
        (**self).urls_for_ids(ids)
    }
}
