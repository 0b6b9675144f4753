//! Export side: local asset IDs to environment-independent locators.

use crate::document::{rewrite_ids_to_urls, scan_references, AssetId, Locator};
use crate::storage::AssetLookup;
use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Maps reference candidates to locators through an [`AssetLookup`].
///
/// IDs the store does not know, and URLs that cannot be carried inside a
/// JSON string, are left out of the mapping. Store failures propagate.
pub struct LocatorResolver<L: AssetLookup> {
    lookup: L,
}

impl<L: AssetLookup> LocatorResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    pub fn resolve(&self, ids: &BTreeSet<AssetId>) -> Result<BTreeMap<AssetId, Locator>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let urls = self.lookup.urls_for_ids(ids)?;
        let mut mapping = BTreeMap::new();
        for (id, url) in urls {
            match Locator::parse(&url) {
                Ok(locator) => {
                    mapping.insert(id, locator);
                }
                Err(err) => debug!(id, %url, error = %err, "unusable asset URL"),
            }
        }

        let missing = ids.len() - mapping.len();
        if missing > 0 {
            debug!(missing, "IDs without a usable URL");
        }
        Ok(mapping)
    }
}

/// Outcome of exporting one document.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    /// Rewritten document text
    #[serde(skip)]
    pub content: String,
    /// Every reference candidate found
    pub found: BTreeSet<AssetId>,
    pub resolved: BTreeMap<AssetId, Locator>,
    /// Candidates left untouched
    pub unresolved: BTreeSet<AssetId>,
}

/// Scan, resolve and rewrite one document for export.
///
/// # Example
///
/// ```
/// use blockport::resolver::{export_content, LocatorResolver};
/// use blockport::storage::InMemoryAssetStore;
///
/// let store = InMemoryAssetStore::new("https://src.test")
///     .with_asset(7, "https://src.test/media/hero.jpg");
/// let report = export_content(
///     r#"{"data": {"image": 7}, "mode": "edit"}"#,
///     &LocatorResolver::new(store),
/// )
/// .unwrap();
///
/// assert_eq!(
///     report.content,
///     r#"{"data": {"image": "_image-url-start_https://src.test/media/hero.jpg_image-url-end_"}, "mode": "edit"}"#
/// );
/// ```
pub fn export_content<L: AssetLookup>(
    text: &str,
    resolver: &LocatorResolver<L>,
) -> Result<ExportReport> {
    let found = scan_references(text);
    let resolved = resolver.resolve(&found)?;
    let unresolved: BTreeSet<AssetId> = found
        .iter()
        .copied()
        .filter(|id| !resolved.contains_key(id))
        .collect();

    let content = rewrite_ids_to_urls(text, &resolved);
    info!(
        found = found.len(),
        resolved = resolved.len(),
        unresolved = unresolved.len(),
        "export finished"
    );

    Ok(ExportReport {
        content,
        found,
        resolved,
        unresolved,
    })
}
