//! Block content migration library
//!
//! Moves page-builder block content between environments whose asset IDs
//! differ. Export replaces local numeric asset references with sentinel-wrapped
//! image URLs; import downloads those URLs into the destination asset store and
//! writes the new local IDs back, without re-serializing the surrounding
//! markup or JSON.
//!
//! Hosts plug in through the traits in [`storage`]; the CLI and the server
//! are thin layers over [`resolver::export_content`] and
//! [`sync::AssetSyncPipeline`].

pub mod cli;
pub mod config;
pub mod document;
pub mod errors;
pub mod output;
pub mod resolver;
pub mod storage;
pub mod sync;

// Re-export commonly used types
pub use document::{
    rewrite_ids_to_urls, rewrite_urls_to_ids, scan_locators, scan_references, AssetId, Locator,
};
pub use output::{ExitCode, JsonError, JsonOutput};
pub use resolver::{export_content, ExportReport, LocatorResolver};
pub use storage::{AssetLookup, AssetStore, AssetUploader, ContentStore};
pub use sync::{AssetSyncPipeline, ContentSaveHook, ResolutionCache, SaveKind, SyncReport};
