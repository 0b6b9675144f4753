//! Block content handling
//!
//! Block content is HTML-like markup with JSON payloads embedded in a
//! `"data": {...}, "mode"` envelope. Everything here treats the document as
//! text: sub-spans are decoded for inspection, but edits are always textual
//! substitutions so bytes outside the rewritten tokens are preserved exactly.

mod locator;
mod rewriter;
mod scanner;

pub use locator::{Locator, IMAGE_EXTENSIONS, SENTINEL_END, SENTINEL_START};
pub use rewriter::{rewrite_ids_to_urls, rewrite_urls_to_ids};
pub use scanner::{scan_locators, scan_references, MAX_SCAN_DEPTH};

/// Locally-scoped numeric asset identifier.
///
/// Only meaningful inside the environment that issued it.
pub type AssetId = u64;

#[cfg(test)]
mod proptests;
