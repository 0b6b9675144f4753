//! Environment-independent asset locators
//!
//! A locator is the URL that stands in for a local asset ID while content is
//! in transit. Inside content it is wrapped in sentinel markers so the import
//! side can find it without decoding anything.

use crate::errors::LocatorError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::Path;
use url::Url;

/// Marker emitted before a locator inside exported content.
pub const SENTINEL_START: &str = "_image-url-start_";

/// Marker emitted after a locator inside exported content.
pub const SENTINEL_END: &str = "_image-url-end_";

/// File extensions accepted as image locators (compared lowercase).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "tiff"];

/// URL identifying an asset independently of any environment.
///
/// The string is kept exactly as it appears in content; it is never
/// normalized, because the import rewrite must match it byte for byte.
///
/// # Example
///
/// ```
/// use blockport::document::Locator;
///
/// let locator = Locator::parse("https://cdn.example.com/uploads/hero.JPG").unwrap();
/// assert!(locator.is_image());
/// assert_eq!(
///     locator.wrapped(),
///     "\"_image-url-start_https://cdn.example.com/uploads/hero.JPG_image-url-end_\""
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Parse and validate a locator.
    ///
    /// The URL must parse, use `http` or `https`, and be safe to embed in a
    /// JSON string without escaping.
    pub fn parse(raw: &str) -> Result<Self, LocatorError> {
        if raw.chars().any(|c| c == '"' || c == '\\' || c.is_control()) {
            return Err(LocatorError::UnsafeCharacter);
        }

        let url = Url::parse(raw).map_err(|e| LocatorError::Invalid(format!("{}: {}", raw, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(Self(raw.to_string())),
            other => Err(LocatorError::UnsupportedScheme(other.to_string())),
        }
    }

    /// The locator text as it appears in content.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the URL path ends in an allow-listed image extension.
    pub fn is_image(&self) -> bool {
        let Ok(url) = Url::parse(&self.0) else {
            return false;
        };

        Path::new(url.path())
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }

    /// The locator between its sentinels, without quotes.
    pub fn marked(&self) -> String {
        format!("{}{}{}", SENTINEL_START, self.0, SENTINEL_END)
    }

    /// The locator wrapped in sentinels and quotes, as emitted on export.
    pub fn wrapped(&self) -> String {
        format!("\"{}\"", self.marked())
    }

    /// File name to hand to the destination store on upload.
    ///
    /// Last path segment of the URL (query and fragment dropped), or
    /// `asset` when the path has no usable segment.
    pub fn suggested_file_name(&self) -> String {
        Url::parse(&self.0)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "asset".to_string())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Locator {
    fn borrow(&self) -> &str {
        &self.0
    }
}
