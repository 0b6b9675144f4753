//! Reference discovery
//!
//! Two scans over block content:
//!
//! - [`scan_references`] finds numeric asset reference candidates inside the
//!   JSON payloads of block envelopes (export side).
//! - [`scan_locators`] finds sentinel-wrapped image locators left behind by an
//!   export (import side).

use super::{AssetId, Locator};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Maximum nesting depth walked inside a decoded payload.
pub const MAX_SCAN_DEPTH: usize = 256;

fn envelope_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)"data"\s*:\s*(\{.*?\})\s*,\s*"mode""#)
            .expect("envelope pattern is a valid regex")
    })
}

fn sentinel_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"_image-url-start_(.*?)_image-url-end_")
            .expect("sentinel pattern is a valid regex")
    })
}

/// Collect every asset reference candidate in a document.
///
/// Each `"data": {...}, "mode"` envelope is decoded on its own; fragments that
/// fail to decode are skipped. Inside a payload every positive integer held
/// by a field whose name does not start with `_` is a candidate, at any
/// depth (arrays included).
///
/// # Example
///
/// ```
/// use blockport::document::scan_references;
///
/// let content = r#"<!-- wp:acf/hero {"name":"acf/hero","data":{"image":42,"_image":"field_1","gallery":[7,8]},"mode":"preview"} /-->"#;
/// let ids: Vec<u64> = scan_references(content).into_iter().collect();
/// assert_eq!(ids, vec![7, 8, 42]);
/// ```
pub fn scan_references(text: &str) -> BTreeSet<AssetId> {
    let mut ids = BTreeSet::new();

    for captures in envelope_pattern().captures_iter(text) {
        let Some(fragment) = captures.get(1) else {
            continue;
        };

        match serde_json::from_str::<Value>(fragment.as_str()) {
            Ok(payload) => collect_references(&payload, 0, &mut ids),
            Err(err) => {
                debug!(
                    offset = fragment.start(),
                    error = %err,
                    "skipping malformed block data fragment"
                );
            }
        }
    }

    ids
}

fn collect_references(value: &Value, depth: usize, ids: &mut BTreeSet<AssetId>) {
    if depth >= MAX_SCAN_DEPTH {
        warn!(depth, "block data nested too deeply; ignoring the rest of this branch");
        return;
    }

    match value {
        Value::Object(fields) => {
            for (name, field) in fields {
                // Field-mapping metadata, never an asset reference.
                if name.starts_with('_') {
                    continue;
                }
                visit(field, depth, ids);
            }
        }
        Value::Array(items) => {
            for item in items {
                visit(item, depth, ids);
            }
        }
        _ => {}
    }
}

fn visit(value: &Value, depth: usize, ids: &mut BTreeSet<AssetId>) {
    match value {
        Value::Number(_) => {
            if let Some(id) = value.as_u64().filter(|id| *id > 0) {
                ids.insert(id);
            }
        }
        Value::Object(_) | Value::Array(_) => collect_references(value, depth + 1, ids),
        _ => {}
    }
}

/// Collect every distinct sentinel-wrapped image locator in a document.
///
/// Wrapped values that are empty, are not `http(s)` URLs, or do not end in an
/// allow-listed image extension are ignored.
pub fn scan_locators(text: &str) -> BTreeSet<Locator> {
    let mut locators = BTreeSet::new();

    for captures in sentinel_pattern().captures_iter(text) {
        let raw = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        if raw.is_empty() {
            continue;
        }

        match Locator::parse(raw) {
            Ok(locator) if locator.is_image() => {
                locators.insert(locator);
            }
            Ok(locator) => debug!(%locator, "ignoring non-image locator"),
            Err(err) => debug!(raw, error = %err, "ignoring invalid locator"),
        }
    }

    locators
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(values: &[u64]) -> BTreeSet<AssetId> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_scan_single_envelope() {
        let content = r#"{"data": {"image": 12, "title": "Hero"}, "mode": "preview"}"#;
        assert_eq!(scan_references(content), ids(&[12]));
    }

    #[test]
    fn test_scan_skips_underscore_fields() {
        let content = r#"{"data":{"_fieldName":7,"value":9},"mode":"edit"}"#;
        assert_eq!(scan_references(content), ids(&[9]));
    }

    #[test]
    fn test_scan_skips_underscore_subtrees() {
        let content = r#"{"data":{"_meta":{"image":5,"list":[6]},"image":3},"mode":"edit"}"#;
        assert_eq!(scan_references(content), ids(&[3]));
    }

    #[test]
    fn test_scan_nested_objects_and_arrays() {
        let content = r#"<!-- wp:acf/gallery {"name":"acf/gallery","data":{"slides":[{"image":101,"caption":"a"},{"image":102,"link":{"target":0}}],"ids":[103,[104]]},"mode":"preview"} /-->"#;
        assert_eq!(scan_references(content), ids(&[101, 102, 103, 104]));
    }

    #[test]
    fn test_scan_ignores_non_positive_and_non_integer_values() {
        let content = r#"{"data":{"zero":0,"neg":-4,"float":2.5,"str":"77","flag":true,"nothing":null,"ok":8},"mode":"preview"}"#;
        assert_eq!(scan_references(content), ids(&[8]));
    }

    #[test]
    fn test_scan_multiple_envelopes_are_deduplicated() {
        let content = r#"
<!-- wp:acf/hero {"data":{"image":5},"mode":"preview"} /-->
<p>between</p>
<!-- wp:acf/card {"data":{"image":5,"icon":6},"mode":"edit"} /-->
"#;
        assert_eq!(scan_references(content), ids(&[5, 6]));
    }

    #[test]
    fn test_scan_malformed_fragment_does_not_stop_scan() {
        let content = r#"
<!-- wp:acf/broken {"data":{"image":5,},"mode":"preview"} /-->
<!-- wp:acf/ok {"data":{"image":6},"mode":"preview"} /-->
"#;
        assert_eq!(scan_references(content), ids(&[6]));
    }

    #[test]
    fn test_scan_envelope_spanning_lines() {
        let content = "{\"data\": {\n  \"image\": 31,\n  \"inner\": {\"icon\": 32}\n},\n \"mode\": \"preview\"}";
        assert_eq!(scan_references(content), ids(&[31, 32]));
    }

    #[test]
    fn test_scan_without_envelope_finds_nothing() {
        assert!(scan_references(r#"{"image": 5}"#).is_empty());
        assert!(scan_references("").is_empty());
    }

    #[test]
    fn test_depth_limit_stops_descent() {
        let mut value = json!({ "image": 999 });
        for _ in 0..MAX_SCAN_DEPTH + 10 {
            value = json!({ "child": value });
        }
        let mut found = BTreeSet::new();
        collect_references(&value, 0, &mut found);
        assert!(found.is_empty());

        let shallow = json!({ "a": { "b": { "image": 4 } } });
        let mut found = BTreeSet::new();
        collect_references(&shallow, 0, &mut found);
        assert_eq!(found, ids(&[4]));
    }

    #[test]
    fn test_scan_locators_filters_and_deduplicates() {
        let content = r#"{"data":{"a":"_image-url-start_https://src.test/a.jpg_image-url-end_","b":"_image-url-start_https://src.test/a.jpg_image-url-end_","c":"_image-url-start_https://src.test/doc.pdf_image-url-end_","d":"_image-url-start_not-a-url.png_image-url-end_","e":"_image-url-start__image-url-end_","f":"_image-url-start_https://src.test/b.WEBP_image-url-end_"},"mode":"preview"}"#;
        let found: Vec<String> = scan_locators(content)
            .into_iter()
            .map(|l| l.as_str().to_string())
            .collect();
        assert_eq!(
            found,
            vec![
                "https://src.test/a.jpg".to_string(),
                "https://src.test/b.WEBP".to_string()
            ]
        );
    }

    #[test]
    fn test_scan_locators_empty_content() {
        assert!(scan_locators(r#"{"data":{"image":7},"mode":"preview"}"#).is_empty());
    }
}
