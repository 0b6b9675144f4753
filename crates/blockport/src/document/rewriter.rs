//! Token rewriting in both directions
//!
//! Export swaps numeric asset references for sentinel-wrapped locators,
//! import swaps them back. Both directions are single-pass textual
//! substitutions over the original text: inserted text is never rescanned,
//! so the result does not depend on the order of the mapping.

use super::{AssetId, Locator};
use regex::Regex;
use std::collections::BTreeMap;

/// Replace numeric asset references with quoted, sentinel-wrapped locators.
///
/// An occurrence of a mapped ID is rewritten when it is either the quoted
/// string `"N"` or the bare number `N`, and it sits in JSON value position:
/// preceded by `:`, `[` or `,` and followed by `,`, `]` or `}` (whitespace
/// allowed in between). Values of fields whose name starts with `_` are left
/// alone. Everything else is copied through untouched.
///
/// # Example
///
/// ```
/// use blockport::document::{rewrite_ids_to_urls, Locator};
/// use std::collections::BTreeMap;
///
/// let mut map = BTreeMap::new();
/// map.insert(7, Locator::parse("https://x/a.jpg").unwrap());
///
/// let out = rewrite_ids_to_urls(r#"{"size":147,"image":7,"mode":"preview"}"#, &map);
/// assert_eq!(
///     out,
///     r#"{"size":147,"image":"_image-url-start_https://x/a.jpg_image-url-end_","mode":"preview"}"#
/// );
/// ```
pub fn rewrite_ids_to_urls(text: &str, id_to_locator: &BTreeMap<AssetId, Locator>) -> String {
    if id_to_locator.is_empty() {
        return text.to_string();
    }

    let pattern = id_pattern(id_to_locator.keys().copied());
    let mut rewritten = String::with_capacity(text.len());
    let mut copied_to = 0;

    for token in pattern.find_iter(text) {
        let Some(locator) = token
            .as_str()
            .trim_matches('"')
            .parse::<AssetId>()
            .ok()
            .and_then(|id| id_to_locator.get(&id))
        else {
            continue;
        };

        if !is_value_position(text, token.start(), token.end())
            || inside_field_mapping(text, token.start())
        {
            continue;
        }

        rewritten.push_str(&text[copied_to..token.start()]);
        rewritten.push_str(&locator.wrapped());
        copied_to = token.end();
    }

    rewritten.push_str(&text[copied_to..]);
    rewritten
}

/// Replace quoted, sentinel-wrapped locators with bare numeric IDs.
///
/// Only the exact quoted token `"_image-url-start_<url>_image-url-end_"` is
/// replaced; the quotes are consumed because the field originally held a
/// bare number. Wrapped locators missing from the mapping, or appearing
/// without their quotes, stay as they are so a later pass can pick them up.
///
/// Locators cannot contain `"`, so no wrapped token is a substring of
/// another and the replacements commute.
pub fn rewrite_urls_to_ids(text: &str, locator_to_id: &BTreeMap<Locator, AssetId>) -> String {
    let mut rewritten = text.to_string();
    for (locator, id) in locator_to_id {
        let token = locator.wrapped();
        if rewritten.contains(&token) {
            rewritten = rewritten.replace(&token, &id.to_string());
        }
    }
    rewritten
}

/// Alternation of every ID, quoted or on word boundaries.
///
/// Longer literals come first; word boundaries already prevent `7` from
/// matching inside `147`, the ordering only keeps the alternation tidy.
fn id_pattern(ids: impl Iterator<Item = AssetId>) -> Regex {
    let mut literals: Vec<String> = ids.map(|id| id.to_string()).collect();
    literals.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = literals.join("|");

    Regex::new(&format!(r#""(?:{alt})"|\b(?:{alt})\b"#, alt = alternation))
        .expect("digit alternation is a valid regex")
}

/// Whether `text[start..end]` sits where a JSON value would.
fn is_value_position(text: &str, start: usize, end: usize) -> bool {
    let after = text[end..].trim_start();
    if !after.starts_with([',', ']', '}']) {
        return false;
    }

    let before = text[..start].trim_end();
    match before.chars().next_back() {
        Some(':') => field_name_before_colon(&before[..before.len() - 1])
            .map_or(true, |name| !name.starts_with('_')),
        Some('[') | Some(',') => true,
        _ => false,
    }
}

/// Whether a container enclosing `pos` is the value of a `_`-prefixed field.
///
/// Walks left from `pos` across balanced containers and string literals,
/// checking the key in front of every enclosing `{` or `[`, and stops at the
/// outermost container of the JSON value.
fn inside_field_mapping(text: &str, pos: usize) -> bool {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = pos;

    while i > 0 {
        i -= 1;
        match bytes[i] {
            b'"' => match string_start(bytes, i) {
                Some(open) => i = open,
                None => return false,
            },
            b'}' | b']' => depth += 1,
            b'{' | b'[' if depth > 0 => depth -= 1,
            b'{' | b'[' => {
                let before = text[..i].trim_end();
                match before.as_bytes().last() {
                    Some(b':') => {
                        let under_mapping = field_name_before_colon(&before[..before.len() - 1])
                            .is_some_and(|name| name.starts_with('_'));
                        if under_mapping {
                            return true;
                        }
                    }
                    Some(b'[') | Some(b',') => {}
                    _ => return false,
                }
            }
            _ => {}
        }
    }

    false
}

/// Offset of the unescaped quote opening the string that closes at `close`.
fn string_start(bytes: &[u8], close: usize) -> Option<usize> {
    let mut j = close;
    while j > 0 {
        j -= 1;
        if bytes[j] != b'"' {
            continue;
        }
        let backslashes = bytes[..j].iter().rev().take_while(|&&b| b == b'\\').count();
        if backslashes % 2 == 0 {
            return Some(j);
        }
    }
    None
}

/// Name of the JSON field whose key ends just before a colon, if any.
fn field_name_before_colon(text: &str) -> Option<&str> {
    let key = text.trim_end().strip_suffix('"')?;
    let open = key.rfind('"')?;
    Some(&key[open + 1..])
}
