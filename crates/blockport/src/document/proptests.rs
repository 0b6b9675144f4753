//! Property-based tests for the rewriting invariants
//!
//! Documents are generated as block markup with bare numeric references,
//! unrelated numbers, strings and field-mapping keys mixed together.

use super::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
enum FieldValue {
    /// Asset reference drawn from the ID pool (1..1000)
    Reference(AssetId),
    /// Number that is never a mapped ID (1000..100000)
    Other(u64),
    Text(String),
}

// Generator for a single field: name plus value
fn field_strategy() -> impl Strategy<Value = (String, FieldValue)> {
    let name = prop_oneof![
        3 => "[a-z]{1,8}".prop_map(|s| s.to_string()),
        1 => "_[a-z]{1,8}".prop_map(|s| s.to_string()),
    ];
    let value = prop_oneof![
        3 => (1u64..1000).prop_map(FieldValue::Reference),
        1 => (1000u64..100_000).prop_map(FieldValue::Other),
        1 => "[a-z ]{0,10}".prop_map(FieldValue::Text),
    ];
    (name, value)
}

fn render_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Reference(id) => id.to_string(),
        FieldValue::Other(n) => n.to_string(),
        FieldValue::Text(s) => format!("\"{}\"", s),
    }
}

// Generator for a block document; fields get unique names so the payload stays valid JSON
fn document_strategy() -> impl Strategy<Value = (String, Vec<(String, FieldValue)>)> {
    (
        prop::collection::vec(field_strategy(), 1..12),
        prop::collection::vec(1u64..1000, 0..4),
        prop_oneof![Just(""), Just(" "), Just("\n  ")],
    )
        .prop_map(|(fields, gallery, ws)| {
            let mut seen = BTreeSet::new();
            let fields: Vec<_> = fields
                .into_iter()
                .filter(|(name, _)| seen.insert(name.clone()))
                .collect();

            let mut parts: Vec<String> = fields
                .iter()
                .map(|(name, value)| format!("{ws}\"{}\":{ws}{}", name, render_value(value)))
                .collect();
            let gallery_items: Vec<String> = gallery.iter().map(|id| id.to_string()).collect();
            parts.push(format!("\"gallery\":[{}]", gallery_items.join(", ")));

            let mut all_fields = fields;
            all_fields.extend(
                gallery
                    .into_iter()
                    .map(|id| ("gallery".to_string(), FieldValue::Reference(id))),
            );

            let doc = format!(
                "<!-- wp:acf/block {{\"name\":\"acf/block\",\"data\":{{{}}},{ws}\"mode\":\"preview\"}} /-->\n<p>Caption 42</p>",
                parts.join(",")
            );
            (doc, all_fields)
        })
}

fn url_for(id: AssetId) -> Locator {
    let letters: String = id
        .to_string()
        .bytes()
        .map(|digit| (b'a' + (digit - b'0')) as char)
        .collect();
    Locator::parse(&format!("https://cdn.test/uploads/{}.png", letters)).unwrap()
}

fn full_mapping(ids: &BTreeSet<AssetId>) -> BTreeMap<AssetId, Locator> {
    ids.iter().map(|id| (*id, url_for(*id))).collect()
}

fn invert(map: &BTreeMap<AssetId, Locator>) -> BTreeMap<Locator, AssetId> {
    map.iter().map(|(id, url)| (url.clone(), *id)).collect()
}

proptest! {
    // Export followed by import restores the original text byte for byte
    #[test]
    fn prop_round_trip_is_lossless((doc, _fields) in document_strategy()) {
        let mapping = full_mapping(&scan_references(&doc));
        let exported = rewrite_ids_to_urls(&doc, &mapping);
        let imported = rewrite_urls_to_ids(&exported, &invert(&mapping));
        prop_assert_eq!(imported, doc);
    }

    // Every resolvable reference is gone after export
    #[test]
    fn prop_substitution_is_complete((doc, _fields) in document_strategy()) {
        let found = scan_references(&doc);
        let mapping = full_mapping(&found);
        let exported = rewrite_ids_to_urls(&doc, &mapping);

        let remaining = scan_references(&exported);
        prop_assert!(remaining.is_disjoint(&found), "left behind: {:?}", remaining);
    }

    // Applying IDs one at a time in any order equals the single-pass result
    #[test]
    fn prop_id_order_does_not_matter(
        (doc, _fields) in document_strategy(),
        seed in any::<u64>(),
    ) {
        let mapping = full_mapping(&scan_references(&doc));
        let combined = rewrite_ids_to_urls(&doc, &mapping);

        let mut order: Vec<_> = mapping.iter().collect();
        let len = order.len().max(1) as u64;
        order.rotate_left((seed % len) as usize);
        if seed % 2 == 0 {
            order.reverse();
        }

        let mut sequential = doc.clone();
        for (id, url) in order {
            let single = BTreeMap::from([(*id, url.clone())]);
            sequential = rewrite_ids_to_urls(&sequential, &single);
        }
        prop_assert_eq!(sequential, combined);
    }

    // Field-mapping values keep their original number
    #[test]
    fn prop_underscore_fields_untouched((doc, fields) in document_strategy()) {
        let every_id: BTreeSet<AssetId> = fields
            .iter()
            .filter_map(|(_, v)| match v {
                FieldValue::Reference(id) => Some(*id),
                _ => None,
            })
            .collect();
        let exported = rewrite_ids_to_urls(&doc, &full_mapping(&every_id));

        for (name, value) in &fields {
            if let (true, FieldValue::Reference(id)) = (name.starts_with('_'), value) {
                let needle = format!("\"{}\":", name);
                let at = exported.find(&needle).expect("field still present");
                let rest = exported[at + needle.len()..].trim_start();
                prop_assert!(rest.starts_with(&id.to_string()), "{} rewritten: {}", name, rest);
            }
        }
    }

    // Containers under field-mapping keys are skipped at any depth
    #[test]
    fn prop_nested_underscore_subtrees_untouched(
        listed in prop::collection::vec(1u64..1000, 1..5),
        inner in 1u64..1000,
        key in "_[a-z]{1,8}",
    ) {
        let items: Vec<String> = listed.iter().map(|id| id.to_string()).collect();
        let subtree = format!(
            "{{\"list\":[{}],\"inner\":{{\"image\":{}}},\"rows\":[{{\"id\":{}}}]}}",
            items.join(","),
            inner,
            inner
        );
        let doc = format!(
            "{{\"data\":{{\"{}\":{},\"image\":{}}},\"mode\":\"preview\"}}",
            key, subtree, inner
        );

        let mut ids: BTreeSet<AssetId> = listed.into_iter().collect();
        ids.insert(inner);
        let exported = rewrite_ids_to_urls(&doc, &full_mapping(&ids));

        let kept = format!("\"{}\":{}", key, subtree);
        prop_assert!(exported.contains(&kept), "rewritten under {}: {}", key, exported);
        let image = format!("\"image\":{}}}", url_for(inner).wrapped());
        prop_assert!(exported.contains(&image), "{}", exported);
    }

    // A short ID never matches inside a longer number
    #[test]
    fn prop_numeric_boundary(id in 1u64..1000, prefix in 1u64..100, suffix in 0u64..10) {
        let longer: u64 = format!("{}{}{}", prefix, id, suffix).parse().unwrap();
        let doc = format!("{{\"size\":{},\"image\":{},\"mode\":\"preview\"}}", longer, id);
        let exported = rewrite_ids_to_urls(&doc, &BTreeMap::from([(id, url_for(id))]));

        let expected = format!(
            "{{\"size\":{},\"image\":{},\"mode\":\"preview\"}}",
            longer,
            url_for(id).wrapped()
        );
        prop_assert_eq!(exported, expected);
    }
}
