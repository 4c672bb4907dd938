//! Property-based tests for the match/sort oracle.
//!
//! These tests check that descriptor identity ignores key order, that the
//! comparator yields a strict order over distinct sort keys, and that range
//! operators agree with plain integer comparison.

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use vela_core::Document;
use vela_query::{MangoQuery, QueryDescriptor, Selector, SortComparator, SortPart};

/// Strategy for a flat selector of equality conditions.
fn selector_strategy() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::vec(("[a-e]{1,3}", -50i64..50), 0..6)
}

fn to_selector(entries: &[(String, i64)]) -> Value {
    let mut map = Map::new();
    for (k, v) in entries {
        map.insert(k.clone(), json!(*v));
    }
    Value::Object(map)
}

/// Strategy for documents with unique ages.
fn docs_strategy(max: usize) -> impl Strategy<Value = Vec<Document>> {
    prop::collection::hash_set(-1000i64..1000, 0..max).prop_map(|ages| {
        ages.into_iter()
            .enumerate()
            .map(|(i, age)| Document::new("id", json!({"id": format!("d{}", i), "age": age})).unwrap())
            .collect()
    })
}

proptest! {
    /// Property: descriptors built from the same entries in any order are identical.
    #[test]
    fn descriptor_ignores_key_order(entries in selector_strategy()) {
        let forward = to_selector(&entries);
        let mut reversed_entries = entries.clone();
        reversed_entries.reverse();
        let reversed = to_selector(&reversed_entries);

        let a = QueryDescriptor::find(MangoQuery::new().selector(forward)).unwrap();
        let b = QueryDescriptor::find(MangoQuery::new().selector(reversed)).unwrap();
        prop_assert_eq!(a.canonical(), b.canonical());
        prop_assert_eq!(a.fingerprint(), b.fingerprint());
    }

    /// Property: sorting distinct keys never fails and yields a strictly ascending list.
    #[test]
    fn comparator_sorts_distinct_keys(mut docs in docs_strategy(40)) {
        let cmp = SortComparator::new(vec![SortPart::asc("age")]);
        cmp.sort(&mut docs).unwrap();
        prop_assert!(cmp.verify_sorted(&docs).is_ok());
        for pair in docs.windows(2) {
            prop_assert_eq!(cmp.compare(&pair[1], &pair[0]).unwrap(), Ordering::Greater);
        }
    }

    /// Property: the binary-searched insertion point keeps the list sorted.
    #[test]
    fn insertion_point_preserves_order(mut docs in docs_strategy(30), extra in 1000i64..2000) {
        let cmp = SortComparator::new(vec![SortPart::desc("age")]);
        cmp.sort(&mut docs).unwrap();
        let new_doc = Document::new("id", json!({"id": "new", "age": extra - 1500})).unwrap();
        if docs.iter().all(|d| d.get_path("age") != new_doc.get_path("age")) {
            let at = cmp.insertion_point(&docs, &new_doc).unwrap();
            docs.insert(at, new_doc);
            prop_assert!(cmp.verify_sorted(&docs).is_ok());
        }
    }

    /// Property: `$gt`/`$lte` partition integer values exactly like `>`/`<=`.
    #[test]
    fn range_operators_agree_with_integers(value in -100i64..100, bound in -100i64..100) {
        let gt = Selector::compile(&json!({"n": {"$gt": bound}})).unwrap();
        let lte = Selector::compile(&json!({"n": {"$lte": bound}})).unwrap();
        let doc = json!({"n": value});
        prop_assert_eq!(gt.matches_value(&doc), value > bound);
        prop_assert_eq!(lte.matches_value(&doc), value <= bound);
    }
}
