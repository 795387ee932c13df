use super::*;
use crate::state::test_helpers::{shape_element, stroke_element};

const CAP: usize = 1000;
const TTL: i64 = 600_000;

#[test]
fn upsert_then_get_returns_same_identity() {
    let mut store = ShapeStore::new();
    let input = stroke_element("s1");
    store.upsert_at(input.clone(), 1_000);

    let got = store.get("s1").unwrap();
    assert_eq!(got.id, input.id);
    assert_eq!(got.body, input.body);
    assert_eq!(got.timestamp, 1_000);
}

#[test]
fn upsert_replaces_same_id() {
    let mut store = ShapeStore::new();
    store.upsert_at(stroke_element("x"), 1);
    store.upsert_at(shape_element("x"), 2);
    assert_eq!(store.len(), 1);
    assert_eq!(store.get("x").unwrap().kind(), "predefinedShape");
}

#[test]
fn timestamp_never_moves_backwards_for_an_id() {
    let mut store = ShapeStore::new();
    store.upsert_at(stroke_element("s1"), 5_000);
    let stored = store.upsert_at(stroke_element("s1"), 4_000);
    assert_eq!(stored.timestamp, 5_000);
    let stored = store.upsert_at(stroke_element("s1"), 6_000);
    assert_eq!(stored.timestamp, 6_000);
}

#[test]
fn missing_ids_are_noops() {
    let mut store = ShapeStore::new();
    assert!(store.get("nope").is_none());
    assert!(store.delete("nope").is_none());
    assert!(store.is_empty());
}

#[test]
fn delete_returns_removed_element() {
    let mut store = ShapeStore::new();
    store.upsert_at(stroke_element("s1"), 1);
    let removed = store.delete("s1").unwrap();
    assert_eq!(removed.id, "s1");
    assert!(!store.contains("s1"));
}

#[test]
fn all_and_clear_are_in_write_order() {
    let mut store = ShapeStore::new();
    store.upsert_at(stroke_element("b"), 10);
    store.upsert_at(stroke_element("a"), 10);
    store.upsert_at(stroke_element("c"), 5);

    let ids: Vec<String> = store.all().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["c", "b", "a"]);

    let cleared: Vec<String> = store.clear().into_iter().map(|e| e.id).collect();
    assert_eq!(cleared, vec!["c", "b", "a"]);
    assert!(store.is_empty());
}

#[test]
fn restore_restamps_elements() {
    let mut store = ShapeStore::new();
    store.upsert_at(stroke_element("a"), 10);
    store.upsert_at(stroke_element("b"), 20);
    let snapshot = store.clear();

    let restored = store.restore_at(snapshot, 900_000);
    assert_eq!(restored.len(), 2);
    assert!(restored.iter().all(|e| e.timestamp == 900_000));
    assert!(store.contains("a") && store.contains("b"));
}

#[test]
fn sweep_evicts_single_oldest_over_cap() {
    let mut store = ShapeStore::new();
    for i in 0..=CAP {
        let ts = i64::try_from(i).unwrap() + 1_000_000;
        store.upsert_at(stroke_element(&format!("s{i}")), ts);
    }
    assert_eq!(store.len(), CAP + 1);

    let evicted = store.sweep_at(1_000_000 + 2_000, CAP, TTL);
    assert_eq!(evicted, vec!["s0".to_string()]);
    assert_eq!(store.len(), CAP);
    assert!(!store.contains("s0"));
    assert!(store.contains("s1"));
}

#[test]
fn sweep_cap_breaks_timestamp_ties_by_write_order() {
    let mut store = ShapeStore::new();
    for i in 0..5 {
        store.upsert_at(stroke_element(&format!("s{i}")), 42);
    }
    let evicted = store.sweep_at(42, 3, TTL);
    assert_eq!(evicted, vec!["s0".to_string(), "s1".to_string()]);
}

#[test]
fn sweep_expires_by_ttl() {
    let mut store = ShapeStore::new();
    store.upsert_at(stroke_element("old"), 0);
    store.upsert_at(stroke_element("edge"), 400_000);
    store.upsert_at(stroke_element("fresh"), 900_000);

    let evicted = store.sweep_at(1_000_000, CAP, TTL);
    assert_eq!(evicted, vec!["old".to_string()]);
    assert!(store.contains("edge"), "age equal to TTL is kept");
    assert!(store.contains("fresh"));
}

#[test]
fn sweep_under_cap_and_fresh_is_noop() {
    let mut store = ShapeStore::new();
    store.upsert_at(stroke_element("a"), 100);
    assert!(store.sweep_at(200, CAP, TTL).is_empty());
    assert_eq!(store.len(), 1);
}

#[test]
fn upsert_uses_wall_clock() {
    let mut store = ShapeStore::new();
    let before = crate::frame::now_ms();
    let stored = store.upsert(stroke_element("s1"));
    assert!(stored.timestamp >= before);
}

#[test]
fn load_keeps_stored_timestamps_and_order() {
    let mut a = stroke_element("a");
    a.timestamp = 100;
    let mut b = stroke_element("b");
    b.timestamp = 100;

    let mut store = ShapeStore::new();
    store.load(vec![a, b]);

    assert_eq!(store.get("a").unwrap().timestamp, 100);
    let ids: Vec<String> = store.all().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["a", "b"]);

    // Loaded elements age out like any other.
    assert_eq!(store.sweep_at(100 + TTL + 1, CAP, TTL), vec!["a".to_string(), "b".to_string()]);
}
