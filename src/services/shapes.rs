//! Shape store: the authoritative element map.
//!
//! DESIGN
//! ======
//! Elements are keyed by their client-generated id; a later write with the
//! same id replaces the earlier one (last-applied-wins). Every write stamps a
//! server timestamp and a store-wide sequence number. The timestamp drives
//! TTL expiry; `(timestamp, sequence)` drives capacity eviction and snapshot
//! order, so elements written within the same millisecond still evict and
//! repaint in write order (erase strokes depend on paint order).
//!
//! Eviction is silent: the sweep returns the evicted ids for the caller to
//! mirror into persistence, but no client event is produced.

use std::collections::HashMap;

use crate::frame::now_ms;
use crate::state::Element;

#[derive(Debug, Clone)]
struct Entry {
    element: Element,
    seq: u64,
}

impl Entry {
    fn order_key(&self) -> (i64, u64) {
        (self.element.timestamp, self.seq)
    }
}

#[derive(Debug, Default)]
pub struct ShapeStore {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl ShapeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an element, stamping it with the current time.
    /// Returns the stored copy.
    pub fn upsert(&mut self, element: Element) -> Element {
        self.upsert_at(element, now_ms())
    }

    /// Insert or replace with an explicit clock reading.
    pub fn upsert_at(&mut self, mut element: Element, now: i64) -> Element {
        // Per-element monotonic: a replacement never moves the stamp backwards.
        let floor = self
            .entries
            .get(&element.id)
            .map_or(i64::MIN, |e| e.element.timestamp);
        element.timestamp = now.max(floor);

        let seq = self.next_seq;
        self.next_seq += 1;
        let stored = element.clone();
        self.entries.insert(element.id.clone(), Entry { element, seq });
        stored
    }

    #[cfg(test)]
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Element> {
        self.entries.get(id).map(|e| &e.element)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove an element. Missing ids are a no-op.
    pub fn delete(&mut self, id: &str) -> Option<Element> {
        self.entries.remove(id).map(|e| e.element)
    }

    /// Snapshot of every element in write order.
    #[must_use]
    pub fn all(&self) -> Vec<Element> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.order_key());
        entries.into_iter().map(|e| e.element.clone()).collect()
    }

    /// Empty the store, returning what was removed in write order.
    pub fn clear(&mut self) -> Vec<Element> {
        let mut entries: Vec<Entry> = self.entries.drain().map(|(_, e)| e).collect();
        entries.sort_by_key(Entry::order_key);
        entries.into_iter().map(|e| e.element).collect()
    }

    /// Re-insert previously captured elements (undo). Each one is re-stamped.
    pub fn restore(&mut self, elements: Vec<Element>) -> Vec<Element> {
        self.restore_at(elements, now_ms())
    }

    pub fn restore_at(&mut self, elements: Vec<Element>, now: i64) -> Vec<Element> {
        elements
            .into_iter()
            .map(|element| self.upsert_at(element, now))
            .collect()
    }

    /// Seed the store from persisted elements, keeping their stored stamps.
    /// Elements are taken in the order given.
    pub fn load(&mut self, elements: Vec<Element>) {
        for element in elements {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.entries.insert(element.id.clone(), Entry { element, seq });
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict down to `max_shapes` (oldest first), then drop everything older
    /// than `ttl_ms`. Returns evicted ids.
    pub fn sweep_at(&mut self, now: i64, max_shapes: usize, ttl_ms: i64) -> Vec<String> {
        let mut evicted = Vec::new();

        if self.entries.len() > max_shapes {
            let mut order: Vec<(i64, u64, String)> = self
                .entries
                .iter()
                .map(|(id, e)| (e.element.timestamp, e.seq, id.clone()))
                .collect();
            order.sort_unstable();
            let excess = self.entries.len() - max_shapes;
            for (_, _, id) in order.into_iter().take(excess) {
                self.entries.remove(&id);
                evicted.push(id);
            }
        }

        let mut expired: Vec<(i64, u64, String)> = self
            .entries
            .iter()
            .filter(|(_, e)| now.saturating_sub(e.element.timestamp) > ttl_ms)
            .map(|(id, e)| (e.element.timestamp, e.seq, id.clone()))
            .collect();
        expired.sort_unstable();
        for (_, _, id) in expired {
            self.entries.remove(&id);
            evicted.push(id);
        }

        evicted
    }
}

#[cfg(test)]
#[path = "shapes_test.rs"]
mod tests;
