//! Bounded undo log.
//!
//! A stack with silent oldest-eviction: `record` trims from the front once the
//! bound is exceeded, `pop` takes from the back. Undo therefore only ever
//! reaches the last `capacity` mutations.

use std::collections::VecDeque;

use crate::state::Element;

/// One reversible mutation, carrying the state needed to reverse it.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    /// An element was added; undo deletes it.
    DrawAdd(Element),
    /// An element was deleted; undo re-inserts the captured copy.
    DeleteRemove(Element),
    /// The canvas was cleared; undo restores the captured snapshot.
    ClearRemoveAll(Vec<Element>),
}

impl HistoryEntry {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::DrawAdd(_) => "draw-add",
            Self::DeleteRemove(_) => "delete-remove",
            Self::ClearRemoveAll(_) => "clear-removeAll",
        }
    }
}

#[derive(Debug)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::with_capacity(capacity.saturating_add(1)), capacity }
    }

    /// Append an entry, dropping the oldest past capacity.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Take the most recent entry.
    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop_back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_helpers::stroke_element;

    fn add(id: &str) -> HistoryEntry {
        HistoryEntry::DrawAdd(stroke_element(id))
    }

    #[test]
    fn pop_is_lifo() {
        let mut log = HistoryLog::new(5);
        log.record(add("a"));
        log.record(add("b"));
        assert_eq!(log.pop(), Some(add("b")));
        assert_eq!(log.pop(), Some(add("a")));
        assert_eq!(log.pop(), None);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut log = HistoryLog::new(3);
        for i in 0..10 {
            log.record(add(&format!("s{i}")));
            assert!(log.len() <= 3);
        }
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn overflow_drops_oldest() {
        let cap = 4;
        let k = 3;
        let mut log = HistoryLog::new(cap);
        for i in 0..cap + k {
            log.record(add(&format!("s{i}")));
        }

        let mut recovered = Vec::new();
        while let Some(HistoryEntry::DrawAdd(el)) = log.pop() {
            recovered.push(el.id);
        }
        assert_eq!(recovered, vec!["s6", "s5", "s4", "s3"]);
        for lost in ["s0", "s1", "s2"] {
            assert!(!recovered.iter().any(|id| id == lost));
        }
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut log = HistoryLog::new(0);
        log.record(add("a"));
        assert!(log.is_empty());
        assert!(log.pop().is_none());
    }

    #[test]
    fn entries_are_heterogeneous() {
        let mut log = HistoryLog::new(10);
        log.record(add("a"));
        log.record(HistoryEntry::DeleteRemove(stroke_element("b")));
        log.record(HistoryEntry::ClearRemoveAll(vec![stroke_element("c"), stroke_element("d")]));

        assert_eq!(log.pop().map(|e| e.label()), Some("clear-removeAll"));
        assert_eq!(log.pop().map(|e| e.label()), Some("delete-remove"));
        assert_eq!(log.pop().map(|e| e.label()), Some("draw-add"));
    }
}
