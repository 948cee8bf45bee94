//! Event deduplication keyed per trace.
//!
//! The key is the event-id when present, otherwise
//! `(span-id, type, timestamp)` — see `RuntimeEvent::dedup_key`. State is
//! bounded by each trace's own event count and cleared when the trace is
//! deleted.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

pub struct EventDeduplicator {
    enabled: bool,
    seen: Mutex<HashMap<String, HashSet<String>>>,
}

impl EventDeduplicator {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Records the key and reports whether it was already present. Always
    /// `false` when deduplication is disabled.
    pub fn is_duplicate(&self, trace_id: &str, dedup_key: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let mut seen = self.seen.lock();
        !seen
            .entry(trace_id.to_string())
            .or_default()
            .insert(dedup_key.to_string())
    }

    pub fn clear_trace(&self, trace_id: &str) {
        self.seen.lock().remove(trace_id);
    }

    pub fn clear_all(&self) {
        self.seen.lock().clear();
    }

    /// Total tracked keys across all traces.
    pub fn size(&self) -> usize {
        self.seen.lock().values().map(HashSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_keys_are_duplicates_within_a_trace() {
        let dedup = EventDeduplicator::new(true);
        assert!(!dedup.is_duplicate("t1", "ev-1"));
        assert!(dedup.is_duplicate("t1", "ev-1"));
        // Same key under a different trace is fresh.
        assert!(!dedup.is_duplicate("t2", "ev-1"));
    }

    #[test]
    fn disabled_deduplicator_never_flags() {
        let dedup = EventDeduplicator::new(false);
        assert!(!dedup.is_duplicate("t1", "ev-1"));
        assert!(!dedup.is_duplicate("t1", "ev-1"));
        assert_eq!(dedup.size(), 0);
    }

    #[test]
    fn clearing_a_trace_frees_its_keys() {
        let dedup = EventDeduplicator::new(true);
        assert!(!dedup.is_duplicate("t1", "a"));
        assert!(!dedup.is_duplicate("t1", "b"));
        assert_eq!(dedup.size(), 2);

        dedup.clear_trace("t1");
        assert_eq!(dedup.size(), 0);
        assert!(!dedup.is_duplicate("t1", "a"));
    }
}
