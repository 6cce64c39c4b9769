// Two-tier destination cache.
//
// Tier 1 is an immutable snapshot published through ArcSwap so lookups never
// take a lock. Tier 2 is the access-ordered, size-bounded map every mutation
// goes through; it is only touched while holding `entries`, and the snapshot
// is republished before that lock is released.
use crate::SubscriberSet;
use crate::pattern::PathPattern;
use arc_swap::ArcSwap;
use courier_common::SessionId;
use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;

type Snapshot = HashMap<String, SubscriberSet>;

#[derive(Debug)]
pub(crate) struct DestinationCache {
    snapshot: ArcSwap<Snapshot>,
    // Front = least recently used.
    entries: Mutex<IndexMap<String, SubscriberSet>>,
    limit: usize,
}

impl DestinationCache {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(HashMap::new()),
            entries: Mutex::new(IndexMap::new()),
            limit,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    #[inline]
    pub(crate) fn lookup(&self, destination: &str) -> Option<SubscriberSet> {
        self.snapshot.load().get(destination).cloned()
    }

    /// Takes the write lock shared by every cache-affecting operation.
    pub(crate) fn writer(&self) -> CacheWriter<'_> {
        CacheWriter {
            snapshot: &self.snapshot,
            entries: self.entries.lock(),
            limit: self.limit,
            dirty: false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

pub(crate) struct CacheWriter<'a> {
    snapshot: &'a ArcSwap<Snapshot>,
    entries: MutexGuard<'a, IndexMap<String, SubscriberSet>>,
    limit: usize,
    dirty: bool,
}

impl CacheWriter<'_> {
    /// Write-path hit: refreshes recency without touching the snapshot.
    pub(crate) fn touch(&mut self, destination: &str) -> Option<SubscriberSet> {
        let idx = self.entries.get_index_of(destination)?;
        let last = self.entries.len() - 1;
        self.entries.move_index(idx, last);
        self.entries.get_index(last).map(|(_, set)| Arc::clone(set))
    }

    pub(crate) fn insert(&mut self, destination: &str, subscribers: SubscriberSet) {
        if self.limit == 0 || subscribers.is_empty() {
            return;
        }
        self.entries.shift_remove(destination);
        self.entries.insert(destination.to_string(), subscribers);
        while self.entries.len() > self.limit {
            if let Some((evicted, _)) = self.entries.shift_remove_index(0) {
                tracing::trace!(destination = %evicted, "evicted destination from cache");
            }
        }
        self.dirty = true;
    }

    /// Adds `session_id` to every cached destination `pattern` matches.
    pub(crate) fn add_session(&mut self, session_id: &SessionId, pattern: &PathPattern) {
        for (destination, subscribers) in self.entries.iter_mut() {
            if !subscribers.contains(session_id) && pattern.matches(destination) {
                Arc::make_mut(subscribers).insert(session_id.clone());
                self.dirty = true;
            }
        }
    }

    /// Drops `session_id` from every cached destination where `still_matches`
    /// is false; entries left without subscribers are evicted.
    pub(crate) fn remove_session<F>(&mut self, session_id: &SessionId, still_matches: F)
    where
        F: Fn(&str) -> bool,
    {
        let mut changed = false;
        self.entries.retain(|destination, subscribers| {
            if !subscribers.contains(session_id) || still_matches(destination) {
                return true;
            }
            Arc::make_mut(subscribers).remove(session_id);
            changed = true;
            !subscribers.is_empty()
        });
        self.dirty |= changed;
    }
}

impl Drop for CacheWriter<'_> {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        // Publish while the guard is still held so readers never observe a
        // tier-1 state older than a completed mutation.
        let snapshot: Snapshot = self
            .entries
            .iter()
            .map(|(destination, subscribers)| (destination.clone(), Arc::clone(subscribers)))
            .collect();
        self.snapshot.store(Arc::new(snapshot));
    }
}
