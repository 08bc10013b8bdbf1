//! Detail body cache
//!
//! Bounded, time-expiring store of fetched item bodies. Entries are replaced
//! whole, never patched. Capacity pressure evicts by fetch time, not by last
//! access.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::clock::Clock;
use crate::types::DetailBody;

/// Cached body of one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailCacheEntry {
    pub id: String,
    pub body_plain: Option<String>,
    pub body_html: Option<String>,
    pub notice: Option<String>,
    pub fetched_at: Instant,
}

impl DetailCacheEntry {
    pub fn new(id: impl Into<String>, body: DetailBody, fetched_at: Instant) -> Self {
        Self {
            id: id.into(),
            body_plain: body.body_plain,
            body_html: body.body_html,
            notice: body.notice,
            fetched_at,
        }
    }
}

#[derive(Debug)]
struct Slot {
    entry: DetailCacheEntry,
    // Breaks fetched_at ties so eviction order stays deterministic
    seq: u64,
}

pub struct DetailCache {
    entries: HashMap<String, Slot>,
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    next_seq: u64,
}

impl DetailCache {
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
            clock,
            next_seq: 0,
        }
    }

    /// Cached entry for `id`; an expired entry is removed and reported as a miss
    pub fn get(&mut self, id: &str) -> Option<DetailCacheEntry> {
        let now = self.clock.now();
        let expired = match self.entries.get(id) {
            Some(slot) => self.is_expired(&slot.entry, now),
            None => return None,
        };

        if expired {
            debug!("Detail cache entry for {} expired", id);
            self.entries.remove(id);
            return None;
        }

        self.entries.get(id).map(|slot| slot.entry.clone())
    }

    /// Whether a non-expired entry exists, without removing anything
    pub fn contains_fresh(&self, id: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(id)
            .map(|slot| !self.is_expired(&slot.entry, now))
            .unwrap_or(false)
    }

    /// Store a freshly fetched body stamped with the current clock
    pub fn insert(&mut self, id: &str, body: DetailBody) {
        let entry = DetailCacheEntry::new(id, body, self.clock.now());
        self.put(entry);
    }

    /// Replace any entry for the same id, enforcing capacity first
    pub fn put(&mut self, entry: DetailCacheEntry) {
        self.entries.remove(&entry.id);
        self.evict();

        self.next_seq += 1;
        let seq = self.next_seq;
        self.entries.insert(entry.id.clone(), Slot { entry, seq });
    }

    /// Drop expired entries, then the oldest by fetch time until below capacity
    pub fn evict(&mut self) {
        let now = self.clock.now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, slot| now.saturating_duration_since(slot.entry.fetched_at) <= ttl);

        while self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, slot)| (slot.entry.fetched_at, slot.seq))
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    self.entries.remove(&id);
                }
                None => break,
            }
        }

        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Evicted {} detail cache entries", removed);
        }
    }

    pub fn remove(&mut self, id: &str) {
        self.entries.remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn is_expired(&self, entry: &DetailCacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.fetched_at) > self.ttl
    }
}
