//! Per-status aggregate counters
//!
//! Counters move additively through signed deltas for instant feedback and are
//! replaced outright when the authoritative snapshot is reconciled. Every key
//! is clamped at zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{CountSnapshot, ItemStatus};

/// Signed change per status key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDelta(BTreeMap<ItemStatus, i64>);

impl CountDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// One item leaving `from` and entering `to`
    pub fn moved(from: ItemStatus, to: ItemStatus) -> Self {
        let mut delta = Self::new();
        if from != to {
            delta.add(from, -1);
            delta.add(to, 1);
        }
        delta
    }

    pub fn add(&mut self, status: ItemStatus, amount: i64) {
        let entry = self.0.entry(status).or_insert(0);
        *entry += amount;
        if *entry == 0 {
            self.0.remove(&status);
        }
    }

    /// Fold another delta into this one
    pub fn merge(&mut self, other: &CountDelta) {
        for (status, amount) in other.iter() {
            self.add(status, amount);
        }
    }

    pub fn inverse(&self) -> Self {
        Self(self.0.iter().map(|(status, amount)| (*status, -amount)).collect())
    }

    pub fn get(&self, status: ItemStatus) -> i64 {
        self.0.get(&status).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemStatus, i64)> + '_ {
        self.0.iter().map(|(status, amount)| (*status, *amount))
    }
}

#[derive(Debug, Default)]
pub struct CountAggregator {
    counts: CountSnapshot,
    reconcile_ticket: u64,
}

impl CountAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a signed delta, clamping each key at zero
    pub fn bump(&mut self, delta: &CountDelta) {
        for (status, amount) in delta.iter() {
            let current = self.counts.get(status) as i64;
            let next = (current + amount).max(0) as u64;
            self.counts.set(status, next);
        }
    }

    pub fn snapshot(&self) -> CountSnapshot {
        self.counts.clone()
    }

    pub fn get(&self, status: ItemStatus) -> u64 {
        self.counts.get(status)
    }

    /// Replace local values with the authoritative snapshot
    pub fn reconcile(&mut self, remote: CountSnapshot) {
        debug!("Reconciling counts from remote snapshot: {:?}", remote);
        self.counts = remote;
    }

    /// Start a new debounce window; older tickets become stale
    pub fn next_reconcile_ticket(&mut self) -> u64 {
        self.reconcile_ticket += 1;
        self.reconcile_ticket
    }

    /// Whether no later reconcile trigger arrived since `ticket` was issued
    pub fn is_latest_ticket(&self, ticket: u64) -> bool {
        self.reconcile_ticket == ticket
    }
}
