//! Request coordination
//!
//! Tags each logical interest with a strictly increasing token. Only the call
//! holding the current token for its key may write its result into shared
//! state; anything older is dropped without side effects.
//!
//! Primary interests (selection detail, list load) abort their own previous
//! in-flight task. Prefetch-class interests only ever abort a previous task of
//! the same key, and primary interests never touch them.

use std::collections::HashMap;

use tokio::task::AbortHandle;
use tracing::debug;

/// Concern a request is issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterestKey {
    /// Body of the selected item
    Detail,
    /// Current list (re)load or page fetch
    ListLoad,
    /// Background read-ahead into the detail cache
    Prefetch,
    /// Pointer dwell timer that precedes a hover prefetch
    HoverTimer,
}

impl InterestKey {
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Detail | Self::ListLoad)
    }
}

/// Marker for "the thing currently being awaited"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken {
    key: InterestKey,
    value: u64,
}

impl RequestToken {
    pub fn key(&self) -> InterestKey {
        self.key
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

#[derive(Debug, Default)]
pub struct RequestCoordinator {
    next_value: u64,
    current: HashMap<InterestKey, u64>,
    in_flight: HashMap<InterestKey, AbortHandle>,
}

impl RequestCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate the previous token for `key`, abort its task, and issue a fresh token
    pub fn begin_interest(&mut self, key: InterestKey) -> RequestToken {
        self.cancel_previous(key);

        self.next_value += 1;
        let value = self.next_value;
        self.current.insert(key, value);

        debug!("Began interest {:?} with token {}", key, value);
        RequestToken { key, value }
    }

    pub fn is_current(&self, token: &RequestToken) -> bool {
        self.current.get(&token.key) == Some(&token.value)
    }

    /// Abort whatever task is attached to `key`
    ///
    /// The token stays current; only `begin_interest` or `invalidate` retire it.
    pub fn cancel_previous(&mut self, key: InterestKey) {
        if let Some(handle) = self.in_flight.remove(&key) {
            if !handle.is_finished() {
                debug!("Cancelling in-flight {:?} request", key);
                handle.abort();
            }
        }
    }

    /// Cancel and retire the current token so late results are discarded
    pub fn invalidate(&mut self, key: InterestKey) {
        self.cancel_previous(key);
        self.current.remove(&key);
    }

    /// Register the task that serves `token`
    ///
    /// Ignored when the token has already been superseded; the stale task is
    /// aborted instead.
    pub fn attach(&mut self, token: &RequestToken, handle: AbortHandle) {
        if self.is_current(token) {
            self.in_flight.insert(token.key, handle);
        } else {
            handle.abort();
        }
    }

    /// Whether a task for `key` is still running
    pub fn has_in_flight(&self, key: InterestKey) -> bool {
        self.in_flight
            .get(&key)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}
