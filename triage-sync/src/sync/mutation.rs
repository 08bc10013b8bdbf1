//! Optimistic single-item mutations
//!
//! A mutation moves through `Idle -> OptimisticallyApplied -> Confirmed | RolledBack`.
//! The local item and counters change immediately; the remote call then either
//! confirms the change or the exact inverse is applied. `commit` and `rollback`
//! consume the in-flight value, so each mutation has exactly one terminal path.
//!
//! Only one action per id may be in flight. A second request is refused rather
//! than queued so a rollback always restores a single known prior state.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::sync::counts::{CountAggregator, CountDelta};
use crate::sync::transitions::{apply_to_item, transition, Transition};
use crate::sync::undo::UndoEntry;
use crate::types::error::{Result, TriageError};
use crate::types::{Item, MutateMode, TriageAction};

/// Lifecycle of one mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationPhase {
    Idle,
    OptimisticallyApplied,
    Confirmed,
    RolledBack,
}

type InFlightSet = Arc<Mutex<HashSet<String>>>;

fn lock_set(set: &InFlightSet) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|e| e.into_inner())
}

/// Holds an id in the in-flight set until dropped
#[derive(Debug)]
pub struct InFlightGuard {
    ids: InFlightSet,
    id: String,
}

impl InFlightGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_set(&self.ids).remove(&self.id);
        debug!("Released in-flight lock for {}", self.id);
    }
}

/// Tracks which ids have an action in flight and applies optimistic changes
#[derive(Debug, Clone, Default)]
pub struct MutationExecutor {
    in_flight: InFlightSet,
}

impl MutationExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        lock_set(&self.in_flight).contains(id)
    }

    /// Whether any id still awaits its remote outcome
    pub fn has_any_in_flight(&self) -> bool {
        !lock_set(&self.in_flight).is_empty()
    }

    /// Phase as seen from outside: either idle or awaiting the remote call
    pub fn phase(&self, id: &str) -> MutationPhase {
        if self.is_in_flight(id) {
            MutationPhase::OptimisticallyApplied
        } else {
            MutationPhase::Idle
        }
    }

    /// Claim `id` without changing anything (used by undo)
    pub fn reserve(&self, id: &str) -> Result<InFlightGuard> {
        let mut ids = lock_set(&self.in_flight);
        if !ids.insert(id.to_string()) {
            return Err(TriageError::AlreadyInFlight(id.to_string()));
        }
        Ok(InFlightGuard {
            ids: self.in_flight.clone(),
            id: id.to_string(),
        })
    }

    /// Apply `action` to the local item and counters
    pub fn apply(
        &self,
        item: &mut Item,
        action: &TriageAction,
        counts: &mut CountAggregator,
    ) -> Result<OptimisticMutation> {
        let guard = self.reserve(&item.id)?;

        let prior = item.clone();
        let transition = transition(item.status, action);
        apply_to_item(item, action);
        counts.bump(&transition.forward);

        debug!(
            "Applied {} to {} locally ({} -> {})",
            action, item.id, transition.from, transition.to
        );

        Ok(OptimisticMutation {
            action: action.clone(),
            prior,
            transition,
            selection_before: None,
            guard,
        })
    }
}

/// A mutation applied locally and awaiting its remote outcome
#[derive(Debug)]
pub struct OptimisticMutation {
    action: TriageAction,
    prior: Item,
    transition: Transition,
    selection_before: Option<Option<String>>,
    guard: InFlightGuard,
}

impl OptimisticMutation {
    pub fn id(&self) -> &str {
        self.guard.id()
    }

    pub fn action(&self) -> &TriageAction {
        &self.action
    }

    pub fn prior(&self) -> &Item {
        &self.prior
    }

    pub fn transition(&self) -> &Transition {
        &self.transition
    }

    pub fn phase(&self) -> MutationPhase {
        MutationPhase::OptimisticallyApplied
    }

    /// Remember the selection that was active before this mutation moved it
    pub fn record_selection_change(&mut self, previous: Option<String>) {
        self.selection_before = Some(previous);
    }

    /// Selection to restore on rollback, if the mutation changed it
    pub fn selection_before(&self) -> Option<&Option<String>> {
        self.selection_before.as_ref()
    }

    /// Keep the optimistic state as final
    pub fn commit(self) -> ConfirmedMutation {
        debug!("Confirmed {} for {}", self.action, self.guard.id());
        ConfirmedMutation {
            id: self.guard.id().to_string(),
            action: self.action,
            prior_item: self.prior,
        }
    }

    /// Apply the precomputed inverse delta and restore the prior item
    pub fn rollback(self, item: &mut Item, counts: &mut CountAggregator) -> RolledBackMutation {
        counts.bump(&self.transition.inverse);
        *item = self.prior;

        debug!("Rolled back {} for {}", self.action, self.guard.id());
        RolledBackMutation {
            id: self.guard.id().to_string(),
            inverse: self.transition.inverse,
            selection_before: self.selection_before,
        }
    }
}

/// Terminal `Confirmed` phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedMutation {
    pub id: String,
    pub action: TriageAction,
    pub prior_item: Item,
}

impl ConfirmedMutation {
    pub fn phase(&self) -> MutationPhase {
        MutationPhase::Confirmed
    }

    pub fn into_undo_entry(self) -> UndoEntry {
        UndoEntry::Single {
            id: self.id,
            prior_item: self.prior_item,
            action: self.action,
        }
    }
}

/// Terminal `RolledBack` phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolledBackMutation {
    pub id: String,
    pub inverse: CountDelta,
    pub selection_before: Option<Option<String>>,
}

impl RolledBackMutation {
    pub fn phase(&self) -> MutationPhase {
        MutationPhase::RolledBack
    }
}

/// Run one remote attempt, retrying once in override mode on an assign conflict
///
/// A failure of the override attempt is terminal.
pub async fn attempt_with_override<F, Fut>(
    id: &str,
    action: &TriageAction,
    mut call: F,
) -> Result<()>
where
    F: FnMut(MutateMode) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    match call(MutateMode::Normal).await {
        Err(err) if err.is_conflict() && action.retries_on_conflict() => {
            warn!(
                "{} on {} hit a conflict ({}), retrying with override",
                action, id, err
            );
            call(MutateMode::Override).await
        }
        other => other,
    }
}
