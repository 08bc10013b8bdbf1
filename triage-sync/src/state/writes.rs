//! Write path of the triage store
//!
//! Single mutations, gated bulk actions and undo. Each remote phase runs in a
//! spawned task so a caller that stops waiting cannot leave an item half
//! applied: the task always reaches commit or rollback.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::state::triage_store::{
    next_remaining, BulkFailureRecord, PendingBulk, StoreEvent, StoreState, TriageStore,
};
use crate::sync::bulk::{BulkFailure, BulkOutcome, BulkTarget};
use crate::sync::counts::CountDelta;
use crate::sync::mutation::{attempt_with_override, InFlightGuard, OptimisticMutation};
use crate::sync::transitions::next_status;
use crate::sync::undo::{invert, UndoEntry};
use crate::types::error::{Result, TriageError};
use crate::types::{Item, TriageAction};

/// Final state of one single-item mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Confirmed,
    RolledBack(TriageError),
    /// The settling task died before reaching commit or rollback
    Interrupted,
}

/// Handle on a mutation that has been applied locally
#[derive(Debug)]
pub struct MutationTicket {
    id: String,
    handle: JoinHandle<MutationOutcome>,
}

impl MutationTicket {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the remote outcome
    ///
    /// Dropping the ticket instead does not affect the mutation.
    pub async fn settled(self) -> MutationOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Mutation task for {} failed: {}", self.id, e);
                MutationOutcome::Interrupted
            }
        }
    }
}

/// Result of submitting a bulk action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BulkSubmission {
    Completed(BulkOutcome),
    /// Parked behind the confirmation gate; call `confirm_bulk` to run it
    AwaitingConfirmation { action: TriageAction, count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoOutcome {
    /// The action that was reversed
    pub action: TriageAction,
    pub restored_ids: Vec<String>,
    pub failed_ids: Vec<String>,
}

fn dedupe(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Roll `pending` back onto the canonical item, or onto a scratch copy when a
/// reload already replaced it
fn rollback_in_place(state: &mut StoreState, pending: OptimisticMutation) -> Option<Option<String>> {
    let rolled_back = match state.index_of(pending.id()) {
        Some(index) => {
            let StoreState { items, counts, .. } = state;
            pending.rollback(&mut items[index], counts)
        }
        None => {
            let mut scratch = pending.prior().clone();
            pending.rollback(&mut scratch, &mut state.counts)
        }
    };
    rolled_back.selection_before
}

/// Put a prior snapshot back into the canonical list after a successful undo
fn restore_snapshot(state: &mut StoreState, prior: &Item, undone: &TriageAction) {
    match state.index_of(&prior.id) {
        Some(index) => {
            let delta = CountDelta::moved(state.items[index].status, prior.status);
            state.counts.bump(&delta);
            state.items[index] = prior.clone();
        }
        None => {
            // Not loaded anymore; assume it sits where the undone action put it
            let current = next_status(prior.status, undone);
            state.counts.bump(&CountDelta::moved(current, prior.status));
            let position = state
                .items
                .iter()
                .position(|item| item.received_at < prior.received_at)
                .unwrap_or(state.items.len());
            state.items.insert(position, prior.clone());
        }
    }
}

impl TriageStore {
    // ---- single mutations ----

    /// Apply `action` to one item optimistically and confirm it remotely
    ///
    /// Fails fast with `AlreadyInFlight` while the id has an unsettled action.
    /// If the selected item leaves the visible list, the selection moves to
    /// the next remaining item.
    pub fn apply(&self, id: &str, action: TriageAction) -> Result<MutationTicket> {
        let (pending, plan, selection_moved) = {
            let mut state = self.state();
            let index = state
                .index_of(id)
                .ok_or_else(|| TriageError::ItemNotFound(id.to_string()))?;
            let visible_before = state.visible_ids();

            let mut pending = {
                let StoreState { items, counts, .. } = &mut *state;
                self.inner.mutations.apply(&mut items[index], &action, counts)?
            };

            let selected = state.selection.selected_id.as_deref() == Some(id);
            let plan = if selected && !state.is_visible(id) {
                let next = next_remaining(&visible_before, id, |candidate| {
                    state.is_visible(candidate)
                });
                pending.record_selection_change(Some(id.to_string()));
                Some(self.select_locked(&mut state, next))
            } else {
                None
            };
            let selection_moved = plan.as_ref().map(|_| state.selection.selected_id.clone());
            (pending, plan, selection_moved)
        };

        info!("Applying {} to {}", action, id);
        self.emit_list_and_counts();
        if let Some(selected_id) = selection_moved {
            self.emit(StoreEvent::SelectionChanged { selected_id });
        }
        if let Some(plan) = plan {
            self.start_detail(plan);
        }

        let store = self.clone();
        let handle = tokio::spawn(async move { store.settle_mutation(pending).await });
        Ok(MutationTicket {
            id: id.to_string(),
            handle,
        })
    }

    async fn settle_mutation(&self, pending: OptimisticMutation) -> MutationOutcome {
        let id = pending.id().to_string();
        let action = pending.action().clone();

        let service = &*self.inner.service;
        let id_ref = id.as_str();
        let action_ref = &action;
        let result = attempt_with_override(id_ref, action_ref, move |mode| {
            service.mutate(id_ref, action_ref, mode)
        })
        .await;

        match result {
            Ok(()) => {
                let confirmed = pending.commit();
                self.state().undo.push(confirmed.into_undo_entry());
                self.schedule_reconcile();
                MutationOutcome::Confirmed
            }
            Err(e) => {
                if e.is_cancellation() {
                    debug!("{} on {} cancelled, rolling back", action, id);
                } else {
                    warn!("{} on {} failed, rolling back: {}", action, id, e);
                }

                let (plan, selection) = {
                    let mut state = self.state();
                    match rollback_in_place(&mut state, pending) {
                        Some(previous) => {
                            let plan = self.select_locked(&mut state, previous);
                            (Some(plan), Some(state.selection.selected_id.clone()))
                        }
                        None => (None, None),
                    }
                };

                self.emit_list_and_counts();
                if let Some(selected_id) = selection {
                    self.emit(StoreEvent::SelectionChanged { selected_id });
                }
                if let Some(plan) = plan {
                    self.start_detail(plan);
                }
                if !e.is_cancellation() {
                    self.emit(StoreEvent::Error { error: e.clone() });
                }
                if e.is_not_found() {
                    self.spawn_reload();
                }
                self.schedule_reconcile();
                MutationOutcome::RolledBack(e)
            }
        }
    }

    pub fn archive(&self, id: &str) -> Result<MutationTicket> {
        self.apply(id, TriageAction::Archive)
    }

    pub fn unarchive(&self, id: &str) -> Result<MutationTicket> {
        self.apply(id, TriageAction::Unarchive)
    }

    /// Park the item in the waiting state
    pub fn hold(&self, id: &str) -> Result<MutationTicket> {
        self.apply(id, TriageAction::SetWaiting)
    }

    pub fn release_hold(&self, id: &str) -> Result<MutationTicket> {
        self.apply(id, TriageAction::UnsetWaiting)
    }

    pub fn mute(&self, id: &str) -> Result<MutationTicket> {
        self.apply(id, TriageAction::Mute)
    }

    pub fn unmute(&self, id: &str) -> Result<MutationTicket> {
        self.apply(id, TriageAction::Unmute)
    }

    pub fn assign(&self, id: &str, assignee_id: impl Into<String>) -> Result<MutationTicket> {
        self.apply(
            id,
            TriageAction::Assign {
                assignee_id: assignee_id.into(),
            },
        )
    }

    pub fn unassign(&self, id: &str) -> Result<MutationTicket> {
        self.apply(id, TriageAction::Unassign)
    }

    pub fn snooze(&self, id: &str, until: DateTime<Utc>) -> Result<MutationTicket> {
        self.apply(id, TriageAction::Snooze { until })
    }

    pub fn unsnooze(&self, id: &str) -> Result<MutationTicket> {
        self.apply(id, TriageAction::Unsnooze)
    }

    pub fn add_label(&self, id: &str, label: impl Into<String>) -> Result<MutationTicket> {
        self.apply(
            id,
            TriageAction::AddLabel {
                label: label.into(),
            },
        )
    }

    pub fn remove_label(&self, id: &str, label: impl Into<String>) -> Result<MutationTicket> {
        self.apply(
            id,
            TriageAction::RemoveLabel {
                label: label.into(),
            },
        )
    }

    // ---- bulk ----

    /// Apply one action to many items
    ///
    /// Gated actions over the confirmation threshold are parked until
    /// `confirm_bulk`. Only one bulk run may be active at a time.
    pub async fn apply_bulk(
        &self,
        ids: Vec<String>,
        action: TriageAction,
    ) -> Result<BulkSubmission> {
        let ids = dedupe(ids);
        if ids.is_empty() {
            return Ok(BulkSubmission::Completed(BulkOutcome::empty()));
        }

        {
            let mut state = self.state();
            if state.bulk_in_progress {
                return Err(TriageError::BulkInProgress);
            }
            if self.inner.gate.requires_confirmation(&action, ids.len()) {
                let count = ids.len();
                info!("Bulk {} over {} items needs confirmation", action, count);
                state.pending_confirmation = Some(PendingBulk {
                    action: action.clone(),
                    ids,
                });
                drop(state);
                self.emit(StoreEvent::ConfirmationRequired {
                    action: action.clone(),
                    count,
                });
                return Ok(BulkSubmission::AwaitingConfirmation { action, count });
            }
        }

        self.run_bulk(ids, action)
            .await
            .map(BulkSubmission::Completed)
    }

    /// Run the bulk action parked behind the confirmation gate
    pub async fn confirm_bulk(&self) -> Result<BulkOutcome> {
        let pending = self
            .state()
            .pending_confirmation
            .take()
            .ok_or(TriageError::NoPendingConfirmation)?;
        info!("Bulk {} confirmed", pending.action);
        self.run_bulk(pending.ids, pending.action).await
    }

    /// Drop the parked bulk action; returns whether one was pending
    pub fn cancel_bulk(&self) -> bool {
        let dropped = self.state().pending_confirmation.take();
        if let Some(pending) = &dropped {
            debug!("Bulk {} dismissed", pending.action);
        }
        dropped.is_some()
    }

    /// Submit the last bulk action again over the ids that failed
    ///
    /// Goes through the same confirmation gate as `apply_bulk`.
    pub async fn retry_failed_bulk(&self) -> Result<BulkSubmission> {
        let record = self
            .state()
            .last_bulk_failure
            .clone()
            .ok_or(TriageError::NothingToRetry)?;
        info!(
            "Retrying bulk {} for {} failed items",
            record.action,
            record.failures.len()
        );
        self.apply_bulk(record.failed_ids(), record.action).await
    }

    pub async fn bulk_archive(&self, ids: Vec<String>) -> Result<BulkSubmission> {
        self.apply_bulk(ids, TriageAction::Archive).await
    }

    pub async fn bulk_hold(&self, ids: Vec<String>) -> Result<BulkSubmission> {
        self.apply_bulk(ids, TriageAction::SetWaiting).await
    }

    pub async fn bulk_mute(&self, ids: Vec<String>) -> Result<BulkSubmission> {
        self.apply_bulk(ids, TriageAction::Mute).await
    }

    pub async fn bulk_assign(
        &self,
        ids: Vec<String>,
        assignee_id: impl Into<String>,
    ) -> Result<BulkSubmission> {
        let action = TriageAction::Assign {
            assignee_id: assignee_id.into(),
        };
        self.apply_bulk(ids, action).await
    }

    pub async fn bulk_snooze(
        &self,
        ids: Vec<String>,
        until: DateTime<Utc>,
    ) -> Result<BulkSubmission> {
        self.apply_bulk(ids, TriageAction::Snooze { until }).await
    }

    pub async fn bulk_label(
        &self,
        ids: Vec<String>,
        label: impl Into<String>,
    ) -> Result<BulkSubmission> {
        let action = TriageAction::AddLabel {
            label: label.into(),
        };
        self.apply_bulk(ids, action).await
    }

    async fn run_bulk(&self, ids: Vec<String>, action: TriageAction) -> Result<BulkOutcome> {
        {
            let mut state = self.state();
            if state.bulk_in_progress {
                return Err(TriageError::BulkInProgress);
            }
            state.bulk_in_progress = true;
        }

        let store = self.clone();
        let handle = tokio::spawn(async move { store.execute_bulk(ids, action).await });
        match handle.await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("Bulk task failed: {}", e);
                let mut state = self.state();
                state.bulk_in_progress = false;
                state.bulk_progress = None;
                Err(TriageError::Other(format!("bulk task failed: {e}")))
            }
        }
    }

    async fn execute_bulk(&self, ids: Vec<String>, action: TriageAction) -> BulkOutcome {
        let mut early_failures = Vec::new();
        let mut pending: HashMap<String, OptimisticMutation> = HashMap::new();
        let mut targets = Vec::new();

        let (plan, moved_from) = {
            let mut state = self.state();
            let visible_before = state.visible_ids();
            let selected = state.selection.selected_id.clone();

            for id in &ids {
                let Some(index) = state.index_of(id) else {
                    early_failures.push(BulkFailure {
                        id: id.clone(),
                        label: id.clone(),
                        error: TriageError::ItemNotFound(id.clone()),
                    });
                    continue;
                };
                let label = state.items[index].display_label();
                let applied = {
                    let StoreState { items, counts, .. } = &mut *state;
                    self.inner.mutations.apply(&mut items[index], &action, counts)
                };
                match applied {
                    Ok(mutation) => {
                        pending.insert(id.clone(), mutation);
                        targets.push(BulkTarget::new(id.clone(), label));
                    }
                    Err(error) => early_failures.push(BulkFailure {
                        id: id.clone(),
                        label,
                        error,
                    }),
                }
            }

            match selected {
                Some(selected) if pending.contains_key(&selected) && !state.is_visible(&selected) => {
                    let next = next_remaining(&visible_before, &selected, |candidate| {
                        state.is_visible(candidate)
                    });
                    (Some(self.select_locked(&mut state, next)), Some(selected))
                }
                _ => (None, None),
            }
        };

        self.emit_list_and_counts();
        if plan.is_some() {
            let selected_id = self.state().selection.selected_id.clone();
            self.emit(StoreEvent::SelectionChanged { selected_id });
        }
        if let Some(plan) = plan {
            self.start_detail(plan);
        }

        let service = &*self.inner.service;
        let mutate_action = &action;
        let mut outcome = self
            .inner
            .bulk
            .run(
                targets,
                &action,
                move |id, mode| async move { service.mutate(&id, mutate_action, mode).await },
                |progress| {
                    self.state().bulk_progress = Some(progress);
                    self.emit(StoreEvent::BulkProgress { progress });
                },
            )
            .await;

        let restore_plan = {
            let mut state = self.state();

            let mut succeeded = Vec::new();
            let mut prior_items = Vec::new();
            for id in &outcome.success_ids {
                if let Some(mutation) = pending.remove(id) {
                    let confirmed = mutation.commit();
                    succeeded.push(confirmed.id);
                    prior_items.push(confirmed.prior_item);
                }
            }
            if !succeeded.is_empty() {
                state.undo.push(UndoEntry::Bulk {
                    action: action.clone(),
                    ids: succeeded,
                    prior_items,
                });
            }

            for id in &outcome.failed_ids {
                if let Some(mutation) = pending.remove(id) {
                    rollback_in_place(&mut state, mutation);
                }
            }

            for failure in early_failures {
                outcome.failed_ids.push(failure.id.clone());
                outcome.failed_details.push(failure);
            }

            state.last_bulk_failure = if outcome.failed_details.is_empty() {
                None
            } else {
                Some(BulkFailureRecord {
                    action: action.clone(),
                    failures: outcome.failed_details.clone(),
                })
            };
            state.bulk_in_progress = false;
            state.bulk_progress = None;

            // The selected item came back after failing; put the selection back on it
            match moved_from {
                Some(previous)
                    if outcome.failed_ids.contains(&previous) && state.is_visible(&previous) =>
                {
                    Some(self.select_locked(&mut state, Some(previous)))
                }
                _ => None,
            }
        };
        drop(pending);

        self.emit_list_and_counts();
        if let Some(plan) = restore_plan {
            let selected_id = self.state().selection.selected_id.clone();
            self.emit(StoreEvent::SelectionChanged { selected_id });
            self.start_detail(plan);
        }
        self.emit(StoreEvent::BulkFinished {
            run_id: outcome.run_id,
            succeeded: outcome.success_ids.len(),
            failed: outcome.failed_ids.len(),
        });
        self.schedule_reconcile();

        if outcome
            .failed_details
            .iter()
            .any(|failure| failure.error.is_not_found())
        {
            self.spawn_reload();
        }
        outcome
    }

    // ---- undo ----

    /// Reverse the most recent confirmed action
    ///
    /// Local state is restored only after the service confirms the reverse
    /// action. Ids that fail stay on the history for another attempt.
    pub async fn undo(&self) -> Result<UndoOutcome> {
        let store = self.clone();
        let handle = tokio::spawn(async move { store.execute_undo().await });
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("Undo task failed: {}", e);
                Err(TriageError::Other(format!("undo task failed: {e}")))
            }
        }
    }

    async fn execute_undo(&self) -> Result<UndoOutcome> {
        let entry = {
            let mut state = self.state();
            if state.bulk_in_progress {
                return Err(TriageError::BulkInProgress);
            }
            state.undo.pop().ok_or(TriageError::NothingToUndo)?
        };
        let action = entry.action().clone();
        let is_single = matches!(entry, UndoEntry::Single { .. });

        // Reverse action per id; an item without one can never be undone
        let mut reversible: Vec<(Item, TriageAction)> = Vec::new();
        let mut unsupported = Vec::new();
        let mut unsupported_error = None;
        for prior in entry.prior_items() {
            match invert(&action, prior) {
                Ok(inverse) => reversible.push((prior.clone(), inverse)),
                Err(e) => {
                    unsupported.push(prior.id.clone());
                    unsupported_error.get_or_insert(e);
                }
            }
        }
        if reversible.is_empty() {
            let error = unsupported_error
                .unwrap_or_else(|| TriageError::UndoUnsupported(action.to_string()));
            info!("Undo of {} not possible: {}", action, error);
            self.emit(StoreEvent::Error {
                error: error.clone(),
            });
            return Err(error);
        }

        let mut guards: Vec<InFlightGuard> = Vec::new();
        for (prior, _) in &reversible {
            match self.inner.mutations.reserve(&prior.id) {
                Ok(guard) => guards.push(guard),
                Err(e) => {
                    drop(guards);
                    debug!("Undo deferred, {} is busy", prior.id);
                    self.state().undo.push(entry);
                    return Err(e);
                }
            }
        }

        info!("Undoing {} for {} items", action, reversible.len());
        let service = &*self.inner.service;
        let (restored, failures): (Vec<Item>, Vec<BulkFailure>) = match &entry {
            UndoEntry::Single { .. } => {
                let (prior, inverse) = &reversible[0];
                let id_ref = prior.id.as_str();
                let result = attempt_with_override(id_ref, &action, move |mode| {
                    service.mutate(id_ref, inverse, mode)
                })
                .await;
                match result {
                    Ok(()) => (vec![prior.clone()], Vec::new()),
                    Err(error) => (
                        Vec::new(),
                        vec![BulkFailure {
                            id: prior.id.clone(),
                            label: prior.display_label(),
                            error,
                        }],
                    ),
                }
            }
            UndoEntry::Bulk { .. } => {
                let inverses: HashMap<String, TriageAction> = reversible
                    .iter()
                    .map(|(prior, inverse)| (prior.id.clone(), inverse.clone()))
                    .collect();
                let targets = reversible
                    .iter()
                    .map(|(prior, _)| BulkTarget::new(prior.id.clone(), prior.display_label()))
                    .collect();
                let inverses = &inverses;
                let outcome = self
                    .inner
                    .bulk
                    .run(
                        targets,
                        &action,
                        move |id, mode| async move {
                            match inverses.get(&id) {
                                Some(inverse) => service.mutate(&id, inverse, mode).await,
                                None => Err(TriageError::ItemNotFound(id)),
                            }
                        },
                        |progress| self.emit(StoreEvent::BulkProgress { progress }),
                    )
                    .await;
                let succeeded: HashSet<&String> = outcome.success_ids.iter().collect();
                let restored = reversible
                    .iter()
                    .filter(|(prior, _)| succeeded.contains(&prior.id))
                    .map(|(prior, _)| prior.clone())
                    .collect();
                (restored, outcome.failed_details)
            }
        };
        drop(guards);

        let failed_ids: Vec<String> = failures.iter().map(|f| f.id.clone()).collect();
        {
            let mut state = self.state();
            for prior in &restored {
                restore_snapshot(&mut state, prior, &action);
            }

            if !failed_ids.is_empty() {
                let retained = match entry {
                    UndoEntry::Single { .. } => entry,
                    UndoEntry::Bulk {
                        action,
                        ids,
                        prior_items,
                    } => {
                        let (ids, prior_items): (Vec<String>, Vec<Item>) = ids
                            .into_iter()
                            .zip(prior_items)
                            .filter(|(id, _)| failed_ids.contains(id))
                            .unzip();
                        UndoEntry::Bulk {
                            action,
                            ids,
                            prior_items,
                        }
                    }
                };
                state.undo.push(retained);
            }
        }

        let restored_ids: Vec<String> = restored.iter().map(|item| item.id.clone()).collect();
        self.emit_list_and_counts();
        if !restored_ids.is_empty() {
            self.emit(StoreEvent::UndoApplied {
                action: action.clone(),
                restored: restored_ids.len(),
            });
            self.schedule_reconcile();
        }

        if let Some(failure) = failures.first() {
            warn!(
                "Undo of {} failed for {} items: {}",
                action,
                failures.len(),
                failure.error
            );
            self.emit(StoreEvent::Error {
                error: failure.error.clone(),
            });
            self.spawn_reload();
            if is_single {
                return Err(failure.error.clone());
            }
        }

        let mut failed_ids = failed_ids;
        failed_ids.extend(unsupported);
        Ok(UndoOutcome {
            action,
            restored_ids,
            failed_ids,
        })
    }
}
