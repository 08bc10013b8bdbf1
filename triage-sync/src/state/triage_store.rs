//! Triage store
//!
//! Owns the canonical item list and wires the request coordinator, detail
//! cache, counters, mutation/bulk executors and undo history together. This is
//! the only surface the view layer talks to.
//!
//! All shared state sits behind one mutex that is never held across an
//! `.await`. Remote calls run in spawned tasks; whether their result may touch
//! shared state is decided by the request token they captured at issue time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::TriageService;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::state::view::{ItemPredicate, ViewFilter};
use crate::sync::bulk::{BulkExecutor, BulkFailure, BulkProgress, ConfirmationGate};
use crate::sync::coordinator::{InterestKey, RequestCoordinator, RequestToken};
use crate::sync::counts::CountAggregator;
use crate::sync::detail_cache::{DetailCache, DetailCacheEntry};
use crate::sync::mutation::MutationExecutor;
use crate::sync::undo::UndoStack;
use crate::types::error::{Result, TriageError};
use crate::types::{CountSnapshot, DetailBody, Item, ListPage, ListRequest, TriageAction, View};

/// Body state of the current selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailState {
    Empty,
    Loading,
    Ready(DetailCacheEntry),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub selected_id: Option<String>,
    pub detail: DetailState,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            selected_id: None,
            detail: DetailState::Empty,
        }
    }
}

/// A gated bulk action waiting for the user to confirm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBulk {
    pub action: TriageAction,
    pub ids: Vec<String>,
}

/// Failures of the last bulk run, kept for display and retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailureRecord {
    pub action: TriageAction,
    pub failures: Vec<BulkFailure>,
}

impl BulkFailureRecord {
    pub fn failed_ids(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.id.clone()).collect()
    }
}

/// Result of a list load or page fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { items: usize },
    /// A newer load took over; nothing was written
    Superseded,
    NoMorePages,
}

/// Events for the view layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    ListChanged { visible: usize },
    SelectionChanged { selected_id: Option<String> },
    DetailReady { id: String },
    CountsChanged { counts: CountSnapshot },
    BulkProgress { progress: BulkProgress },
    BulkFinished { run_id: Uuid, succeeded: usize, failed: usize },
    ConfirmationRequired { action: TriageAction, count: usize },
    UndoApplied { action: TriageAction, restored: usize },
    Error { error: TriageError },
}

/// Handle on a detail fetch started by `select`
#[derive(Debug)]
pub struct DetailRequest {
    handle: Option<JoinHandle<()>>,
}

impl DetailRequest {
    /// Served from the cache (or nothing to fetch)
    pub fn is_immediate(&self) -> bool {
        self.handle.is_none()
    }

    /// Wait for the fetch to finish or be superseded
    pub async fn settled(self) {
        if let Some(handle) = self.handle {
            let _ = handle.await;
        }
    }
}

/// What the caller must do after changing the selection under the lock
pub(crate) enum DetailPlan {
    Cleared,
    Cached {
        neighbor: Option<String>,
    },
    Fetch {
        id: String,
        token: RequestToken,
        neighbor: Option<String>,
    },
}

pub(crate) struct StoreState {
    pub(crate) items: Vec<Item>,
    pub(crate) filter: ViewFilter,
    pub(crate) query: Option<String>,
    pub(crate) next_page_token: Option<String>,
    pub(crate) selection: Selection,
    pub(crate) counts: CountAggregator,
    pub(crate) cache: DetailCache,
    pub(crate) undo: UndoStack,
    pub(crate) coordinator: RequestCoordinator,
    pub(crate) bulk_in_progress: bool,
    pub(crate) bulk_progress: Option<BulkProgress>,
    pub(crate) pending_confirmation: Option<PendingBulk>,
    pub(crate) last_bulk_failure: Option<BulkFailureRecord>,
    pub(crate) prefetch_targets: Vec<String>,
}

impl StoreState {
    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    pub(crate) fn visible_ids(&self) -> Vec<String> {
        self.filter.visible_ids(&self.items)
    }

    pub(crate) fn is_visible(&self, id: &str) -> bool {
        self.index_of(id)
            .map(|index| self.filter.accepts(&self.items[index]))
            .unwrap_or(false)
    }

    pub(crate) fn visible_count(&self) -> usize {
        self.filter.derive(&self.items).len()
    }
}

/// Item to move the selection to once `id` left `visible_before`
///
/// Prefers the next item that is still visible, then the closest previous one.
pub(crate) fn next_remaining(
    visible_before: &[String],
    id: &str,
    still_visible: impl Fn(&str) -> bool,
) -> Option<String> {
    let position = visible_before.iter().position(|candidate| candidate == id)?;
    visible_before[position + 1..]
        .iter()
        .find(|candidate| still_visible(candidate))
        .or_else(|| {
            visible_before[..position]
                .iter()
                .rev()
                .find(|candidate| still_visible(candidate))
        })
        .cloned()
}

pub(crate) struct StoreInner {
    pub(crate) service: Arc<dyn TriageService>,
    pub(crate) config: EngineConfig,
    pub(crate) state: Mutex<StoreState>,
    pub(crate) mutations: MutationExecutor,
    pub(crate) bulk: BulkExecutor,
    pub(crate) gate: ConfirmationGate,
    pub(crate) events: flume::Sender<StoreEvent>,
}

/// Client-side triage state, cheap to clone
#[derive(Clone)]
pub struct TriageStore {
    pub(crate) inner: Arc<StoreInner>,
}

impl TriageStore {
    /// Create a store backed by `service`
    ///
    /// Returns the receiving end of the event channel for the view layer.
    pub fn new(
        service: Arc<dyn TriageService>,
        config: EngineConfig,
    ) -> (Self, flume::Receiver<StoreEvent>) {
        Self::with_clock(service, config, Arc::new(SystemClock))
    }

    /// Create a store whose detail cache ages entries against `clock`
    pub fn with_clock(
        service: Arc<dyn TriageService>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> (Self, flume::Receiver<StoreEvent>) {
        let (tx, rx) = flume::unbounded();

        let state = StoreState {
            items: Vec::new(),
            filter: ViewFilter::default(),
            query: None,
            next_page_token: None,
            selection: Selection::default(),
            counts: CountAggregator::new(),
            cache: DetailCache::new(
                config.detail_cache_capacity,
                config.detail_cache_ttl(),
                clock,
            ),
            undo: UndoStack::new(config.undo_capacity),
            coordinator: RequestCoordinator::new(),
            bulk_in_progress: false,
            bulk_progress: None,
            pending_confirmation: None,
            last_bulk_failure: None,
            prefetch_targets: Vec::new(),
        };

        let inner = StoreInner {
            service,
            mutations: MutationExecutor::new(),
            bulk: BulkExecutor::new(config.bulk_batch_size, config.bulk_min_visible()),
            gate: ConfirmationGate::new(config.bulk_confirm_threshold),
            state: Mutex::new(state),
            events: tx,
            config,
        };

        let store = Self {
            inner: Arc::new(inner),
        };
        (store, rx)
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        if let Err(e) = self.inner.events.send(event) {
            debug!("No listener for store event: {:?}", e.into_inner());
        }
    }

    pub(crate) fn emit_list_and_counts(&self) {
        let (visible, counts) = {
            let state = self.state();
            (state.visible_count(), state.counts.snapshot())
        };
        self.emit(StoreEvent::ListChanged { visible });
        self.emit(StoreEvent::CountsChanged { counts });
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ---- reads ----

    /// Derived list in display order
    pub fn visible_items(&self) -> Vec<Item> {
        let state = self.state();
        state.filter.derive(&state.items).into_iter().cloned().collect()
    }

    /// Canonical list, unfiltered
    pub fn items(&self) -> Vec<Item> {
        self.state().items.clone()
    }

    pub fn item(&self, id: &str) -> Option<Item> {
        let state = self.state();
        state.index_of(id).map(|index| state.items[index].clone())
    }

    pub fn selection(&self) -> Selection {
        self.state().selection.clone()
    }

    pub fn counts(&self) -> CountSnapshot {
        self.state().counts.snapshot()
    }

    pub fn view(&self) -> View {
        self.state().filter.view.clone()
    }

    pub fn undo_depth(&self) -> usize {
        self.state().undo.len()
    }

    pub fn bulk_progress(&self) -> Option<BulkProgress> {
        self.state().bulk_progress
    }

    pub fn is_bulk_running(&self) -> bool {
        self.state().bulk_in_progress
    }

    pub fn pending_confirmation(&self) -> Option<PendingBulk> {
        self.state().pending_confirmation.clone()
    }

    pub fn last_bulk_failure(&self) -> Option<BulkFailureRecord> {
        self.state().last_bulk_failure.clone()
    }

    pub fn has_more(&self) -> bool {
        self.state().next_page_token.is_some()
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.inner.mutations.is_in_flight(id)
    }

    /// Fresh cached body for `id`, if any
    pub fn cached_detail(&self, id: &str) -> Option<DetailCacheEntry> {
        self.state().cache.get(id)
    }

    // ---- view setup ----

    /// Switch tab and reload the list
    pub async fn set_view(&self, view: View) -> Result<LoadOutcome> {
        {
            let mut state = self.state();
            info!("Switching view to {:?}", view);
            state.filter.view = view;
            state.next_page_token = None;
        }
        self.load_list().await
    }

    /// Set the opaque query passed to the list endpoint and reload
    pub async fn set_query(&self, query: Option<String>) -> Result<LoadOutcome> {
        {
            let mut state = self.state();
            state.query = query;
            state.next_page_token = None;
        }
        self.load_list().await
    }

    /// Replace the yes/no predicates produced by the search layer
    pub fn set_predicates(&self, predicates: Vec<ItemPredicate>) {
        let visible = {
            let mut state = self.state();
            state.filter.set_predicates(predicates);
            state.visible_count()
        };
        self.emit(StoreEvent::ListChanged { visible });
    }

    pub fn set_focus_mode(&self, enabled: bool) {
        let visible = {
            let mut state = self.state();
            state.filter.set_focus_mode(enabled);
            state.visible_count()
        };
        debug!("Focus mode {}", if enabled { "on" } else { "off" });
        self.emit(StoreEvent::ListChanged { visible });
    }

    // ---- loading ----

    /// Replace the canonical list with the first page of the current view
    pub async fn load_list(&self) -> Result<LoadOutcome> {
        self.fetch_page(false).await
    }

    /// Append the next page, if the service reported one
    pub async fn load_more(&self) -> Result<LoadOutcome> {
        if !self.has_more() {
            return Ok(LoadOutcome::NoMorePages);
        }
        self.fetch_page(true).await
    }

    async fn fetch_page(&self, append: bool) -> Result<LoadOutcome> {
        let (token, request) = {
            let mut state = self.state();
            let token = state.coordinator.begin_interest(InterestKey::ListLoad);
            let request = ListRequest {
                view: state.filter.view.clone(),
                query: state.query.clone(),
                page_token: if append {
                    state.next_page_token.clone()
                } else {
                    None
                },
                page_size: self.inner.config.page_size,
            };
            (token, request)
        };

        debug!(
            "Loading list for {:?} (page token {:?})",
            request.view, request.page_token
        );

        let service = self.inner.service.clone();
        let handle = tokio::spawn(async move { service.list(&request).await });
        self.state()
            .coordinator
            .attach(&token, handle.abort_handle());

        let result = match handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => {
                debug!("List load {} cancelled by a newer load", token.value());
                return Ok(LoadOutcome::Superseded);
            }
            Err(e) => return Err(TriageError::Other(format!("list task failed: {e}"))),
        };

        self.apply_page(token, append, result)
    }

    fn apply_page(
        &self,
        token: RequestToken,
        append: bool,
        result: Result<ListPage>,
    ) -> Result<LoadOutcome> {
        let page = match result {
            Ok(page) => page,
            Err(e) if e.is_cancellation() => return Ok(LoadOutcome::Superseded),
            Err(e) => {
                if !self.state().coordinator.is_current(&token) {
                    debug!("Dropping error from stale list load: {}", e);
                    return Ok(LoadOutcome::Superseded);
                }
                error!("List load failed: {}", e);
                self.emit(StoreEvent::Error { error: e.clone() });
                return Err(e);
            }
        };

        let (loaded, visible, warmup, selection_cleared) = {
            let mut state = self.state();
            if !state.coordinator.is_current(&token) {
                debug!("Discarding stale list result for token {}", token.value());
                return Ok(LoadOutcome::Superseded);
            }

            let loaded = page.items.len();
            if append {
                let known: HashSet<String> =
                    state.items.iter().map(|item| item.id.clone()).collect();
                let fresh: Vec<Item> = page
                    .items
                    .into_iter()
                    .filter(|item| !known.contains(&item.id))
                    .collect();
                state.items.extend(fresh);
            } else {
                state.items = page.items;
            }
            state.next_page_token = page.next_page_token;

            let mut selection_cleared = false;
            if let Some(selected) = state.selection.selected_id.clone() {
                if state.index_of(&selected).is_none() {
                    debug!("Selected item {} no longer listed, clearing selection", selected);
                    state.coordinator.invalidate(InterestKey::Detail);
                    state.selection = Selection::default();
                    selection_cleared = true;
                }
            }

            let warmup: Vec<String> = if append {
                Vec::new()
            } else {
                let selected = state.selection.selected_id.clone();
                state
                    .visible_ids()
                    .into_iter()
                    .filter(|id| Some(id) != selected.as_ref())
                    .take(self.inner.config.warmup_prefetch_count)
                    .collect()
            };

            (loaded, state.visible_count(), warmup, selection_cleared)
        };

        info!("Loaded {} items ({} visible)", loaded, visible);
        self.emit(StoreEvent::ListChanged { visible });
        if selection_cleared {
            self.emit(StoreEvent::SelectionChanged { selected_id: None });
        }
        if !warmup.is_empty() {
            self.prefetch(warmup);
        }

        Ok(LoadOutcome::Loaded { items: loaded })
    }

    /// Reload in the background after local state turned out to be wrong
    pub(crate) fn spawn_reload(&self) {
        let store = self.clone();
        tokio::spawn(async move {
            info!("Reconciling list from service");
            if let Err(e) = store.load_list().await {
                warn!("Background list reconciliation failed: {}", e);
            }
        });
    }

    // ---- counts ----

    /// Fetch and apply the authoritative counters now
    pub async fn refresh_counts(&self) -> Result<CountSnapshot> {
        let remote = self.inner.service.counts().await?;
        let counts = {
            let mut state = self.state();
            if state.bulk_in_progress || self.inner.mutations.has_any_in_flight() {
                debug!("Actions in flight, keeping optimistic counts");
                return Ok(state.counts.snapshot());
            }
            state.counts.reconcile(remote);
            state.counts.snapshot()
        };
        self.emit(StoreEvent::CountsChanged {
            counts: counts.clone(),
        });
        Ok(counts)
    }

    /// Reconcile counters once the debounce window passes without new triggers
    ///
    /// Server counts only replace local ones while nothing is in flight; the
    /// last action to settle schedules the reconcile that catches up.
    pub(crate) fn schedule_reconcile(&self) {
        let ticket = {
            let mut state = self.state();
            // A newer trigger always supersedes the pending one
            let ticket = state.counts.next_reconcile_ticket();
            if state.bulk_in_progress {
                debug!("Skipping count reconcile while a bulk run is in progress");
                return;
            }
            if self.inner.mutations.has_any_in_flight() {
                debug!("Skipping count reconcile while actions are in flight");
                return;
            }
            ticket
        };

        let store = self.clone();
        let delay = self.inner.config.reconcile_debounce();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let state = store.state();
                if !state.counts.is_latest_ticket(ticket) {
                    return;
                }
                if state.bulk_in_progress || store.inner.mutations.has_any_in_flight() {
                    debug!("Actions started before reconcile fired, skipping");
                    return;
                }
            }

            let remote = match store.inner.service.counts().await {
                Ok(remote) => remote,
                Err(e) => {
                    warn!("Count reconcile failed: {}", e);
                    return;
                }
            };

            let counts = {
                let mut state = store.state();
                if state.bulk_in_progress
                    || store.inner.mutations.has_any_in_flight()
                    || !state.counts.is_latest_ticket(ticket)
                {
                    debug!("Discarding reconciled counts, state moved on");
                    return;
                }
                state.counts.reconcile(remote);
                state.counts.snapshot()
            };
            store.emit(StoreEvent::CountsChanged { counts });
        });
    }

    // ---- selection & prefetch ----

    /// Select an item and resolve its body
    ///
    /// Selection and the loading placeholder change immediately; the body
    /// arrives from the cache or a token-guarded fetch.
    pub fn select(&self, id: &str) -> Result<DetailRequest> {
        let plan = {
            let mut state = self.state();
            if state.index_of(id).is_none() {
                return Err(TriageError::ItemNotFound(id.to_string()));
            }
            self.select_locked(&mut state, Some(id.to_string()))
        };
        self.emit(StoreEvent::SelectionChanged {
            selected_id: Some(id.to_string()),
        });
        Ok(self.start_detail(plan))
    }

    pub fn clear_selection(&self) {
        {
            let mut state = self.state();
            self.select_locked(&mut state, None);
        }
        self.emit(StoreEvent::SelectionChanged { selected_id: None });
    }

    pub(crate) fn select_locked(&self, state: &mut StoreState, id: Option<String>) -> DetailPlan {
        let id = id.filter(|id| state.index_of(id).is_some());
        let Some(id) = id else {
            state.coordinator.invalidate(InterestKey::Detail);
            state.selection = Selection::default();
            return DetailPlan::Cleared;
        };

        let neighbor = next_remaining(&state.visible_ids(), &id, |_| true)
            .filter(|neighbor| !state.cache.contains_fresh(neighbor));
        state.selection.selected_id = Some(id.clone());

        if let Some(entry) = state.cache.get(&id) {
            debug!("Detail for {} served from cache", id);
            state.coordinator.invalidate(InterestKey::Detail);
            state.selection.detail = DetailState::Ready(entry);
            return DetailPlan::Cached { neighbor };
        }

        let token = state.coordinator.begin_interest(InterestKey::Detail);
        state.selection.detail = DetailState::Loading;
        DetailPlan::Fetch {
            id,
            token,
            neighbor,
        }
    }

    pub(crate) fn start_detail(&self, plan: DetailPlan) -> DetailRequest {
        match plan {
            DetailPlan::Cleared => DetailRequest { handle: None },
            DetailPlan::Cached { neighbor } => {
                if let Some(neighbor) = neighbor {
                    self.prefetch(vec![neighbor]);
                }
                DetailRequest { handle: None }
            }
            DetailPlan::Fetch {
                id,
                token,
                neighbor,
            } => {
                let store = self.clone();
                let handle = tokio::spawn(async move {
                    let result = store.inner.service.detail(&id).await;
                    store.finish_detail(token, &id, result);
                });
                self.state()
                    .coordinator
                    .attach(&token, handle.abort_handle());

                if let Some(neighbor) = neighbor {
                    self.prefetch(vec![neighbor]);
                }
                DetailRequest {
                    handle: Some(handle),
                }
            }
        }
    }

    fn finish_detail(&self, token: RequestToken, id: &str, result: Result<DetailBody>) {
        let mut state = self.state();
        if !state.coordinator.is_current(&token) {
            debug!("Discarding stale detail result for {}", id);
            return;
        }

        match result {
            Ok(body) => {
                state.cache.insert(id, body);
                match state.cache.get(id) {
                    Some(entry) => state.selection.detail = DetailState::Ready(entry),
                    None => state.selection.detail = DetailState::Failed("expired".into()),
                }
                drop(state);
                self.emit(StoreEvent::DetailReady { id: id.to_string() });
            }
            Err(e) if e.is_cancellation() => {}
            Err(e) => {
                warn!("Detail fetch for {} failed: {}", id, e);
                state.selection.detail = DetailState::Failed(e.to_string());
                drop(state);
                if e.is_not_found() {
                    self.spawn_reload();
                }
                self.emit(StoreEvent::Error { error: e });
            }
        }
    }

    /// Pointer rests on `id`; prefetch it once the dwell delay passes
    ///
    /// Each call replaces the previous not-yet-fired timer.
    pub fn hover(&self, id: &str) {
        let token = {
            let mut state = self.state();
            state.coordinator.cancel_previous(InterestKey::HoverTimer);

            let selected = state.selection.selected_id.as_deref() == Some(id);
            if selected || state.cache.contains_fresh(id) {
                state.coordinator.invalidate(InterestKey::HoverTimer);
                return;
            }
            state.coordinator.begin_interest(InterestKey::HoverTimer)
        };

        let store = self.clone();
        let id = id.to_string();
        let delay = self.inner.config.hover_prefetch_delay();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_hovered = store.state().coordinator.is_current(&token);
            if still_hovered {
                store.prefetch(vec![id]);
            }
        });
        self.state()
            .coordinator
            .attach(&token, handle.abort_handle());
    }

    /// Pointer left the list; drop any pending hover timer
    pub fn hover_end(&self) {
        self.state()
            .coordinator
            .invalidate(InterestKey::HoverTimer);
    }

    /// Warm the detail cache for `ids`, one fetch at a time
    ///
    /// Only one prefetch task runs at a time. A request for the same ids as the
    /// running task is coalesced; anything else aborts the running task.
    /// Results are always written to the cache.
    pub fn prefetch(&self, ids: Vec<String>) -> Option<JoinHandle<()>> {
        let (token, ids) = {
            let mut state = self.state();
            let mut seen = HashSet::new();
            let ids: Vec<String> = ids
                .into_iter()
                .filter(|id| seen.insert(id.clone()))
                .filter(|id| !state.cache.contains_fresh(id))
                .collect();
            if ids.is_empty() {
                return None;
            }

            if state.coordinator.has_in_flight(InterestKey::Prefetch) && state.prefetch_targets == ids
            {
                debug!("Prefetch for {:?} already running, coalesced", ids);
                return None;
            }

            let token = state.coordinator.begin_interest(InterestKey::Prefetch);
            state.prefetch_targets = ids.clone();
            (token, ids)
        };

        let store = self.clone();
        let handle = tokio::spawn(async move {
            for id in ids {
                if store.state().cache.contains_fresh(&id) {
                    continue;
                }
                match store.inner.service.detail(&id).await {
                    Ok(body) => {
                        debug!("Prefetched detail for {}", id);
                        store.state().cache.insert(&id, body);
                    }
                    Err(e) if e.is_cancellation() => return,
                    Err(e) => debug!("Prefetch for {} failed: {}", id, e),
                }
            }
        });
        self.state()
            .coordinator
            .attach(&token, handle.abort_handle());
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_next_remaining_prefers_next_then_previous() {
        let before = ids(&["a", "b", "c", "d"]);
        assert_eq!(next_remaining(&before, "b", |id| id != "b"), Some("c".into()));
        assert_eq!(
            next_remaining(&before, "b", |id| id != "b" && id != "c" && id != "d"),
            Some("a".into())
        );
        assert_eq!(next_remaining(&before, "d", |id| id != "d"), Some("c".into()));
        assert_eq!(next_remaining(&before, "a", |_| false), None);
        assert_eq!(next_remaining(&before, "zz", |_| true), None);
    }
}
