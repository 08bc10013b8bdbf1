//! Bulk execution
//!
//! Runs one action over many ids in fixed-size batches. Calls inside a batch
//! run concurrently; the next batch starts only after every call of the
//! current batch settled. Failures are isolated per id and aggregated into a
//! single retryable outcome.

use std::future::Future;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::sync::mutation::attempt_with_override;
use crate::types::error::{Result, TriageError};
use crate::types::{MutateMode, TriageAction};

/// One id to act on plus the label shown if it fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkTarget {
    pub id: String,
    pub label: String,
}

impl BulkTarget {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Progress for a running bulk action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkProgress {
    pub run_id: Uuid,
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    pub id: String,
    pub label: String,
    pub error: TriageError,
}

/// Aggregated result of a bulk run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub run_id: Uuid,
    pub success_ids: Vec<String>,
    pub failed_ids: Vec<String>,
    pub failed_details: Vec<BulkFailure>,
}

impl BulkOutcome {
    pub fn empty() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            success_ids: Vec::new(),
            failed_ids: Vec::new(),
            failed_details: Vec::new(),
        }
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed_ids.is_empty()
    }

    pub fn total(&self) -> usize {
        self.success_ids.len() + self.failed_ids.len()
    }

    pub fn record_failure(&mut self, target: &BulkTarget, error: TriageError) {
        self.failed_ids.push(target.id.clone());
        self.failed_details.push(BulkFailure {
            id: target.id.clone(),
            label: target.label.clone(),
            error,
        });
    }
}

/// Decides whether a bulk invocation must wait for explicit confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationGate {
    threshold: usize,
}

impl ConfirmationGate {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    /// Applies per invocation; earlier runs do not count toward the threshold
    pub fn requires_confirmation(&self, action: &TriageAction, count: usize) -> bool {
        action.is_gated() && count >= self.threshold
    }
}

#[derive(Debug, Clone)]
pub struct BulkExecutor {
    batch_size: usize,
    min_visible: Duration,
}

impl BulkExecutor {
    pub fn new(batch_size: usize, min_visible: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            min_visible,
        }
    }

    /// Run `action_fn` for every target
    ///
    /// `on_progress` fires after each settled id. Assign conflicts are retried
    /// once in override mode. If the whole run finishes faster than the
    /// minimum visible duration, the call holds until it has elapsed.
    pub async fn run<F, Fut, P>(
        &self,
        targets: Vec<BulkTarget>,
        action: &TriageAction,
        action_fn: F,
        mut on_progress: P,
    ) -> BulkOutcome
    where
        F: Fn(String, MutateMode) -> Fut,
        Fut: Future<Output = Result<()>>,
        P: FnMut(BulkProgress),
    {
        let mut outcome = BulkOutcome::empty();
        if targets.is_empty() {
            return outcome;
        }

        let started = Instant::now();
        let total = targets.len();
        let run_id = outcome.run_id;
        info!(
            "Starting bulk {} over {} items (run {}, batch size {})",
            action, total, run_id, self.batch_size
        );

        let action_fn = &action_fn;
        let mut results: Vec<Option<Result<()>>> = vec![None; total];
        let mut settled = 0;

        for (batch_index, batch) in targets.chunks(self.batch_size).enumerate() {
            let offset = batch_index * self.batch_size;
            debug!(
                "Bulk run {} batch {} ({} items)",
                run_id,
                batch_index + 1,
                batch.len()
            );

            let mut pending: FuturesUnordered<_> = batch
                .iter()
                .enumerate()
                .map(|(position, target)| async move {
                    let result = attempt_with_override(&target.id, action, |mode| {
                        action_fn(target.id.clone(), mode)
                    })
                    .await;
                    (offset + position, result)
                })
                .collect();

            while let Some((index, result)) = pending.next().await {
                if let Err(e) = &result {
                    warn!("Bulk {} failed for {}: {}", action, targets[index].id, e);
                }
                results[index] = Some(result);
                settled += 1;
                on_progress(BulkProgress {
                    run_id,
                    current: settled,
                    total,
                });
            }
        }

        for (target, result) in targets.iter().zip(results) {
            match result {
                Some(Ok(())) => outcome.success_ids.push(target.id.clone()),
                Some(Err(e)) => outcome.record_failure(target, e),
                None => outcome.record_failure(target, TriageError::Other("not attempted".into())),
            }
        }

        let elapsed = started.elapsed();
        if elapsed < self.min_visible {
            tokio::time::sleep(self.min_visible - elapsed).await;
        }

        info!(
            "Bulk {} finished: {} succeeded, {} failed",
            action,
            outcome.success_ids.len(),
            outcome.failed_ids.len()
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn targets(n: usize) -> Vec<BulkTarget> {
        (0..n)
            .map(|i| BulkTarget::new(format!("t-{i}"), format!("Subject {i}")))
            .collect()
    }

    fn executor() -> BulkExecutor {
        BulkExecutor::new(3, Duration::from_millis(300))
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Start(String),
        End(String),
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_bound_concurrency_and_run_sequentially() {
        let outstanding = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let log = Mutex::new(Vec::new());

        let outcome = executor()
            .run(
                targets(10),
                &TriageAction::Archive,
                |id, _| {
                    let outstanding = &outstanding;
                    let peak = &peak;
                    let log = &log;
                    async move {
                        let now = outstanding.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        log.lock().unwrap().push(Event::Start(id.clone()));
                        // Uneven latency so settlement order differs from issue order
                        let n: u64 = id.trim_start_matches("t-").parse().unwrap();
                        tokio::time::sleep(Duration::from_millis(10 + (n % 3) * 7)).await;
                        log.lock().unwrap().push(Event::End(id));
                        outstanding.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                |_| {},
            )
            .await;

        assert_eq!(outcome.success_ids.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 3);

        let log = log.into_inner().unwrap();
        let position = |event: Event| log.iter().position(|e| *e == event).unwrap();
        let ids: Vec<String> = (0..10).map(|i| format!("t-{i}")).collect();
        let batches: Vec<&[String]> = ids.chunks(3).collect();
        for pair in batches.windows(2) {
            let last_end = pair[0]
                .iter()
                .map(|id| position(Event::End(id.clone())))
                .max()
                .unwrap();
            let first_start = pair[1]
                .iter()
                .map(|id| position(Event::Start(id.clone())))
                .min()
                .unwrap();
            assert!(last_end < first_start, "next batch started before previous settled");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_is_isolated() {
        let outcome = executor()
            .run(
                targets(5),
                &TriageAction::Mute,
                |id, _| async move {
                    if id == "t-2" {
                        Err(TriageError::Service("timeout".into()))
                    } else {
                        Ok(())
                    }
                },
                |_| {},
            )
            .await;

        assert_eq!(outcome.success_ids, vec!["t-0", "t-1", "t-3", "t-4"]);
        assert_eq!(outcome.failed_ids, vec!["t-2"]);
        assert_eq!(outcome.failed_details[0].label, "Subject 2");
        assert!(!outcome.is_complete_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_after_each_settlement() {
        let mut seen = Vec::new();
        executor()
            .run(
                targets(4),
                &TriageAction::SetWaiting,
                |_, _| async { Ok(()) },
                |progress| seen.push((progress.current, progress.total)),
            )
            .await;

        assert_eq!(seen, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_run_is_held_for_min_visible_duration() {
        let started = Instant::now();
        let outcome = executor()
            .run(targets(2), &TriageAction::Archive, |_, _| async { Ok(()) }, |_| {})
            .await;

        assert!(outcome.is_complete_success());
        assert!(outcome.failed_details.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_run_is_not_extended() {
        let started = Instant::now();
        executor()
            .run(
                targets(1),
                &TriageAction::Archive,
                |_, _| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(())
                },
                |_| {},
            )
            .await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_assign_conflict_retried_with_override_per_id() {
        let action = TriageAction::Assign {
            assignee_id: "u-1".into(),
        };
        let outcome = executor()
            .run(
                targets(3),
                &action,
                |id, mode| async move {
                    match (id.as_str(), mode) {
                        ("t-1", MutateMode::Normal) => Err(TriageError::Conflict("u-2".into())),
                        ("t-2", _) => Err(TriageError::Conflict("u-3".into())),
                        _ => Ok(()),
                    }
                },
                |_| {},
            )
            .await;

        assert_eq!(outcome.success_ids, vec!["t-0", "t-1"]);
        assert_eq!(outcome.failed_ids, vec!["t-2"]);
    }

    #[test]
    fn test_confirmation_gate_boundary() {
        let gate = ConfirmationGate::new(10);
        assert!(!gate.requires_confirmation(&TriageAction::Archive, 9));
        assert!(gate.requires_confirmation(&TriageAction::Archive, 10));
        assert!(gate.requires_confirmation(&TriageAction::Mute, 25));
        assert!(!gate.requires_confirmation(&TriageAction::SetWaiting, 25));
    }
}
