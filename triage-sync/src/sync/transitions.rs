//! Status transition table
//!
//! One exhaustive mapping from (current status, action) to the next status and
//! the forward/inverse count deltas. Inverse actions (unmute, unsnooze, unset
//! waiting, unarchive) are first-class rows, not derived from their opposites.

use crate::sync::counts::CountDelta;
use crate::types::{Item, ItemStatus, TriageAction};

/// Result of looking up one row of the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: ItemStatus,
    pub to: ItemStatus,
    pub forward: CountDelta,
    pub inverse: CountDelta,
}

impl Transition {
    pub fn changes_status(&self) -> bool {
        self.from != self.to
    }
}

/// Status an item ends up in after `action`
pub fn next_status(current: ItemStatus, action: &TriageAction) -> ItemStatus {
    use ItemStatus::*;

    match (current, action) {
        (_, TriageAction::Archive) => Done,
        (Done, TriageAction::Unarchive) => Todo,
        (_, TriageAction::SetWaiting) => Waiting,
        (Waiting, TriageAction::UnsetWaiting) => Todo,
        (_, TriageAction::Mute) => Muted,
        (Muted, TriageAction::Unmute) => Todo,
        (_, TriageAction::Snooze { .. }) => Snoozed,
        (Snoozed, TriageAction::Unsnooze) => Todo,
        // Releasing a state the item is not in leaves it where it is
        (
            status,
            TriageAction::Unarchive
            | TriageAction::UnsetWaiting
            | TriageAction::Unmute
            | TriageAction::Unsnooze,
        ) => status,
        (
            status,
            TriageAction::Assign { .. }
            | TriageAction::Unassign
            | TriageAction::AddLabel { .. }
            | TriageAction::RemoveLabel { .. },
        ) => status,
    }
}

/// Forward and inverse deltas for `action` applied at `current`
pub fn transition(current: ItemStatus, action: &TriageAction) -> Transition {
    let to = next_status(current, action);
    let forward = CountDelta::moved(current, to);
    let inverse = forward.inverse();
    Transition {
        from: current,
        to,
        forward,
        inverse,
    }
}

/// Apply `action` to the local copy of an item
pub fn apply_to_item(item: &mut Item, action: &TriageAction) {
    item.status = next_status(item.status, action);

    match action {
        TriageAction::Assign { assignee_id } => {
            item.assignee_id = Some(assignee_id.clone());
        }
        TriageAction::Unassign => {
            item.assignee_id = None;
        }
        TriageAction::Snooze { until } => {
            item.snoozed_until = Some(*until);
        }
        TriageAction::Unsnooze => {
            item.snoozed_until = None;
        }
        TriageAction::AddLabel { label } => {
            item.labels.insert(label.clone());
        }
        TriageAction::RemoveLabel { label } => {
            item.labels.remove(label);
        }
        TriageAction::Archive
        | TriageAction::Unarchive
        | TriageAction::SetWaiting
        | TriageAction::UnsetWaiting
        | TriageAction::Mute
        | TriageAction::Unmute => {}
    }
}
