//! Bounded undo history
//!
//! Entries are pushed only after the remote service confirmed at least one
//! success, and only for the ids that succeeded. The stack keeps the most
//! recent entries; overflow silently drops the oldest.

use std::collections::VecDeque;

use tracing::debug;

use crate::types::error::{Result, TriageError};
use crate::types::{Item, TriageAction};

/// Record sufficient to reverse one completed mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoEntry {
    Single {
        id: String,
        prior_item: Item,
        action: TriageAction,
    },
    Bulk {
        action: TriageAction,
        ids: Vec<String>,
        prior_items: Vec<Item>,
    },
}

impl UndoEntry {
    pub fn action(&self) -> &TriageAction {
        match self {
            Self::Single { action, .. } | Self::Bulk { action, .. } => action,
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::Single { id, .. } => vec![id.as_str()],
            Self::Bulk { ids, .. } => ids.iter().map(|id| id.as_str()).collect(),
        }
    }

    pub fn prior_items(&self) -> Vec<&Item> {
        match self {
            Self::Single { prior_item, .. } => vec![prior_item],
            Self::Bulk { prior_items, .. } => prior_items.iter().collect(),
        }
    }
}

/// Remote action that reverses `action`, given the item as it was before
///
/// Assignment undo hands the item back to its previous assignee when it had
/// one. Unsnooze cannot be reversed because the original wake-up time is gone.
pub fn invert(action: &TriageAction, prior: &Item) -> Result<TriageAction> {
    let inverse = match action {
        TriageAction::Archive => TriageAction::Unarchive,
        TriageAction::Unarchive => TriageAction::Archive,
        TriageAction::SetWaiting => TriageAction::UnsetWaiting,
        TriageAction::UnsetWaiting => TriageAction::SetWaiting,
        TriageAction::Mute => TriageAction::Unmute,
        TriageAction::Unmute => TriageAction::Mute,
        TriageAction::Assign { .. } => match &prior.assignee_id {
            Some(previous) => TriageAction::Assign {
                assignee_id: previous.clone(),
            },
            None => TriageAction::Unassign,
        },
        TriageAction::Unassign => match &prior.assignee_id {
            Some(previous) => TriageAction::Assign {
                assignee_id: previous.clone(),
            },
            None => {
                return Err(TriageError::UndoUnsupported(format!(
                    "{} had no assignee to restore",
                    prior.id
                )))
            }
        },
        TriageAction::Snooze { .. } => TriageAction::Unsnooze,
        TriageAction::Unsnooze => {
            return Err(TriageError::UndoUnsupported(
                "un-snoozing cannot be reversed; snooze the item again with a new time".into(),
            ))
        }
        TriageAction::AddLabel { label } => TriageAction::RemoveLabel {
            label: label.clone(),
        },
        TriageAction::RemoveLabel { label } => TriageAction::AddLabel {
            label: label.clone(),
        },
    };
    Ok(inverse)
}

#[derive(Debug)]
pub struct UndoStack {
    entries: VecDeque<UndoEntry>,
    capacity: usize,
}

impl UndoStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: UndoEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            debug!("Undo history full, dropped oldest entry");
        }
    }

    /// Most recently pushed entry
    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop_back()
    }

    pub fn peek(&self) -> Option<&UndoEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemStatus;
    use chrono::Utc;

    fn single(id: &str) -> UndoEntry {
        UndoEntry::Single {
            id: id.to_string(),
            prior_item: Item::new(id, ItemStatus::Todo, Utc::now()),
            action: TriageAction::Archive,
        }
    }

    #[test]
    fn test_pop_is_lifo() {
        let mut stack = UndoStack::new(10);
        stack.push(single("a"));
        stack.push(single("b"));

        assert_eq!(stack.pop().unwrap().ids(), vec!["b"]);
        assert_eq!(stack.pop().unwrap().ids(), vec!["a"]);
        assert!(stack.pop().is_none());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut stack = UndoStack::new(10);
        for n in 0..12 {
            stack.push(single(&format!("t-{n}")));
        }

        assert_eq!(stack.len(), 10);
        let mut remaining = Vec::new();
        while let Some(entry) = stack.pop() {
            remaining.push(entry.ids()[0].to_string());
        }
        assert_eq!(remaining.last().map(String::as_str), Some("t-2"));
        assert_eq!(remaining.first().map(String::as_str), Some("t-11"));
    }

    #[test]
    fn test_inversion_table() {
        let prior = Item::new("t-1", ItemStatus::Todo, Utc::now());
        assert_eq!(invert(&TriageAction::Archive, &prior).unwrap(), TriageAction::Unarchive);
        assert_eq!(
            invert(&TriageAction::SetWaiting, &prior).unwrap(),
            TriageAction::UnsetWaiting
        );
        assert_eq!(invert(&TriageAction::Mute, &prior).unwrap(), TriageAction::Unmute);
        assert_eq!(
            invert(&TriageAction::Snooze { until: Utc::now() }, &prior).unwrap(),
            TriageAction::Unsnooze
        );
        assert_eq!(
            invert(&TriageAction::Assign { assignee_id: "u-1".into() }, &prior).unwrap(),
            TriageAction::Unassign
        );
    }

    #[test]
    fn test_assign_undo_restores_previous_assignee() {
        let prior = Item::new("t-1", ItemStatus::Todo, Utc::now()).with_assignee("u-2");
        let inverse = invert(&TriageAction::Assign { assignee_id: "u-1".into() }, &prior).unwrap();
        assert_eq!(
            inverse,
            TriageAction::Assign {
                assignee_id: "u-2".into()
            }
        );
    }

    #[test]
    fn test_unsnooze_has_no_inverse() {
        let prior = Item::new("t-1", ItemStatus::Snoozed, Utc::now());
        let err = invert(&TriageAction::Unsnooze, &prior).unwrap_err();
        assert!(matches!(err, TriageError::UndoUnsupported(_)));
    }
}
