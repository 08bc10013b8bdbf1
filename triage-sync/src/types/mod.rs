pub mod error;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::{Result, TriageError};

/// Triage status of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Todo,
    Waiting,
    Muted,
    Snoozed,
    Done,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 5] = [
        ItemStatus::Todo,
        ItemStatus::Waiting,
        ItemStatus::Muted,
        ItemStatus::Snoozed,
        ItemStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Waiting => "waiting",
            Self::Muted => "muted",
            Self::Snoozed => "snoozed",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency rank used by focus mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    High,
    #[default]
    Normal,
    Low,
}

impl Urgency {
    /// Lower rank sorts first
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }
}

/// A triage unit (a conversation in the shared mailbox)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    /// Human label, shown in bulk failure details
    #[serde(default)]
    pub subject: String,
    pub status: ItemStatus,
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub snoozed_until: Option<DateTime<Utc>>,
}

impl Item {
    pub fn new(id: impl Into<String>, status: ItemStatus, received_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            subject: String::new(),
            status,
            assignee_id: None,
            labels: BTreeSet::new(),
            received_at,
            urgency: Urgency::Normal,
            snoozed_until: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_assignee(mut self, assignee_id: impl Into<String>) -> Self {
        self.assignee_id = Some(assignee_id.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    /// Label used when reporting failures for this item
    pub fn display_label(&self) -> String {
        if self.subject.is_empty() {
            self.id.clone()
        } else {
            self.subject.clone()
        }
    }
}

/// Status-changing commands the engine can apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriageAction {
    Archive,
    Unarchive,
    /// "Hold": park the item until someone replies
    SetWaiting,
    UnsetWaiting,
    Mute,
    Unmute,
    Assign { assignee_id: String },
    Unassign,
    Snooze { until: DateTime<Utc> },
    Unsnooze,
    AddLabel { label: String },
    RemoveLabel { label: String },
}

impl TriageAction {
    /// Action name as the remote service knows it
    pub fn name(&self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Unarchive => "unarchive",
            Self::SetWaiting => "set_waiting",
            Self::UnsetWaiting => "unset_waiting",
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::Assign { .. } => "assign",
            Self::Unassign => "unassign",
            Self::Snooze { .. } => "snooze",
            Self::Unsnooze => "unsnooze",
            Self::AddLabel { .. } => "add_label",
            Self::RemoveLabel { .. } => "remove_label",
        }
    }

    /// Only assignment has a meaningful "someone else already did it" race
    pub fn retries_on_conflict(&self) -> bool {
        matches!(self, Self::Assign { .. })
    }

    /// High blast radius actions that sit behind the bulk confirmation gate
    pub fn is_gated(&self) -> bool {
        matches!(self, Self::Archive | Self::Mute | Self::Assign { .. })
    }
}

impl fmt::Display for TriageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the remote service should treat an existing assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutateMode {
    Normal,
    /// Take over an assignment that someone else holds
    Override,
}

/// Body content of an item as returned by the detail endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailBody {
    pub body_plain: Option<String>,
    pub body_html: Option<String>,
    pub notice: Option<String>,
}

/// Tab/view the list is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum View {
    #[default]
    Todo,
    Waiting,
    Muted,
    Snoozed,
    Done,
    Assigned {
        assignee_id: String,
    },
    Label {
        label: String,
    },
    All,
}

impl View {
    /// Whether an item belongs to this view
    pub fn contains(&self, item: &Item) -> bool {
        match self {
            Self::Todo => item.status == ItemStatus::Todo,
            Self::Waiting => item.status == ItemStatus::Waiting,
            Self::Muted => item.status == ItemStatus::Muted,
            Self::Snoozed => item.status == ItemStatus::Snoozed,
            Self::Done => item.status == ItemStatus::Done,
            Self::Assigned { assignee_id } => {
                item.assignee_id.as_deref() == Some(assignee_id.as_str())
                    && item.status != ItemStatus::Done
            }
            Self::Label { label } => item.labels.contains(label) && item.status != ItemStatus::Done,
            Self::All => true,
        }
    }
}

/// List request parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    pub view: View,
    /// Opaque query string, passed through to the service untouched
    pub query: Option<String>,
    pub page_token: Option<String>,
    pub page_size: usize,
}

/// One ordered page of items
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPage {
    pub items: Vec<Item>,
    pub next_page_token: Option<String>,
}

/// Per-status aggregate counters
///
/// A status at zero has no entry, so a snapshot that spells out zeros and one
/// that omits them compare equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountSnapshot(BTreeMap<ItemStatus, u64>);

impl CountSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, status: ItemStatus) -> u64 {
        self.0.get(&status).copied().unwrap_or(0)
    }

    pub fn set(&mut self, status: ItemStatus, value: u64) {
        if value == 0 {
            self.0.remove(&status);
        } else {
            self.0.insert(status, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemStatus, u64)> + '_ {
        self.0.iter().map(|(status, count)| (*status, *count))
    }
}

impl FromIterator<(ItemStatus, u64)> for CountSnapshot {
    fn from_iter<I: IntoIterator<Item = (ItemStatus, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().filter(|(_, count)| *count > 0).collect())
    }
}

impl PartialEq for CountSnapshot {
    fn eq(&self, other: &Self) -> bool {
        ItemStatus::ALL
            .iter()
            .all(|status| self.get(*status) == other.get(*status))
    }
}

impl Eq for CountSnapshot {}
