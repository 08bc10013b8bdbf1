//! Derived list pipeline
//!
//! Pure derivation from the canonical list, applied in order:
//! 1. view/tab membership
//! 2. query predicates supplied by the search collaborator
//! 3. focus mode (drops low urgency items, then orders by urgency rank and age)

use std::fmt;
use std::sync::Arc;

use crate::types::{Item, Urgency, View};

/// Yes/no predicate produced by the external query layer
pub type ItemPredicate = Arc<dyn Fn(&Item) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct ViewFilter {
    pub view: View,
    predicates: Vec<ItemPredicate>,
    focus_mode: bool,
}

impl fmt::Debug for ViewFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewFilter")
            .field("view", &self.view)
            .field("predicates", &self.predicates.len())
            .field("focus_mode", &self.focus_mode)
            .finish()
    }
}

impl ViewFilter {
    pub fn new(view: View) -> Self {
        Self {
            view,
            predicates: Vec::new(),
            focus_mode: false,
        }
    }

    pub fn set_predicates(&mut self, predicates: Vec<ItemPredicate>) {
        self.predicates = predicates;
    }

    pub fn set_focus_mode(&mut self, enabled: bool) {
        self.focus_mode = enabled;
    }

    pub fn focus_mode(&self) -> bool {
        self.focus_mode
    }

    /// Whether `item` survives every filtering stage
    pub fn accepts(&self, item: &Item) -> bool {
        self.view.contains(item)
            && self.predicates.iter().all(|predicate| predicate(item))
            && (!self.focus_mode || item.urgency != Urgency::Low)
    }

    /// Visible items in display order
    pub fn derive<'a>(&self, items: &'a [Item]) -> Vec<&'a Item> {
        let mut visible: Vec<&Item> = items.iter().filter(|item| self.accepts(item)).collect();
        if self.focus_mode {
            // Most urgent first, oldest first within the same rank
            visible.sort_by(|a, b| {
                a.urgency
                    .rank()
                    .cmp(&b.urgency.rank())
                    .then(a.received_at.cmp(&b.received_at))
            });
        }
        visible
    }

    /// Ids in display order
    pub fn visible_ids(&self, items: &[Item]) -> Vec<String> {
        self.derive(items)
            .into_iter()
            .map(|item| item.id.clone())
            .collect()
    }
}
