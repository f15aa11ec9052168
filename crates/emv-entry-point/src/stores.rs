//! Per-transaction histories shared between the entry point and kernels

use crate::outcome::{Outcome, OutcomeType};
use crate::ui::UserInterfaceRequest;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// Append-only list shared by cloning the handle
#[derive(Debug)]
pub struct History<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for History<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> History<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.items.lock().push(item);
    }

    /// Snapshot of everything recorded so far
    pub fn get(&self) -> Vec<T> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }
}

/// UI messages requested during the transaction
pub type MessageStore = History<UserInterfaceRequest>;

/// Non-final outcomes produced during the transaction
#[derive(Debug, Clone, Default)]
pub struct IntermediateOutcomeStore {
    outcomes: History<Outcome>,
}

impl IntermediateOutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome; SELECT NEXT is never kept
    pub fn add(&self, outcome: Outcome) {
        if outcome.kind() == OutcomeType::SelectNext {
            warn!("SELECT NEXT outcome not recorded as intermediate outcome");
            return;
        }
        self.outcomes.push(outcome);
    }

    pub fn get(&self) -> Vec<Outcome> {
        self.outcomes.get()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn clear(&self) {
        self.outcomes.clear();
    }
}
