//! Per-action loading and error state.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::state::ActionName;
use crate::error::ErrorInfo;

/// Loading/error state of a single action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionState {
    pub pending: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Action name → state. Entries are independent of each other and are
/// created the first time an action starts.
#[derive(Debug, Clone, Default)]
pub struct ActionTracker {
    entries: HashMap<ActionName, ActionState>,
}

impl ActionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `action`; the default (idle, no error) if it never ran.
    pub fn state(&self, action: ActionName) -> ActionState {
        self.entries.get(&action).cloned().unwrap_or_default()
    }

    pub fn is_loading(&self, action: ActionName) -> bool {
        self.entries.get(&action).is_some_and(|s| s.pending)
    }

    pub fn error(&self, action: ActionName) -> Option<&ErrorInfo> {
        self.entries.get(&action).and_then(|s| s.error.as_ref())
    }

    /// The action currently in flight, if any.
    pub fn pending_action(&self) -> Option<ActionName> {
        self.entries
            .iter()
            .find(|(_, s)| s.pending)
            .map(|(name, _)| *name)
    }

    /// Mark `action` as started. Clears its previous error.
    pub fn start(&mut self, action: ActionName) {
        let entry = self.entries.entry(action).or_default();
        entry.pending = true;
        entry.error = None;
    }

    /// Mark `action` as finished successfully.
    pub fn succeed(&mut self, action: ActionName) {
        let entry = self.entries.entry(action).or_default();
        entry.pending = false;
        entry.error = None;
    }

    /// Mark `action` as failed with `error`.
    pub fn fail(&mut self, action: ActionName, error: ErrorInfo) {
        let entry = self.entries.entry(action).or_default();
        entry.pending = false;
        entry.error = Some(error);
    }

    /// Forget every entry.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Ordered copy of every entry, for snapshots.
    pub fn entries(&self) -> BTreeMap<ActionName, ActionState> {
        self.entries.iter().map(|(k, v)| (*k, v.clone())).collect()
    }
}
