//! Back-navigation stack.

use super::model::SessionData;
use super::state::{FlowKind, Step};

/// Default cap on remembered steps.
pub const DEFAULT_HISTORY_LIMIT: usize = 64;

/// Smallest cap that still lets `go_back` unwind the longest forward path
/// of any built-in flow to its initial step. Forward paths never revisit a
/// step, so the path length is bounded by the step count.
pub fn min_history_limit() -> usize {
    FlowKind::ALL
        .iter()
        .map(|kind| kind.steps().len().saturating_sub(1))
        .max()
        .unwrap_or(1)
}

/// A prior step and the session data as it was when the step was left.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub step: Step,
    pub data: SessionData,
}

/// Stack of prior states. Never contains the current step.
#[derive(Debug, Clone)]
pub struct NavigationHistory {
    entries: Vec<HistoryEntry>,
    limit: usize,
}

impl Default for NavigationHistory {
    fn default() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl NavigationHistory {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Remember `step` with the data it was left with. Drops the oldest
    /// entry once the cap is reached.
    pub fn push(&mut self, step: Step, data: SessionData) {
        self.entries.push(HistoryEntry { step, data });
        if self.entries.len() > self.limit {
            let drain_count = self.entries.len() - self.limit;
            self.entries.drain(..drain_count);
        }
    }

    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop()
    }

    pub fn peek(&self) -> Option<&HistoryEntry> {
        self.entries.last()
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

    /// Whether going back from `current` is allowed.
    pub fn can_go_back(&self, current: Step) -> bool {
        !self.entries.is_empty() && current.is_reversible()
    }
}
