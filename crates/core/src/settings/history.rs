//! Linear undo/redo history of settings snapshots.

use serde::{Deserialize, Serialize};

use super::types::Settings;

/// Snapshots with a cursor on the current one.
///
/// `entries[cursor]` is always the current settings, so the cursor is valid
/// whenever the history is non-empty, which it always is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoHistory {
    entries: Vec<Settings>,
    cursor: usize,
    #[serde(skip, default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

impl UndoHistory {
    /// Starts a history at `initial`, keeping at most `limit` undo steps.
    pub fn new(initial: Settings, limit: usize) -> Self {
        Self {
            entries: vec![initial],
            cursor: 0,
            limit: limit.max(1),
        }
    }

    /// Re-applies a limit after deserializing, repairing a bad cursor.
    pub(crate) fn restored(mut self, limit: usize) -> Option<Self> {
        if self.entries.is_empty() {
            return None;
        }
        self.limit = limit.max(1);
        self.cursor = self.cursor.min(self.entries.len() - 1);
        self.trim();
        Some(self)
    }

    pub fn current(&self) -> &Settings {
        &self.entries[self.cursor]
    }

    /// Makes `next` current, dropping any redo tail.
    pub fn push(&mut self, next: Settings) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(next);
        self.cursor = self.entries.len() - 1;
        self.trim();
    }

    pub fn undo(&mut self) -> Option<&Settings> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.current())
    }

    pub fn redo(&mut self) -> Option<&Settings> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.current())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Number of snapshots, the current one included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    // Oldest entries go first; the cursor moves with them.
    fn trim(&mut self) {
        let max_entries = self.limit + 1;
        if self.entries.len() > max_entries {
            let excess = self.entries.len() - max_entries;
            self.entries.drain(..excess);
            self.cursor = self.cursor.saturating_sub(excess);
        }
    }
}
