//! The configuration store: current settings, undo history, recent files.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::change::SettingsChange;
use super::error::StoreError;
use super::history::UndoHistory;
use super::persist::{load_state, PersistHandle, PersistedState};
use super::presets::builtin_presets;
use super::recent::RecentFiles;
use super::types::{Preset, RecentFileEntry, Settings};
use crate::capability::Format;

/// Single owner of settings mutation.
///
/// Every change is pushed as a new snapshot on the history, and the full
/// state is handed to the writer task when one is attached.
pub struct ConfigStore {
    history: UndoHistory,
    recent: RecentFiles,
    history_limit: usize,
    persist_history: bool,
    persistence: Option<PersistHandle>,
}

impl ConfigStore {
    pub fn new(settings: Settings, history_limit: usize) -> Self {
        Self {
            history: UndoHistory::new(settings, history_limit),
            recent: RecentFiles::new(),
            history_limit,
            persist_history: true,
            persistence: None,
        }
    }

    /// Loads the store from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load(path: &Path, history_limit: usize, persist_history: bool) -> Self {
        let state = match load_state(path) {
            Ok(Some(state)) => {
                debug!(path = %path.display(), "Loaded settings");
                state
            }
            Ok(None) => {
                debug!(path = %path.display(), "No settings file, using defaults");
                PersistedState::default()
            }
            Err(e) => {
                warn!(error = %e, "Falling back to default settings");
                PersistedState::default()
            }
        };
        Self::from_state(state, history_limit, persist_history)
    }

    /// Rebuilds a store from persisted state.
    ///
    /// A stored history is reused only when its current snapshot matches the
    /// stored settings.
    pub fn from_state(state: PersistedState, history_limit: usize, persist_history: bool) -> Self {
        let history = state
            .history
            .filter(|_| persist_history)
            .and_then(|h| h.restored(history_limit))
            .filter(|h| *h.current() == state.settings)
            .unwrap_or_else(|| UndoHistory::new(state.settings, history_limit));

        Self {
            history,
            recent: RecentFiles::from_entries(state.recent_files),
            history_limit,
            persist_history,
            persistence: None,
        }
    }

    pub fn with_persistence(mut self, handle: PersistHandle) -> Self {
        self.persistence = Some(handle);
        self
    }

    pub fn settings(&self) -> &Settings {
        self.history.current()
    }

    /// Applies a change, making the result the newest history entry.
    ///
    /// A rejected change leaves settings and history untouched.
    pub fn apply(&mut self, change: SettingsChange) -> Result<&Settings, StoreError> {
        let name = change.name();
        let mut next = self.history.current().clone();
        change.apply_to(&mut next)?;

        self.history.push(next);
        debug!(change = name, depth = self.history.len(), "Applied settings change");
        self.persist();
        Ok(self.history.current())
    }

    /// Steps back one snapshot; `None` when already at the oldest.
    pub fn undo(&mut self) -> Option<&Settings> {
        self.history.undo()?;
        self.persist();
        Some(self.history.current())
    }

    pub fn redo(&mut self) -> Option<&Settings> {
        self.history.redo()?;
        self.persist();
        Some(self.history.current())
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Records a converted source. Does not touch the undo history.
    pub fn record(&mut self, path: impl Into<PathBuf>, format: Format) {
        self.recent.record(path, format);
        self.persist();
    }

    pub fn recent(&self) -> &[RecentFileEntry] {
        self.recent.entries()
    }

    /// Built-in presets followed by custom ones.
    pub fn presets(&self) -> Vec<Preset> {
        let mut presets = builtin_presets();
        presets.extend(self.settings().custom_presets.iter().cloned());
        presets
    }

    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            settings: self.settings().clone(),
            recent_files: self.recent.entries().to_vec(),
            history: self.persist_history.then(|| self.history.clone()),
        }
    }

    /// Waits for queued writes to land.
    pub async fn flush(&self) -> Result<(), StoreError> {
        match &self.persistence {
            Some(handle) => handle.flush().await,
            None => Ok(()),
        }
    }

    fn persist(&self) {
        if let Some(handle) = &self.persistence {
            handle.try_save(self.snapshot());
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Settings::default(), 50)
    }
}
