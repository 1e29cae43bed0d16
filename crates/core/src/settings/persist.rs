//! Settings file location, loading and the single writer task.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

use super::error::StoreError;
use super::history::UndoHistory;
use super::types::{RecentFileEntry, Settings};

/// Everything written to the settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub settings: Settings,
    pub recent_files: Vec<RecentFileEntry>,
    pub history: Option<UndoHistory>,
}

/// Per-user settings file.
///
/// `$XDG_CONFIG_HOME/convertino/settings.json`, then `~/.config/...`; on
/// Windows `%APPDATA%\convertino\settings.json`.
pub fn default_settings_path() -> PathBuf {
    let base = if cfg!(windows) {
        std::env::var_os("APPDATA").map(PathBuf::from)
    } else {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .filter(|p| p.is_absolute())
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
    };
    base.unwrap_or_else(|| PathBuf::from("."))
        .join("convertino")
        .join("settings.json")
}

/// Reads the settings file. A missing file is `Ok(None)`.
pub fn load_state(path: &Path) -> Result<Option<PersistedState>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::persistence(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::persistence(path, e))
}

/// Writes the state to a sibling temp file, then renames it into place.
pub async fn write_atomic(path: &Path, state: &PersistedState) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(state).map_err(|e| StoreError::persistence(path, e))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::persistence(path, e))?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json)
        .await
        .map_err(|e| StoreError::persistence(path, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::persistence(path, e))
}

enum PersistCommand {
    /// A newer snapshot is waiting in the shared slot.
    Save,
    Flush(oneshot::Sender<()>),
}

/// Newest snapshot not yet written. A later save replaces it.
type LatestSlot = Arc<Mutex<Option<PersistedState>>>;

/// Handle for queueing settings writes.
///
/// Cheap to clone. All writes funnel into one [`PersistWriter`].
#[derive(Clone)]
pub struct PersistHandle {
    tx: mpsc::Sender<PersistCommand>,
    latest: LatestSlot,
}

impl PersistHandle {
    fn store_latest(&self, state: PersistedState) {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(state);
    }

    /// Queues a snapshot for writing.
    pub async fn save(&self, state: PersistedState) {
        self.store_latest(state);
        if let Err(e) = self.tx.send(PersistCommand::Save).await {
            tracing::error!("Failed to queue settings write: {}", e);
        }
    }

    /// Queues a snapshot without waiting.
    ///
    /// The snapshot always replaces any pending one. A full queue already
    /// holds a wake-up for the writer, so nothing is lost. Returns false
    /// only when the writer is gone.
    pub fn try_save(&self, state: PersistedState) -> bool {
        self.store_latest(state);
        match self.tx.try_send(PersistCommand::Save) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(e) => {
                tracing::warn!("Failed to queue settings write: {}", e);
                false
            }
        }
    }

    /// Waits until every snapshot saved before this call is on disk.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(PersistCommand::Flush(done_tx))
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        done_rx.await.map_err(|_| StoreError::WriterClosed)
    }
}

/// Background task that owns the settings file.
pub struct PersistWriter {
    rx: mpsc::Receiver<PersistCommand>,
    latest: LatestSlot,
    path: PathBuf,
}

impl PersistWriter {
    fn new(rx: mpsc::Receiver<PersistCommand>, latest: LatestSlot, path: PathBuf) -> Self {
        Self { rx, latest, path }
    }

    fn take_latest(&self) -> Option<PersistedState> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Writes snapshots until every handle is dropped.
    ///
    /// Saves queued back to back collapse into one write of the newest.
    pub async fn run(mut self) {
        tracing::info!(path = %self.path.display(), "Settings writer started");

        while let Some(command) = self.rx.recv().await {
            let mut waiters = Vec::new();
            let mut next = Some(command);

            while let Some(command) = next.take() {
                if let PersistCommand::Flush(done) = command {
                    waiters.push(done);
                }
                next = self.rx.try_recv().ok();
            }

            if let Some(state) = self.take_latest() {
                if let Err(e) = write_atomic(&self.path, &state).await {
                    tracing::error!("Failed to write settings: {}", e);
                }
            }
            for done in waiters {
                let _ = done.send(());
            }
        }

        tracing::info!("Settings writer shutting down");
    }
}

/// Creates the handle/writer pair.
///
/// Spawn the writer with `tokio::spawn(writer.run())`.
pub fn create_persistence(path: PathBuf, buffer_size: usize) -> (PersistHandle, PersistWriter) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    let latest: LatestSlot = Arc::new(Mutex::new(None));
    (
        PersistHandle {
            tx,
            latest: Arc::clone(&latest),
        },
        PersistWriter::new(rx, latest, path),
    )
}
