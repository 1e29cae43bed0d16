//! Settings, presets, undo history, recent files and their persistence.

mod change;
mod error;
mod history;
mod persist;
mod presets;
mod recent;
mod store;
mod types;

pub use change::SettingsChange;
pub use error::StoreError;
pub use history::UndoHistory;
pub use persist::{
    create_persistence, default_settings_path, load_state, write_atomic, PersistHandle,
    PersistWriter, PersistedState,
};
pub use presets::{builtin_presets, is_builtin_preset, DEFAULT_PRESET};
pub use recent::{RecentFiles, MAX_RECENT_FILES};
pub use store::ConfigStore;
pub use types::{
    Anchor, ConversionOptions, Preset, RecentFileEntry, Settings, Theme, TiffCompression,
    WatermarkConfig,
};
