//! The closed set of settings mutations.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::error::StoreError;
use super::presets::{builtin_presets, is_builtin_preset, DEFAULT_PRESET};
use super::types::{ConversionOptions, Preset, Settings, Theme, WatermarkConfig};
use crate::capability::BackendKind;

/// One user-visible change to [`Settings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettingsChange {
    SetOutputDir { path: Option<PathBuf> },
    SetOutputPattern { pattern: String },
    SetOptions { options: ConversionOptions },
    SetWatermark { watermark: WatermarkConfig },
    SetPageRange { text: String, reverse: bool },
    /// `None` clears the override and returns to automatic location.
    SetBackendPath { kind: BackendKind, path: Option<PathBuf> },
    SetArchiveOutputs { enabled: bool },
    SetDeleteSources { enabled: bool },
    SetTheme { theme: Theme },
    /// Copies a preset's values into the settings.
    SelectPreset { id: String },
    /// Saves the current values as a custom preset, replacing one with the same id.
    SavePreset { id: String, name: String },
    DeletePreset { id: String },
}

impl SettingsChange {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetOutputDir { .. } => "set_output_dir",
            Self::SetOutputPattern { .. } => "set_output_pattern",
            Self::SetOptions { .. } => "set_options",
            Self::SetWatermark { .. } => "set_watermark",
            Self::SetPageRange { .. } => "set_page_range",
            Self::SetBackendPath { .. } => "set_backend_path",
            Self::SetArchiveOutputs { .. } => "set_archive_outputs",
            Self::SetDeleteSources { .. } => "set_delete_sources",
            Self::SetTheme { .. } => "set_theme",
            Self::SelectPreset { .. } => "select_preset",
            Self::SavePreset { .. } => "save_preset",
            Self::DeletePreset { .. } => "delete_preset",
        }
    }

    /// Applies the change to `settings` in place.
    pub(crate) fn apply_to(self, settings: &mut Settings) -> Result<(), StoreError> {
        match self {
            Self::SetOutputDir { path } => settings.output_dir = path,
            Self::SetOutputPattern { pattern } => settings.output_pattern = pattern,
            Self::SetOptions { options } => settings.options = options.normalized(),
            Self::SetWatermark { watermark } => {
                settings.watermark = WatermarkConfig {
                    opacity: watermark.opacity.min(100),
                    ..watermark
                }
            }
            Self::SetPageRange { text, reverse } => {
                settings.page_range = text;
                settings.reverse_pages = reverse;
            }
            Self::SetBackendPath { kind, path } => match path {
                Some(path) => {
                    settings.backend_paths.insert(kind, path);
                }
                None => {
                    settings.backend_paths.remove(&kind);
                }
            },
            Self::SetArchiveOutputs { enabled } => settings.archive_outputs = enabled,
            Self::SetDeleteSources { enabled } => settings.delete_sources = enabled,
            Self::SetTheme { theme } => settings.theme = theme,
            Self::SelectPreset { id } => {
                let preset = find_preset(settings, &id)
                    .ok_or_else(|| StoreError::UnknownPreset(id.clone()))?;
                settings.options = preset.options;
                settings.watermark = preset.watermark;
                settings.output_pattern = preset.output_pattern;
                settings.active_preset = id;
            }
            Self::SavePreset { id, name } => {
                if is_builtin_preset(&id) {
                    return Err(StoreError::BuiltinPreset(id));
                }
                let preset = Preset {
                    id: id.clone(),
                    name,
                    builtin: false,
                    options: settings.options.clone(),
                    watermark: settings.watermark.clone(),
                    output_pattern: settings.output_pattern.clone(),
                };
                match settings.custom_presets.iter_mut().find(|p| p.id == id) {
                    Some(existing) => *existing = preset,
                    None => settings.custom_presets.push(preset),
                }
                settings.active_preset = id;
            }
            Self::DeletePreset { id } => {
                if is_builtin_preset(&id) {
                    return Err(StoreError::BuiltinPreset(id));
                }
                let before = settings.custom_presets.len();
                settings.custom_presets.retain(|p| p.id != id);
                if settings.custom_presets.len() == before {
                    return Err(StoreError::UnknownPreset(id));
                }
                if settings.active_preset == id {
                    settings.active_preset = DEFAULT_PRESET.to_string();
                }
            }
        }
        Ok(())
    }
}

/// Looks a preset up among the built-ins and the settings' custom presets.
pub(crate) fn find_preset(settings: &Settings, id: &str) -> Option<Preset> {
    builtin_presets()
        .into_iter()
        .chain(settings.custom_presets.iter().cloned())
        .find(|p| p.id == id)
}
