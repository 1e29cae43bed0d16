//! Settings, options and presets.
//!
//! Every field carries a serde default so that files written by older or
//! newer versions load cleanly: missing keys take defaults, unknown keys are
//! ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::capability::{BackendKind, Format};

/// Compression applied when assembling TIFF containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiffCompression {
    None,
    #[default]
    Lzw,
    Jpeg,
    Zip,
}

/// Option values passed to backends and post-processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    /// Lossy quality, 1-100.
    pub quality: u8,
    /// Raster resolution for page rendering.
    pub dpi: u32,
    /// Target width; aspect ratio kept when height is unset.
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Video frame rate.
    pub fps: Option<u32>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    /// Bitrates in ffmpeg notation, e.g. "192k".
    pub video_bitrate: Option<String>,
    pub audio_bitrate: Option<String>,
    pub sample_rate: Option<u32>,
    /// Frame rate of assembled GIFs, 1-30.
    pub gif_fps: u8,
    /// Width of GIFs rendered from video.
    pub gif_width: u32,
    pub tiff_compression: TiffCompression,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            quality: 95,
            dpi: 300,
            width: None,
            height: None,
            fps: None,
            video_codec: None,
            audio_codec: None,
            video_bitrate: None,
            audio_bitrate: None,
            sample_rate: None,
            gif_fps: 10,
            gif_width: 480,
            tiff_compression: TiffCompression::Lzw,
        }
    }
}

impl ConversionOptions {
    /// Returns a copy with every value clamped into its valid range.
    pub fn normalized(&self) -> Self {
        let mut options = self.clone();
        options.quality = options.quality.clamp(1, 100);
        options.dpi = options.dpi.clamp(36, 2400);
        options.gif_fps = options.gif_fps.clamp(1, 30);
        options.gif_width = options.gif_width.max(16);
        options
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_gif_fps(mut self, fps: u8) -> Self {
        self.gif_fps = fps;
        self
    }

    pub fn with_tiff_compression(mut self, compression: TiffCompression) -> Self {
        self.tiff_compression = compression;
        self
    }
}

/// Where the watermark is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    pub enabled: bool,
    pub text: String,
    /// 0-100.
    pub opacity: u8,
    pub anchor: Anchor,
    /// Glyph height in pixels.
    pub font_size: f32,
    /// TrueType/OpenType font; a system font is used when unset.
    pub font_path: Option<PathBuf>,
    /// RGB text colour.
    pub color: [u8; 3],
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            text: String::new(),
            opacity: 50,
            anchor: Anchor::BottomRight,
            font_size: 32.0,
            font_path: None,
            color: [255, 255, 255],
        }
    }
}

impl WatermarkConfig {
    /// Whether there is anything to draw.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.text.trim().is_empty() && self.opacity > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

/// A named bundle of option values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub builtin: bool,
    #[serde(default)]
    pub options: ConversionOptions,
    #[serde(default)]
    pub watermark: WatermarkConfig,
    #[serde(default = "default_output_pattern")]
    pub output_pattern: String,
}

/// A recently converted source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentFileEntry {
    pub path: PathBuf,
    pub format: Format,
    pub timestamp: DateTime<Utc>,
}

/// The full current configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where outputs are written; the source's directory when unset.
    pub output_dir: Option<PathBuf>,
    pub output_pattern: String,
    pub active_preset: String,
    pub options: ConversionOptions,
    pub watermark: WatermarkConfig,
    pub page_range: String,
    pub reverse_pages: bool,
    pub backend_paths: BTreeMap<BackendKind, PathBuf>,
    pub archive_outputs: bool,
    pub delete_sources: bool,
    pub theme: Theme,
    pub custom_presets: Vec<Preset>,
}

pub(crate) fn default_output_pattern() -> String {
    "{filename}".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: None,
            output_pattern: default_output_pattern(),
            active_preset: "default".to_string(),
            options: ConversionOptions::default(),
            watermark: WatermarkConfig::default(),
            page_range: String::new(),
            reverse_pages: false,
            backend_paths: BTreeMap::new(),
            archive_outputs: false,
            delete_sources: false,
            theme: Theme::System,
            custom_presets: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_take_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"output_pattern": "{date}"}"#).unwrap();
        assert_eq!(settings.output_pattern, "{date}");
        assert_eq!(settings.options.quality, 95);
        assert_eq!(settings.active_preset, "default");
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let settings: Settings =
            serde_json::from_str(r#"{"theme": "dark", "window_geometry": [1, 2, 3]}"#).unwrap();
        assert_eq!(settings.theme, Theme::Dark);
    }

    #[test]
    fn test_backend_paths_keyed_by_kind() {
        let mut settings = Settings::default();
        settings
            .backend_paths
            .insert(BackendKind::Ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["backend_paths"]["ffmpeg"], "/opt/ffmpeg/bin/ffmpeg");
    }

    #[test]
    fn test_options_normalized() {
        let options = ConversionOptions {
            quality: 0,
            gif_fps: 60,
            ..Default::default()
        }
        .normalized();
        assert_eq!(options.quality, 1);
        assert_eq!(options.gif_fps, 30);
    }

    #[test]
    fn test_watermark_activity() {
        let mut watermark = WatermarkConfig::default();
        assert!(!watermark.is_active());
        watermark.enabled = true;
        watermark.text = "DRAFT".to_string();
        assert!(watermark.is_active());
        watermark.opacity = 0;
        assert!(!watermark.is_active());
    }
}
