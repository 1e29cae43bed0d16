//! Built-in presets.

use super::types::{default_output_pattern, ConversionOptions, Preset, TiffCompression, WatermarkConfig};

pub const DEFAULT_PRESET: &str = "default";

fn builtin(id: &str, name: &str, options: ConversionOptions) -> Preset {
    Preset {
        id: id.to_string(),
        name: name.to_string(),
        builtin: true,
        options,
        watermark: WatermarkConfig::default(),
        output_pattern: default_output_pattern(),
    }
}

/// The fixed presets, in display order.
pub fn builtin_presets() -> Vec<Preset> {
    let base = ConversionOptions::default();
    vec![
        builtin(DEFAULT_PRESET, "Default", base.clone()),
        builtin("web", "Web", base.clone().with_quality(80).with_width(1920)),
        builtin(
            "print",
            "Print",
            base.clone()
                .with_dpi(600)
                .with_quality(100)
                .with_tiff_compression(TiffCompression::Zip),
        ),
        builtin("thumbnail", "Thumbnail", base.clone().with_width(320).with_quality(75)),
        builtin(
            "archival",
            "Archival",
            base.with_quality(100)
                .with_tiff_compression(TiffCompression::Lzw),
        ),
    ]
}

pub fn is_builtin_preset(id: &str) -> bool {
    builtin_presets().iter().any(|p| p.id == id)
}
