//! Text watermark overlay.

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, GrayImage, Luma, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::{Path, PathBuf};

use super::PostProcessError;
use crate::backend::{save_raster, RawArtifact};
use crate::settings::{Anchor, WatermarkConfig};

/// Fonts tried when no font path is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Loads the configured font or the first system font that exists.
pub fn load_font(path: Option<&Path>) -> Result<FontVec, PostProcessError> {
    let candidates: Vec<PathBuf> = match path {
        Some(path) => vec![path.to_path_buf()],
        None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
    };

    let path = candidates
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| PostProcessError::Watermark("no usable font found".to_string()))?;
    let bytes = std::fs::read(&path)?;
    FontVec::try_from_vec(bytes)
        .map_err(|e| PostProcessError::Watermark(format!("{}: {}", path.display(), e)))
}

/// Top-left corner of a `text` box inside an `image` box.
pub(crate) fn anchor_origin(anchor: Anchor, image: (u32, u32), text: (u32, u32)) -> (i32, i32) {
    let (w, h) = (image.0 as i32, image.1 as i32);
    let (tw, th) = (text.0 as i32, text.1 as i32);
    let margin = ((w.min(h) as f32) * 0.02).max(4.0) as i32;

    let (x, y) = match anchor {
        Anchor::TopLeft => (margin, margin),
        Anchor::TopRight => (w - tw - margin, margin),
        Anchor::BottomLeft => (margin, h - th - margin),
        Anchor::BottomRight => (w - tw - margin, h - th - margin),
        Anchor::Center => ((w - tw) / 2, (h - th) / 2),
    };
    (x.max(0), y.max(0))
}

/// Blends `color` into `img` wherever `mask` has coverage.
pub(crate) fn composite(img: &mut RgbaImage, mask: &GrayImage, color: [u8; 3], opacity: u8) {
    let opacity = opacity.min(100) as f32 / 100.0;
    for (x, y, coverage) in mask.enumerate_pixels() {
        if coverage.0[0] == 0 {
            continue;
        }
        let alpha = coverage.0[0] as f32 / 255.0 * opacity;
        let pixel = img.get_pixel_mut(x, y);
        for c in 0..3 {
            let base = pixel.0[c] as f32;
            pixel.0[c] = (base + (color[c] as f32 - base) * alpha).round() as u8;
        }
    }
}

/// Draws the watermark onto one image.
pub fn overlay(img: &DynamicImage, config: &WatermarkConfig, font: &FontVec) -> DynamicImage {
    let mut canvas = img.to_rgba8();
    let scale = PxScale::from(config.font_size.max(1.0));
    let text_box = text_size(scale, font, &config.text);
    let (x, y) = anchor_origin(config.anchor, canvas.dimensions(), text_box);

    let mut mask = GrayImage::new(canvas.width(), canvas.height());
    draw_text_mut(&mut mask, Luma([255]), x, y, scale, font, &config.text);
    composite(&mut canvas, &mask, config.color, config.opacity);

    DynamicImage::ImageRgba8(canvas)
}

/// Watermarks every raster artifact in place.
///
/// Non-raster artifacts are left untouched.
pub fn apply(
    artifacts: &[RawArtifact],
    config: &WatermarkConfig,
    quality: u8,
) -> Result<(), PostProcessError> {
    let raster: Vec<_> = artifacts.iter().filter(|a| a.format.is_raster()).collect();
    if raster.len() < artifacts.len() {
        tracing::debug!(
            skipped = artifacts.len() - raster.len(),
            "Watermark skipped for non-raster artifacts"
        );
    }
    if raster.is_empty() {
        return Ok(());
    }

    let font = load_font(config.font_path.as_deref())?;
    for artifact in raster {
        let img = image::open(&artifact.path)
            .map_err(|e| PostProcessError::Watermark(e.to_string()))?;
        let marked = overlay(&img, config, &font);
        save_raster(&marked, &artifact.path, &artifact.format, quality)
            .map_err(|e| PostProcessError::Watermark(e.to_string()))?;
    }
    Ok(())
}
