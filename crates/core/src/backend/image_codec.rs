//! In-process image backend built on the `image` crate.

use async_trait::async_trait;
use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, ExtendedColorType, ImageFormat};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use super::error::BackendError;
use super::locator::ToolLocator;
use super::traits::Backend;
use super::types::{
    report_progress, BackendStatus, ConversionRequest, ProgressSender, RawArtifact, RawResult,
};
use crate::capability::{BackendKind, Format};
use crate::settings::ConversionOptions;

/// Largest edge of an ICO image.
const ICO_MAX: u32 = 256;

/// Maps a canonical raster format to the codec's format.
pub(crate) fn image_format(format: &Format) -> Option<ImageFormat> {
    match format.as_str() {
        "png" => Some(ImageFormat::Png),
        "jpg" => Some(ImageFormat::Jpeg),
        "webp" => Some(ImageFormat::WebP),
        "bmp" => Some(ImageFormat::Bmp),
        "gif" => Some(ImageFormat::Gif),
        "tiff" => Some(ImageFormat::Tiff),
        "ico" => Some(ImageFormat::Ico),
        _ => None,
    }
}

/// Writes `img` to `path` in `format`, honouring JPEG quality.
pub(crate) fn save_raster(
    img: &DynamicImage,
    path: &Path,
    format: &Format,
    quality: u8,
) -> Result<(), BackendError> {
    let codec = image_format(format).ok_or_else(|| {
        BackendError::codec(format!("{} is not a raster format", format))
    })?;

    match codec {
        ImageFormat::Jpeg => {
            let rgb = img.to_rgb8();
            let mut writer = BufWriter::new(File::create(path)?);
            JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100)).encode(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )?;
        }
        ImageFormat::Ico if img.width() > ICO_MAX || img.height() > ICO_MAX => {
            img.resize(ICO_MAX, ICO_MAX, FilterType::Lanczos3)
                .save_with_format(path, codec)?;
        }
        _ => img.save_with_format(path, codec)?,
    }
    Ok(())
}

/// Applies the requested width/height, keeping aspect ratio when only one
/// side is set.
pub(crate) fn resize(img: DynamicImage, options: &ConversionOptions) -> DynamicImage {
    let (w, h) = (img.width().max(1), img.height().max(1));
    match (options.width, options.height) {
        (Some(width), Some(height)) => img.resize_exact(width, height, FilterType::Lanczos3),
        (Some(width), None) => {
            let height = ((h as f64) * (width as f64) / (w as f64)).round().max(1.0) as u32;
            img.resize_exact(width, height, FilterType::Lanczos3)
        }
        (None, Some(height)) => {
            let width = ((w as f64) * (height as f64) / (h as f64)).round().max(1.0) as u32;
            img.resize_exact(width, height, FilterType::Lanczos3)
        }
        (None, None) => img,
    }
}

/// Decodes every frame of an animated GIF.
fn decode_gif_frames(path: &Path) -> Result<Vec<DynamicImage>, BackendError> {
    let decoder = GifDecoder::new(BufReader::new(File::open(path)?))?;
    let frames = decoder.into_frames().collect_frames()?;
    Ok(frames
        .into_iter()
        .map(|frame| DynamicImage::ImageRgba8(frame.into_buffer()))
        .collect())
}

fn run_blocking(
    request: ConversionRequest,
    progress: ProgressSender,
) -> Result<RawResult, BackendError> {
    if request.input.as_str() != "gif" {
        if !request.selection.is_all() {
            // Still-image sources have exactly one frame.
            request.selection.resolve(1)?;
        }
        let img = image::open(&request.source)?;
        let target = request.artifact_path(None);
        save_raster(
            &resize(img, &request.options),
            &target,
            &request.output,
            request.options.quality,
        )?;
        report_progress(&progress, 1.0);
        return Ok(RawResult::single(target, request.output));
    }

    let frames = decode_gif_frames(&request.source)?;
    let indices = request.selection.resolve(frames.len() as u32)?;
    let mut artifacts = Vec::with_capacity(indices.len());

    for (done, index) in indices.iter().enumerate() {
        if request.cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        let frame = frames[(*index - 1) as usize].clone();
        let target = request.artifact_path(Some(*index));
        save_raster(
            &resize(frame, &request.options),
            &target,
            &request.output,
            request.options.quality,
        )?;
        artifacts.push(RawArtifact {
            path: target,
            format: request.output.clone(),
            index: Some(*index),
        });
        report_progress(&progress, (done + 1) as f32 / indices.len() as f32);
    }

    Ok(RawResult { artifacts })
}

/// Native raster conversion running on the blocking thread pool.
#[derive(Debug, Default)]
pub struct ImageCodecBackend;

impl ImageCodecBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Backend for ImageCodecBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ImageCodec
    }

    async fn detect(&self, _locator: &ToolLocator) -> BackendStatus {
        BackendStatus::builtin(BackendKind::ImageCodec, "image 0.25")
    }

    async fn convert(
        &self,
        _status: &BackendStatus,
        request: &ConversionRequest,
        progress: ProgressSender,
    ) -> Result<RawResult, BackendError> {
        if image_format(&request.output).is_none() {
            return Err(BackendError::Unsupported {
                input: request.input.clone(),
                output: request.output.clone(),
            });
        }
        if request.cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        let request = request.clone();
        tokio::task::spawn_blocking(move || run_blocking(request, progress))
            .await
            .map_err(|e| BackendError::codec(format!("image worker panicked: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::PageSelection;
    use crate::testing::fixtures;
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::{Delay, Frame, ImageBuffer, Rgba, RgbImage};
    use tokio::sync::mpsc;

    fn write_png(path: &Path, w: u32, h: u32) {
        RgbImage::from_pixel(w, h, image::Rgb([200, 10, 10]))
            .save(path)
            .unwrap();
    }

    fn write_gif(path: &Path, frames: u8) {
        let file = File::create(path).unwrap();
        let mut encoder = GifEncoder::new(file);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        for i in 0..frames {
            let buffer = ImageBuffer::from_pixel(8, 8, Rgba([i * 20, 0, 0, 255]));
            encoder
                .encode_frame(Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(100, 1)))
                .unwrap();
        }
    }

    fn request_in(dir: &Path, source: &Path, input: &str, output: &str) -> ConversionRequest {
        let mut request = fixtures::request(source.to_str().unwrap(), input, output);
        request.staging_dir = dir.to_path_buf();
        request
    }

    #[tokio::test]
    async fn test_png_to_jpg_with_width() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("photo.png");
        write_png(&source, 40, 20);

        let mut request = request_in(dir.path(), &source, "png", "jpg");
        request.options.width = Some(20);
        let (tx, _rx) = mpsc::channel(8);

        let backend = ImageCodecBackend::new();
        let status = BackendStatus::builtin(BackendKind::ImageCodec, "test");
        let result = backend.convert(&status, &request, tx).await.unwrap();

        let artifact = result.artifacts.first().unwrap();
        assert_eq!(artifact.path, dir.path().join("photo.jpg"));
        let out = image::open(&artifact.path).unwrap();
        assert_eq!((out.width(), out.height()), (20, 10));
    }

    #[tokio::test]
    async fn test_gif_frames_follow_selection() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("anim.gif");
        write_gif(&source, 4);

        let mut request = request_in(dir.path(), &source, "gif", "png");
        request.selection = PageSelection::parse("2-3", true).unwrap();
        let (tx, _rx) = mpsc::channel(8);

        let status = BackendStatus::builtin(BackendKind::ImageCodec, "test");
        let result = ImageCodecBackend::new()
            .convert(&status, &request, tx)
            .await
            .unwrap();

        let indices: Vec<_> = result.artifacts.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![Some(3), Some(2)]);
        assert!(dir.path().join("anim_page_3.png").is_file());
    }

    #[tokio::test]
    async fn test_frame_beyond_extent() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("anim.gif");
        write_gif(&source, 2);

        let mut request = request_in(dir.path(), &source, "gif", "png");
        request.selection = PageSelection::parse("1,5", false).unwrap();
        let (tx, _rx) = mpsc::channel(8);

        let status = BackendStatus::builtin(BackendKind::ImageCodec, "test");
        let err = ImageCodecBackend::new()
            .convert(&status, &request, tx)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::PageOutOfRange(_)));
    }

    #[test]
    fn test_ico_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icon.ico");
        let img = DynamicImage::new_rgba8(512, 300);
        save_raster(&img, &path, &Format::new("ico"), 90).unwrap();
        let out = image::open(&path).unwrap();
        assert!(out.width() <= ICO_MAX && out.height() <= ICO_MAX);
    }

    #[test]
    fn test_resize_keeps_aspect() {
        let img = DynamicImage::new_rgb8(100, 50);
        let options = ConversionOptions {
            height: Some(10),
            ..Default::default()
        };
        let out = resize(img, &options);
        assert_eq!((out.width(), out.height()), (20, 10));
    }
}
