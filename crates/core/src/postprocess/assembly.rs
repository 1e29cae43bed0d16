//! Multi-page and multi-frame container assembly.

use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{Delay, DynamicImage, ExtendedColorType, Frame, RgbImage};
use printpdf::{ColorBits, ColorSpace, Image, ImageTransform, ImageXObject, Mm, PdfDocument, Px};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tiff::encoder::colortype;
use tiff::encoder::compression::{Deflate, Lzw, Uncompressed};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

use super::PostProcessError;
use crate::backend::RawArtifact;
use crate::capability::Format;
use crate::settings::{ConversionOptions, TiffCompression};

fn assembly_err(e: impl ToString) -> PostProcessError {
    PostProcessError::Assembly(e.to_string())
}

fn load_pages(artifacts: &[RawArtifact]) -> Result<Vec<DynamicImage>, PostProcessError> {
    artifacts
        .iter()
        .map(|a| {
            image::open(&a.path)
                .map_err(|e| assembly_err(format!("{}: {}", a.path.display(), e)))
        })
        .collect()
}

/// Whether the raw artifacts have to be combined into `target`.
pub fn needs_assembly(target: &Format, artifacts: &[RawArtifact]) -> bool {
    target.is_multi_frame_container()
        && (artifacts.len() > 1 || artifacts.iter().any(|a| &a.format != target))
}

/// Writes `artifacts`, in order, into one `target` container at `out`.
pub fn assemble(
    artifacts: &[RawArtifact],
    target: &Format,
    options: &ConversionOptions,
    out: &Path,
) -> Result<(), PostProcessError> {
    if artifacts.is_empty() {
        return Err(assembly_err("no pages to assemble"));
    }
    let pages = load_pages(artifacts)?;

    match target.as_str() {
        "tiff" => write_tiff(&pages, options.tiff_compression, options.quality, out),
        "gif" => write_gif(&pages, options.gif_fps, out),
        "pdf" => write_pdf(&pages, options.dpi, out),
        other => Err(assembly_err(format!("{} is not a container format", other))),
    }
}

/// Multi-page TIFF, one directory per page.
pub fn write_tiff(
    pages: &[DynamicImage],
    compression: TiffCompression,
    quality: u8,
    out: &Path,
) -> Result<(), PostProcessError> {
    let file = BufWriter::new(File::create(out)?);
    let mut encoder = TiffEncoder::new(file).map_err(assembly_err)?;

    for page in pages {
        let rgb = page.to_rgb8();
        let (w, h) = rgb.dimensions();
        match compression {
            TiffCompression::None => encoder
                .write_image_with_compression::<colortype::RGB8, _>(w, h, Uncompressed, rgb.as_raw())
                .map_err(assembly_err)?,
            TiffCompression::Lzw => encoder
                .write_image_with_compression::<colortype::RGB8, _>(w, h, Lzw, rgb.as_raw())
                .map_err(assembly_err)?,
            TiffCompression::Zip => encoder
                .write_image_with_compression::<colortype::RGB8, _>(
                    w,
                    h,
                    Deflate::default(),
                    rgb.as_raw(),
                )
                .map_err(assembly_err)?,
            TiffCompression::Jpeg => write_jpeg_page(&mut encoder, &rgb, quality)?,
        }
    }
    Ok(())
}

/// One JPEG-compressed page stored as a single strip.
fn write_jpeg_page<W: std::io::Write + std::io::Seek>(
    encoder: &mut TiffEncoder<W>,
    rgb: &RgbImage,
    quality: u8,
) -> Result<(), PostProcessError> {
    let (w, h) = rgb.dimensions();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
        .map_err(assembly_err)?;

    let mut dir = encoder.new_directory().map_err(assembly_err)?;
    dir.write_tag(Tag::ImageWidth, w).map_err(assembly_err)?;
    dir.write_tag(Tag::ImageLength, h).map_err(assembly_err)?;
    dir.write_tag(Tag::BitsPerSample, &[8u16, 8, 8][..])
        .map_err(assembly_err)?;
    // 7 = JPEG, 2 = RGB
    dir.write_tag(Tag::Compression, 7u16).map_err(assembly_err)?;
    dir.write_tag(Tag::PhotometricInterpretation, 2u16)
        .map_err(assembly_err)?;
    dir.write_tag(Tag::SamplesPerPixel, 3u16).map_err(assembly_err)?;
    dir.write_tag(Tag::RowsPerStrip, h).map_err(assembly_err)?;

    let offset = dir.write_data(&jpeg[..]).map_err(assembly_err)?;
    let offset = u32::try_from(offset).map_err(assembly_err)?;
    dir.write_tag(Tag::StripOffsets, offset).map_err(assembly_err)?;
    dir.write_tag(Tag::StripByteCounts, jpeg.len() as u32)
        .map_err(assembly_err)?;
    dir.finish().map_err(assembly_err)
}

/// Looping animated GIF at `fps` frames per second.
///
/// Frames are scaled to the first frame's size.
pub fn write_gif(pages: &[DynamicImage], fps: u8, out: &Path) -> Result<(), PostProcessError> {
    let fps = fps.clamp(1, 30) as u32;
    let (w, h) = (pages[0].width(), pages[0].height());

    let file = BufWriter::new(File::create(out)?);
    let mut encoder = GifEncoder::new(file);
    encoder.set_repeat(Repeat::Infinite).map_err(assembly_err)?;

    for page in pages {
        let rgba = if page.width() == w && page.height() == h {
            page.to_rgba8()
        } else {
            page.resize_exact(w, h, FilterType::Triangle).to_rgba8()
        };
        let frame = Frame::from_parts(rgba, 0, 0, Delay::from_numer_denom_ms(1000, fps));
        encoder.encode_frame(frame).map_err(assembly_err)?;
    }
    Ok(())
}

/// Pixel length in millimetres at `dpi`.
fn px_to_mm(px: u32, dpi: u32) -> f32 {
    px as f32 * 25.4 / dpi.max(1) as f32
}

/// One image per PDF page, each page sized to its image at `dpi`.
pub fn write_pdf(pages: &[DynamicImage], dpi: u32, out: &Path) -> Result<(), PostProcessError> {
    let first = &pages[0];
    let (doc, first_page, first_layer) = PdfDocument::new(
        "convertino",
        Mm(px_to_mm(first.width(), dpi)),
        Mm(px_to_mm(first.height(), dpi)),
        "Layer 1",
    );

    for (index, page) in pages.iter().enumerate() {
        let (page_ref, layer_ref) = if index == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(
                Mm(px_to_mm(page.width(), dpi)),
                Mm(px_to_mm(page.height(), dpi)),
                "Layer 1",
            )
        };
        let layer = doc.get_page(page_ref).get_layer(layer_ref);

        let rgb = page.to_rgb8();
        let (w, h) = rgb.dimensions();
        let image = Image::from(ImageXObject {
            width: Px(w as usize),
            height: Px(h as usize),
            color_space: ColorSpace::Rgb,
            bits_per_component: ColorBits::Bit8,
            interpolate: true,
            image_data: rgb.into_raw(),
            image_filter: None,
            clipping_bbox: None,
            smask: None,
        });
        image.add_to_layer(
            layer,
            ImageTransform {
                dpi: Some(dpi as f32),
                ..Default::default()
            },
        );
    }

    let mut writer = BufWriter::new(File::create(out)?);
    doc.save(&mut writer).map_err(assembly_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifDecoder;
    use image::{AnimationDecoder, Rgb};
    use std::io::BufReader;

    fn page(shade: u8, w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([shade, shade, shade])))
    }

    fn artifact(path: &Path, format: &str, index: u32) -> RawArtifact {
        RawArtifact {
            path: path.to_path_buf(),
            format: Format::new(format),
            index: Some(index),
        }
    }

    #[test]
    fn test_needs_assembly() {
        let png = artifact(Path::new("/s/a_page_1.png"), "png", 1);
        let tiff = RawArtifact {
            format: Format::new("tiff"),
            ..png.clone()
        };
        assert!(needs_assembly(&Format::new("tiff"), &[png.clone()]));
        assert!(!needs_assembly(&Format::new("tiff"), &[tiff.clone()]));
        assert!(needs_assembly(&Format::new("tiff"), &[tiff.clone(), tiff]));
        assert!(!needs_assembly(&Format::new("png"), &[png.clone(), png]));
    }

    #[test]
    fn test_gif_frame_order_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("anim.gif");
        let pages = vec![page(10, 16, 16), page(200, 16, 16), page(90, 32, 8)];
        write_gif(&pages, 5, &out).unwrap();

        let decoder = GifDecoder::new(BufReader::new(File::open(&out).unwrap())).unwrap();
        let frames = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].buffer().dimensions(), (16, 16));
        assert!(frames[0].buffer().get_pixel(0, 0).0[0] < frames[1].buffer().get_pixel(0, 0).0[0]);
        let (numer, denom) = frames[0].delay().numer_denom_ms();
        assert_eq!(numer / denom, 200);
    }

    #[test]
    fn test_tiff_pages_for_each_compression() {
        let dir = tempfile::tempdir().unwrap();
        let pages = vec![page(10, 20, 10), page(240, 20, 10)];

        for compression in [
            TiffCompression::None,
            TiffCompression::Lzw,
            TiffCompression::Zip,
            TiffCompression::Jpeg,
        ] {
            let out = dir.path().join(format!("doc_{:?}.tiff", compression));
            write_tiff(&pages, compression, 90, &out).unwrap();

            let mut decoder =
                tiff::decoder::Decoder::new(BufReader::new(File::open(&out).unwrap())).unwrap();
            let mut count = 1;
            while decoder.more_images() {
                decoder.next_image().unwrap();
                count += 1;
            }
            assert_eq!(count, 2, "{:?}", compression);
        }
    }

    #[test]
    fn test_pdf_written() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("pages.pdf");
        write_pdf(&[page(0, 30, 40), page(255, 40, 30)], 150, &out).unwrap();
        let bytes = std::fs::read(&out).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_assemble_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifacts = Vec::new();
        for i in 1..=3 {
            let path = dir.path().join(format!("s_page_{}.png", i));
            page(i as u8 * 50, 8, 8).save(&path).unwrap();
            artifacts.push(artifact(&path, "png", i));
        }
        let out = dir.path().join("s.gif");
        assemble(&artifacts, &Format::new("gif"), &ConversionOptions::default(), &out).unwrap();
        assert!(out.is_file());

        let err = assemble(&artifacts, &Format::new("png"), &ConversionOptions::default(), &out)
            .unwrap_err();
        assert!(matches!(err, PostProcessError::Assembly(_)));
    }

    #[test]
    fn test_px_to_mm() {
        assert!((px_to_mm(300, 300) - 25.4).abs() < 1e-4);
    }
}
