//! Types describing formats, backends and the edges between them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Closed set of backends the engine can delegate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process raster codec.
    ImageCodec,
    /// LibreOffice in headless mode.
    Office,
    /// Pandoc.
    Markup,
    /// Poppler's `pdftoppm`.
    PdfRaster,
    /// Slide export through the office engine, then rasterized.
    Presentation,
    /// FFmpeg for video and audio.
    Ffmpeg,
}

impl BackendKind {
    /// All kinds, in the default priority order.
    pub const ALL: [BackendKind; 6] = [
        BackendKind::ImageCodec,
        BackendKind::Office,
        BackendKind::Markup,
        BackendKind::PdfRaster,
        BackendKind::Presentation,
        BackendKind::Ffmpeg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::ImageCodec => "image_codec",
            BackendKind::Office => "office",
            BackendKind::Markup => "markup",
            BackendKind::PdfRaster => "pdf_raster",
            BackendKind::Presentation => "presentation",
            BackendKind::Ffmpeg => "ffmpeg",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown backend kind: {}", s))
    }
}

/// Broad family a format belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatCategory {
    Image,
    Document,
    Presentation,
    Video,
    Audio,
}

/// A file format, identified by its canonical lowercase extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Format(String);

impl Format {
    /// Normalizes an extension (leading dot, case, common aliases).
    pub fn new(ext: &str) -> Self {
        let lower = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        let canonical = match lower.as_str() {
            "jpeg" => "jpg",
            "tif" => "tiff",
            "htm" => "html",
            "markdown" => "md",
            other => other,
        };
        Self(canonical.to_string())
    }

    /// Format of a path, taken from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extension used when writing files of this format.
    pub fn extension(&self) -> &str {
        &self.0
    }

    pub fn category(&self) -> Option<FormatCategory> {
        match self.0.as_str() {
            "png" | "jpg" | "webp" | "bmp" | "gif" | "tiff" | "ico" => Some(FormatCategory::Image),
            "docx" | "doc" | "odt" | "txt" | "md" | "html" | "rtf" | "epub" | "tex" | "rst"
            | "pdf" => Some(FormatCategory::Document),
            "pptx" | "ppt" | "odp" | "ppsx" | "pps" => Some(FormatCategory::Presentation),
            "mp4" | "mkv" | "avi" | "mov" | "webm" | "flv" | "wmv" | "m4v" | "3gp" => {
                Some(FormatCategory::Video)
            }
            "mp3" | "wav" | "flac" | "ogg" | "m4a" | "aac" | "wma" | "opus" => {
                Some(FormatCategory::Audio)
            }
            _ => None,
        }
    }

    /// Whether one file of this format can hold several pages or frames.
    pub fn is_multi_frame_container(&self) -> bool {
        matches!(self.0.as_str(), "tiff" | "gif" | "pdf")
    }

    /// Whether the in-process codec can decode and re-encode this format.
    pub fn is_raster(&self) -> bool {
        matches!(
            self.0.as_str(),
            "png" | "jpg" | "webp" | "bmp" | "gif" | "tiff" | "ico"
        )
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Format {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Conversion options a backend honours on a given edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKey {
    Quality,
    Dpi,
    Resolution,
    Fps,
    VideoCodec,
    AudioCodec,
    VideoBitrate,
    AudioBitrate,
    SampleRate,
    PageRange,
    GifFps,
    TiffCompression,
}

/// A declared conversion path from one format to another through a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityEdge {
    pub input: Format,
    pub output: Format,
    pub backend: BackendKind,
    /// Options the backend honours for this pair.
    pub options: Vec<OptionKey>,
    /// The backend emits one raw artifact per selected page or frame.
    pub paged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_aliases_normalize() {
        assert_eq!(Format::new(".JPEG"), Format::new("jpg"));
        assert_eq!(Format::new("tif").as_str(), "tiff");
        assert_eq!(Format::new("Markdown").as_str(), "md");
        assert_eq!(Format::new("htm").as_str(), "html");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            Format::from_path(Path::new("/tmp/deck.PPTX")),
            Some(Format::new("pptx"))
        );
        assert_eq!(Format::from_path(Path::new("/tmp/README")), None);
    }

    #[test]
    fn test_categories() {
        assert_eq!(Format::new("pdf").category(), Some(FormatCategory::Document));
        assert_eq!(Format::new("odp").category(), Some(FormatCategory::Presentation));
        assert_eq!(Format::new("3gp").category(), Some(FormatCategory::Video));
        assert_eq!(Format::new("xyz").category(), None);
    }

    #[test]
    fn test_backend_kind_round_trip_names() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.as_str().parse::<BackendKind>().unwrap(), kind);
        }
        assert!("gimp".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_containers() {
        assert!(Format::new("tif").is_multi_frame_container());
        assert!(Format::new("gif").is_multi_frame_container());
        assert!(Format::new("pdf").is_multi_frame_container());
        assert!(!Format::new("png").is_multi_frame_container());
    }
}
