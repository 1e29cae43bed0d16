//! The capability matrix and backend resolution.

use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

use super::types::{BackendKind, CapabilityEdge, Format, OptionKey};

/// Errors raised while resolving a conversion path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    /// No edge exists for the pair.
    #[error("Unsupported conversion: {input} -> {output}")]
    UnsupportedConversion { input: Format, output: Format },
}

const IMAGE_INPUTS: &[&str] = &["png", "jpg", "webp", "bmp", "gif", "tiff", "ico"];
const IMAGE_OUTPUTS: &[&str] = &["png", "jpg", "webp", "bmp", "gif", "tiff", "ico", "pdf"];
const OFFICE_DOC_INPUTS: &[&str] = &["docx", "doc", "odt", "rtf", "txt", "html"];
const OFFICE_DOC_OUTPUTS: &[&str] = &["pdf", "docx", "odt", "rtf", "txt", "html"];
const SLIDE_INPUTS: &[&str] = &["pptx", "ppt", "odp", "ppsx", "pps"];
const OFFICE_SLIDE_OUTPUTS: &[&str] = &["pdf", "pptx", "odp"];
const SLIDE_IMAGE_OUTPUTS: &[&str] = &["png", "jpg", "tiff", "gif"];
const MARKUP_INPUTS: &[&str] = &["md", "txt", "html", "rst", "tex", "epub", "docx", "odt", "rtf"];
const MARKUP_OUTPUTS: &[&str] = &["md", "txt", "html", "docx", "odt", "rtf", "epub", "tex", "pdf"];
const PDF_RASTER_OUTPUTS: &[&str] = &["png", "jpg", "tiff", "gif"];
const VIDEO_INPUTS: &[&str] = &["mp4", "mkv", "avi", "mov", "webm", "flv", "wmv", "m4v", "3gp"];
const VIDEO_OUTPUTS: &[&str] = &["mp4", "webm", "mkv", "avi", "mov", "gif"];
const AUDIO_INPUTS: &[&str] = &[
    "mp3", "wav", "flac", "ogg", "m4a", "aac", "wma", "opus", "mp4", "mkv", "avi", "mov", "webm",
    "flv",
];
const AUDIO_OUTPUTS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a", "aac", "opus"];

/// Static matrix of conversion edges with a configurable backend priority.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    edges: Vec<CapabilityEdge>,
    priority: Vec<BackendKind>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CapabilityRegistry {
    /// Creates an empty registry with the default priority order.
    pub fn empty() -> Self {
        Self {
            edges: Vec::new(),
            priority: BackendKind::ALL.to_vec(),
        }
    }

    /// Creates the registry with every built-in edge.
    pub fn builtin() -> Self {
        use OptionKey::*;

        let mut registry = Self::empty();
        registry.add_matrix(
            BackendKind::ImageCodec,
            IMAGE_INPUTS,
            IMAGE_OUTPUTS,
            &[Quality, Resolution, PageRange, GifFps, TiffCompression],
            true,
        );
        registry.add_matrix(
            BackendKind::Office,
            OFFICE_DOC_INPUTS,
            OFFICE_DOC_OUTPUTS,
            &[],
            false,
        );
        registry.add_matrix(
            BackendKind::Office,
            SLIDE_INPUTS,
            OFFICE_SLIDE_OUTPUTS,
            &[],
            false,
        );
        registry.add_matrix(BackendKind::Markup, MARKUP_INPUTS, MARKUP_OUTPUTS, &[], false);
        registry.add_matrix(
            BackendKind::PdfRaster,
            &["pdf"],
            PDF_RASTER_OUTPUTS,
            &[Quality, Dpi, PageRange, GifFps, TiffCompression],
            true,
        );
        registry.add_matrix(
            BackendKind::Presentation,
            SLIDE_INPUTS,
            SLIDE_IMAGE_OUTPUTS,
            &[Quality, Dpi, PageRange, GifFps, TiffCompression],
            true,
        );
        registry.add_matrix(
            BackendKind::Ffmpeg,
            VIDEO_INPUTS,
            VIDEO_OUTPUTS,
            &[Resolution, Fps, VideoCodec, AudioCodec, VideoBitrate, AudioBitrate, GifFps],
            false,
        );
        registry.add_matrix(
            BackendKind::Ffmpeg,
            AUDIO_INPUTS,
            AUDIO_OUTPUTS,
            &[AudioCodec, AudioBitrate, SampleRate],
            false,
        );
        registry
    }

    /// Replaces the backend priority order.
    ///
    /// Kinds missing from `priority` rank after the listed ones, in their
    /// default order.
    pub fn with_priority(mut self, priority: Vec<BackendKind>) -> Self {
        let mut order: Vec<BackendKind> = Vec::with_capacity(BackendKind::ALL.len());
        for kind in priority.into_iter().chain(BackendKind::ALL) {
            if !order.contains(&kind) {
                order.push(kind);
            }
        }
        self.priority = order;
        self
    }

    pub fn priority(&self) -> &[BackendKind] {
        &self.priority
    }

    /// Registers an edge. Identical edges are ignored.
    pub fn add_edge(&mut self, edge: CapabilityEdge) {
        let exists = self.edges.iter().any(|e| {
            e.input == edge.input && e.output == edge.output && e.backend == edge.backend
        });
        if !exists {
            self.edges.push(edge);
        }
    }

    fn add_matrix(
        &mut self,
        backend: BackendKind,
        inputs: &[&str],
        outputs: &[&str],
        options: &[OptionKey],
        paged: bool,
    ) {
        for input in inputs {
            for output in outputs {
                if input == output {
                    continue;
                }
                self.add_edge(CapabilityEdge {
                    input: Format::new(input),
                    output: Format::new(output),
                    backend,
                    options: options.to_vec(),
                    paged,
                });
            }
        }
    }

    pub fn edges(&self) -> &[CapabilityEdge] {
        &self.edges
    }

    /// Every input format with at least one edge.
    pub fn input_formats(&self) -> BTreeSet<Format> {
        self.edges.iter().map(|e| e.input.clone()).collect()
    }

    /// Output formats reachable from `input` through any backend.
    pub fn reachable(&self, input: &Format) -> BTreeSet<Format> {
        self.edges
            .iter()
            .filter(|e| &e.input == input)
            .map(|e| e.output.clone())
            .collect()
    }

    /// All edges for a pair, best priority first.
    pub fn candidates(&self, input: &Format, output: &Format) -> Vec<&CapabilityEdge> {
        let mut candidates: Vec<&CapabilityEdge> = self
            .edges
            .iter()
            .filter(|e| &e.input == input && &e.output == output)
            .collect();
        candidates.sort_by_key(|e| self.rank(e.backend));
        candidates
    }

    /// Picks the edge for a pair by priority alone.
    pub fn resolve_backend(
        &self,
        input: &Format,
        output: &Format,
    ) -> Result<CapabilityEdge, CapabilityError> {
        self.resolve(input, output, &HashSet::new())
    }

    /// Picks the edge for a pair.
    ///
    /// Among candidates, the best-ranked backend in `confirmed` wins. With no
    /// confirmed candidate, the best-ranked edge is returned and availability
    /// is checked at dispatch.
    pub fn resolve(
        &self,
        input: &Format,
        output: &Format,
        confirmed: &HashSet<BackendKind>,
    ) -> Result<CapabilityEdge, CapabilityError> {
        let candidates = self.candidates(input, output);
        candidates
            .iter()
            .find(|e| confirmed.contains(&e.backend))
            .or_else(|| candidates.first())
            .map(|e| (*e).clone())
            .ok_or_else(|| CapabilityError::UnsupportedConversion {
                input: input.clone(),
                output: output.clone(),
            })
    }

    fn rank(&self, kind: BackendKind) -> usize {
        self.priority
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(self.priority.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(s: &str) -> Format {
        Format::new(s)
    }

    #[test]
    fn test_reachable_from_pptx() {
        let registry = CapabilityRegistry::builtin();
        let outputs = registry.reachable(&f("pptx"));
        for expected in ["pdf", "png", "jpg", "tiff", "gif", "odp"] {
            assert!(outputs.contains(&f(expected)), "missing {}", expected);
        }
        assert!(!outputs.contains(&f("pptx")));
    }

    #[test]
    fn test_docx_to_pdf_prefers_office() {
        let registry = CapabilityRegistry::builtin();
        let edge = registry.resolve_backend(&f("docx"), &f("pdf")).unwrap();
        assert_eq!(edge.backend, BackendKind::Office);
    }

    #[test]
    fn test_confirmed_backend_wins_over_priority() {
        let registry = CapabilityRegistry::builtin();
        let confirmed: HashSet<_> = [BackendKind::Markup].into_iter().collect();
        let edge = registry.resolve(&f("docx"), &f("pdf"), &confirmed).unwrap();
        assert_eq!(edge.backend, BackendKind::Markup);
    }

    #[test]
    fn test_custom_priority() {
        let registry =
            CapabilityRegistry::builtin().with_priority(vec![BackendKind::Markup]);
        assert_eq!(registry.priority()[0], BackendKind::Markup);
        assert_eq!(registry.priority().len(), BackendKind::ALL.len());
        let edge = registry.resolve_backend(&f("odt"), &f("pdf")).unwrap();
        assert_eq!(edge.backend, BackendKind::Markup);
    }

    #[test]
    fn test_unsupported_pair() {
        let registry = CapabilityRegistry::builtin();
        let err = registry.resolve_backend(&f("mp3"), &f("docx")).unwrap_err();
        assert_eq!(
            err,
            CapabilityError::UnsupportedConversion {
                input: f("mp3"),
                output: f("docx"),
            }
        );
    }

    #[test]
    fn test_resolution_is_deterministic_for_every_edge() {
        let registry = CapabilityRegistry::builtin();
        for edge in registry.edges() {
            let first = registry.resolve_backend(&edge.input, &edge.output).unwrap();
            let second = registry.resolve_backend(&edge.input, &edge.output).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_image_to_pdf_is_paged_assembly() {
        let registry = CapabilityRegistry::builtin();
        let edge = registry.resolve_backend(&f("png"), &f("pdf")).unwrap();
        assert_eq!(edge.backend, BackendKind::ImageCodec);
        assert!(edge.paged);
    }
}
