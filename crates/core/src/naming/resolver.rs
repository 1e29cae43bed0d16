//! Collision-safe destination resolution.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Largest numeric suffix tried before giving up.
pub const MAX_DISAMBIGUATOR: u32 = 9999;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("No free destination for {path} after {attempts} attempts")]
    Exhausted { path: PathBuf, attempts: u32 },
}

/// How a job lays out its final files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// One file at the destination.
    Single,
    /// One file, or several `<stem>_page_<n>` siblings.
    Paged,
}

/// Reserves destination paths for one batch.
///
/// Resolution runs on a single task before dispatch; paths handed out are
/// remembered so two jobs never receive the same destination.
#[derive(Debug, Default)]
pub struct DestinationResolver {
    reserved: HashSet<PathBuf>,
}

impl DestinationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves an expanded template under `dir` to a free path.
    pub fn resolve(
        &mut self,
        dir: &Path,
        expanded: &str,
        extension: &str,
        layout: OutputLayout,
    ) -> Result<PathBuf, NamingError> {
        let relative = sanitize_relative(expanded);
        let base_dir = match relative.parent() {
            Some(parent) => dir.join(parent),
            None => dir.to_path_buf(),
        };
        let stem = relative
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());

        for attempt in 0..=MAX_DISAMBIGUATOR {
            let candidate_stem = if attempt == 0 {
                stem.clone()
            } else {
                format!("{}_{}", stem, attempt)
            };
            let candidate = base_dir.join(format!("{}.{}", candidate_stem, extension));
            if self.is_free(&candidate, &candidate_stem, extension, layout) {
                self.reserved.insert(candidate.clone());
                return Ok(candidate);
            }
        }

        Err(NamingError::Exhausted {
            path: base_dir.join(format!("{}.{}", stem, extension)),
            attempts: MAX_DISAMBIGUATOR + 1,
        })
    }

    /// Number of paths reserved so far.
    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }

    fn is_free(&self, candidate: &Path, stem: &str, extension: &str, layout: OutputLayout) -> bool {
        if self.reserved.contains(candidate) || candidate.exists() {
            return false;
        }
        if layout == OutputLayout::Paged {
            return !has_page_siblings(candidate, stem, extension);
        }
        true
    }
}

/// Path of page `index` for a paged destination.
pub fn page_destination(destination: &Path, index: u32) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match destination.extension() {
        Some(ext) => format!("{}_page_{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}_page_{}", stem, index),
    };
    destination.with_file_name(name)
}

fn has_page_siblings(candidate: &Path, stem: &str, extension: &str) -> bool {
    let Some(parent) = candidate.parent() else {
        return false;
    };
    let Ok(entries) = std::fs::read_dir(parent) else {
        return false;
    };
    let prefix = format!("{}_page_", stem);
    let suffix = format!(".{}", extension);
    entries.flatten().any(|entry| {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        name.starts_with(&prefix) && name.ends_with(&suffix)
    })
}

/// Keeps only normal components so a template cannot escape the output dir.
fn sanitize_relative(expanded: &str) -> PathBuf {
    let normalized = expanded.replace('\\', "/");
    Path::new(&normalized)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_os_string()),
            _ => None,
        })
        .collect()
}
