//! Zip packaging of a batch's outputs.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::PostProcessError;

/// Entry names for `files`, unique within the archive.
///
/// Outputs placed in different directories may share a file name; later
/// ones get a `_N` suffix.
pub(crate) fn entry_names(files: &[PathBuf]) -> Vec<String> {
    let mut taken = HashSet::new();
    files
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "output".to_string());
            if taken.insert(name.clone()) {
                return name;
            }
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let ext = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            let mut n = 1;
            loop {
                let candidate = format!("{}_{}{}", stem, n, ext);
                if taken.insert(candidate.clone()) {
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

/// Writes `files` into a new zip at `dest`.
///
/// On failure the partial archive is removed and the inputs are untouched.
pub fn create_archive(dest: &Path, files: &[PathBuf]) -> Result<(), PostProcessError> {
    let result = write_zip(dest, files);
    if result.is_err() {
        let _ = std::fs::remove_file(dest);
    }
    result
}

fn write_zip(dest: &Path, files: &[PathBuf]) -> Result<(), PostProcessError> {
    let archive_err = |e: zip::result::ZipError| PostProcessError::Archive(e.to_string());

    let mut zip = ZipWriter::new(BufWriter::new(File::create(dest)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (path, name) in files.iter().zip(entry_names(files)) {
        zip.start_file(name, options).map_err(archive_err)?;
        let mut input = File::open(path)?;
        io::copy(&mut input, &mut zip)?;
    }

    zip.finish().map_err(archive_err)?;
    Ok(())
}
