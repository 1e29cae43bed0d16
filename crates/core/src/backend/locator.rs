//! Executable lookup and version probing.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::types::{BackendStatus, LocationSource};
use crate::capability::BackendKind;

/// Longest version string kept from a probe.
const MAX_VERSION_CHARS: usize = 100;

/// Time allowed for a version probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Finds backend executables.
///
/// Order: configured override, bundled directory, conventional install
/// locations, then `PATH`.
#[derive(Debug, Clone, Default)]
pub struct ToolLocator {
    overrides: HashMap<BackendKind, PathBuf>,
    bundled_dir: Option<PathBuf>,
}

impl ToolLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bundled_dir(mut self, dir: PathBuf) -> Self {
        self.bundled_dir = Some(dir);
        self
    }

    pub fn with_override(mut self, kind: BackendKind, path: PathBuf) -> Self {
        self.overrides.insert(kind, path);
        self
    }

    /// Sets or clears an override. Returns whether anything changed.
    pub fn set_override(&mut self, kind: BackendKind, path: Option<PathBuf>) -> bool {
        match path {
            Some(path) => self.overrides.insert(kind, path.clone()) != Some(path),
            None => self.overrides.remove(&kind).is_some(),
        }
    }

    pub fn override_for(&self, kind: BackendKind) -> Option<&PathBuf> {
        self.overrides.get(&kind)
    }

    /// Override used when locating `kind`'s primary executable.
    ///
    /// A backend that drives another backend's binary inherits that
    /// backend's configured path unless it has its own.
    pub fn effective_override(&self, kind: BackendKind) -> Option<&PathBuf> {
        self.overrides
            .get(&kind)
            .or_else(|| shared_binary_owner(kind).and_then(|owner| self.overrides.get(&owner)))
    }

    pub fn overrides(&self) -> BTreeMap<BackendKind, PathBuf> {
        self.overrides
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    /// Locates the primary executable for `kind`, trying each of `names`.
    pub fn locate(&self, kind: BackendKind, names: &[&str]) -> Option<(PathBuf, LocationSource)> {
        if let Some(path) = self.effective_override(kind) {
            // A configured path is authoritative: never fall back silently.
            return path
                .is_file()
                .then(|| (path.clone(), LocationSource::Override));
        }

        if let Some(bundled) = &self.bundled_dir {
            for name in names {
                if let Some(path) = bundled_candidates(bundled, kind, name)
                    .into_iter()
                    .find(|p| p.is_file())
                {
                    return Some((path, LocationSource::Bundled));
                }
            }
        }

        for name in names {
            if let Some(path) = conventional_locations(name).into_iter().find(|p| p.is_file()) {
                return Some((path, LocationSource::Conventional));
            }
        }

        for name in names {
            if let Ok(path) = which::which(name) {
                return Some((path, LocationSource::SystemPath));
            }
        }

        None
    }

    /// Finds a helper executable next to `primary`, then on `PATH`.
    pub fn companion(&self, primary: &Path, name: &str) -> Option<PathBuf> {
        let file_name = format!("{}{}", name, std::env::consts::EXE_SUFFIX);
        primary
            .parent()
            .map(|dir| dir.join(&file_name))
            .filter(|p| p.is_file())
            .or_else(|| which::which(name).ok())
    }

    /// Locates and version-probes a tool, producing a full status.
    pub async fn detect_tool(
        &self,
        kind: BackendKind,
        names: &[&str],
        version_args: &[&str],
    ) -> BackendStatus {
        let Some((path, source)) = self.locate(kind, names) else {
            let reason = match self.effective_override(kind) {
                Some(path) => format!("configured path {} does not exist", path.display()),
                None => format!("{} not found", names.join(" / ")),
            };
            return BackendStatus::unavailable(kind, reason);
        };

        let version = probe_version(&path, version_args).await;
        debug!(backend = %kind, path = %path.display(), ?version, "Located backend");

        BackendStatus {
            kind,
            available: true,
            path: Some(path),
            source: Some(source),
            version,
            companions: BTreeMap::new(),
            error: None,
            checked_at: chrono::Utc::now(),
        }
    }
}

/// Runs `path <arg>` and returns the first non-empty output line.
pub async fn probe_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = timeout(
        PROBE_TIMEOUT,
        Command::new(path)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .ok()?
    .ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    first_line(&stdout).or_else(|| first_line(&stderr))
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(MAX_VERSION_CHARS).collect())
}

/// Backend whose executable `kind` runs as its primary tool.
fn shared_binary_owner(kind: BackendKind) -> Option<BackendKind> {
    match kind {
        BackendKind::Presentation => Some(BackendKind::Office),
        _ => None,
    }
}

/// Backends whose detection reads `kind`'s configured path.
pub fn dependents_of(kind: BackendKind) -> &'static [BackendKind] {
    match kind {
        // Slides are exported with soffice, then rasterized with pdftoppm.
        BackendKind::Office | BackendKind::PdfRaster => &[BackendKind::Presentation],
        _ => &[],
    }
}

fn tool_dir_name(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Ffmpeg => "ffmpeg",
        BackendKind::Office | BackendKind::Presentation => "libreoffice",
        BackendKind::Markup => "pandoc",
        BackendKind::PdfRaster => "poppler",
        BackendKind::ImageCodec => "image",
    }
}

fn bundled_candidates(root: &Path, kind: BackendKind, name: &str) -> Vec<PathBuf> {
    let exe = format!("{}{}", name, std::env::consts::EXE_SUFFIX);
    let base = root.join(tool_dir_name(kind)).join(std::env::consts::OS);
    vec![
        base.join(&exe),
        base.join("bin").join(&exe),
        base.join("program").join(&exe),
    ]
}

fn conventional_locations(name: &str) -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut paths: Vec<PathBuf> = match name {
        "soffice" | "libreoffice" => vec![
            "/usr/bin/soffice".into(),
            "/usr/bin/libreoffice".into(),
            "/usr/local/bin/soffice".into(),
            "/snap/bin/libreoffice".into(),
            "/opt/libreoffice/program/soffice".into(),
            "/Applications/LibreOffice.app/Contents/MacOS/soffice".into(),
            r"C:\Program Files\LibreOffice\program\soffice.exe".into(),
            r"C:\Program Files (x86)\LibreOffice\program\soffice.exe".into(),
        ],
        "ffmpeg" => vec![
            "/usr/bin/ffmpeg".into(),
            "/usr/local/bin/ffmpeg".into(),
            "/opt/homebrew/bin/ffmpeg".into(),
            r"C:\ffmpeg\bin\ffmpeg.exe".into(),
        ],
        "pandoc" => vec![
            "/usr/bin/pandoc".into(),
            "/usr/local/bin/pandoc".into(),
            "/opt/homebrew/bin/pandoc".into(),
            r"C:\Program Files\Pandoc\pandoc.exe".into(),
        ],
        "pdftoppm" => vec![
            "/usr/bin/pdftoppm".into(),
            "/usr/local/bin/pdftoppm".into(),
            "/opt/homebrew/bin/pdftoppm".into(),
        ],
        _ => Vec::new(),
    };
    if let Some(home) = home {
        paths.push(home.join(".local").join("bin").join(name));
    }
    paths
}
