//! Most-recently-used source files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::types::RecentFileEntry;
use crate::capability::Format;

pub const MAX_RECENT_FILES: usize = 10;

/// Bounded, most-recent-first list, unique by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecentFiles {
    entries: Vec<RecentFileEntry>,
}

impl RecentFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the list from persisted entries, enforcing the invariants.
    pub fn from_entries(entries: Vec<RecentFileEntry>) -> Self {
        let mut recent = Self::new();
        // Oldest first so the newest ends up at the front.
        for entry in entries.into_iter().rev() {
            recent.insert(entry);
        }
        recent
    }

    pub fn record(&mut self, path: impl Into<PathBuf>, format: Format) {
        self.record_at(path, format, Utc::now());
    }

    pub fn record_at(&mut self, path: impl Into<PathBuf>, format: Format, timestamp: DateTime<Utc>) {
        self.insert(RecentFileEntry {
            path: path.into(),
            format,
            timestamp,
        });
    }

    fn insert(&mut self, entry: RecentFileEntry) {
        self.entries.retain(|e| e.path != entry.path);
        self.entries.insert(0, entry);
        self.entries.truncate(MAX_RECENT_FILES);
    }

    pub fn entries(&self) -> &[RecentFileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(recent: &RecentFiles) -> Vec<String> {
        recent
            .entries()
            .iter()
            .map(|e| e.path.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_keeps_ten_most_recent() {
        let mut recent = RecentFiles::new();
        for i in 0..11 {
            recent.record(format!("/f/{}.png", i), Format::new("jpg"));
        }
        assert_eq!(recent.len(), 10);
        let paths = paths(&recent);
        assert_eq!(paths.first().unwrap(), "/f/10.png");
        assert_eq!(paths.last().unwrap(), "/f/1.png");
        assert!(!paths.contains(&"/f/0.png".to_string()));
    }

    #[test]
    fn test_reinsert_moves_to_front() {
        let mut recent = RecentFiles::new();
        recent.record("/a.docx", Format::new("pdf"));
        recent.record("/b.docx", Format::new("pdf"));
        recent.record("/a.docx", Format::new("odt"));

        assert_eq!(paths(&recent), vec!["/a.docx", "/b.docx"]);
        assert_eq!(recent.entries()[0].format.as_str(), "odt");
    }

    #[test]
    fn test_from_entries_dedupes() {
        let mut original = RecentFiles::new();
        original.record("/x.md", Format::new("html"));
        original.record("/y.md", Format::new("html"));
        let mut entries = original.entries().to_vec();
        entries.push(entries[0].clone());

        let restored = RecentFiles::from_entries(entries);
        assert_eq!(paths(&restored), vec!["/y.md", "/x.md"]);
    }
}
