//! Append-only JSON-lines journal — the corpus metadata store.
//!
//! One JSON object per line. The journal is the single source of truth for
//! the corpus once files are ingested; updates and deletes read the whole
//! file, filter in memory, and rewrite through a temp file + atomic rename so
//! readers never observe a half-written journal. There is no cross-process
//! lock; overlapping writers from two processes remain a documented gap.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::FileMetadata;

/// Journal entries keep at most this many characters of document text.
pub const LOG_TEXT_LIMIT: usize = 500;

/// One journal line.
///
/// `metadata` is optional for tolerance of lines written by older tooling;
/// consumers fall back to the text length for sizing (see `stats`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub filename: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub predicted_label: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub metadata: Option<FileMetadata>,
}

/// Handle on the journal file.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a JSON line.
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open journal {}", self.path.display()))?;
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Read every well-formed entry. Missing file is an empty corpus;
    /// malformed lines are skipped.
    pub fn read_all(&self) -> Result<Vec<LogEntry>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read journal {}", self.path.display()));
            }
        };

        let mut entries = Vec::new();
        let mut skipped = 0usize;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(
                journal = %self.path.display(),
                skipped,
                "skipped malformed journal lines"
            );
        }
        debug!(entries = entries.len(), "journal read");
        Ok(entries)
    }

    /// Replace the whole journal with the given entries.
    ///
    /// Writes to a temp file in the journal's directory and renames it over
    /// the original, so a crash mid-write cannot truncate the journal.
    pub fn rewrite(&self, entries: &[LogEntry]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp journal in {}", dir.display()))?;
        for entry in entries {
            let line = serde_json::to_string(entry)?;
            writeln!(tmp, "{}", line)?;
        }
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace journal {}", self.path.display()))?;
        Ok(())
    }

    /// Look up an entry by its primary key.
    pub fn find(&self, filename: &str) -> Result<Option<LogEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .find(|entry| entry.filename == filename))
    }
}

/// Truncate text to the journal's storage limit, on a char boundary.
pub fn truncate_for_log(text: &str) -> String {
    text.chars().take(LOG_TEXT_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(filename: &str) -> LogEntry {
        LogEntry {
            filename: filename.to_string(),
            title: "Title".to_string(),
            text: "body text".to_string(),
            predicted_label: "A > B > C".to_string(),
            timestamp: "2026-08-01T10:00:00Z".to_string(),
            metadata: Some(FileMetadata {
                size: 9,
                created: "2026-08-01 10:00".to_string(),
                modified: "2026-08-01 10:00".to_string(),
            }),
        }
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("log.json"));
        journal.append(&entry("a.txt")).unwrap();
        journal.append(&entry("b.txt")).unwrap();

        let entries = journal.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].filename, "a.txt");
        assert_eq!(entries[1].filename, "b.txt");
    }

    #[test]
    fn missing_journal_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("absent.json"));
        assert!(journal.read_all().unwrap().is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        let valid = serde_json::to_string(&entry("good.txt")).unwrap();
        std::fs::write(&path, format!("{}\n{{\"filename\": \"trunc", valid)).unwrap();

        let journal = Journal::new(&path);
        let entries = journal.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "good.txt");
    }

    #[test]
    fn rewrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("log.json"));
        journal.append(&entry("a.txt")).unwrap();
        journal.append(&entry("b.txt")).unwrap();

        let kept: Vec<LogEntry> = journal
            .read_all()
            .unwrap()
            .into_iter()
            .filter(|e| e.filename != "a.txt")
            .collect();
        journal.rewrite(&kept).unwrap();

        let entries = journal.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "b.txt");
    }

    #[test]
    fn entry_without_metadata_still_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(
            &path,
            "{\"filename\": \"legacy.txt\", \"text\": \"old line\"}\n",
        )
        .unwrap();
        let entries = Journal::new(&path).read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].metadata.is_none());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(LOG_TEXT_LIMIT + 50);
        let truncated = truncate_for_log(&text);
        assert_eq!(truncated.chars().count(), LOG_TEXT_LIMIT);
    }
}
