//! Intake lifecycle orchestration.
//!
//! Coordinates the full upload flow: store bytes → extract text → classify →
//! append to the journal. Also owns the explicit update and delete
//! operations, which must touch storage and journal together to keep the two
//! consistent. Per-file failures never abort a batch.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::warn;

use crate::classify::{self, ClassifyError};
use crate::config::Config;
use crate::extract::{self, ExtractStatus};
use crate::journal::{truncate_for_log, Journal, LogEntry};
use crate::models::{filetype_of, FileMetadata, UNCLASSIFIED};
use crate::storage::Storage;

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Classify a snippet, degrading to the sentinel when untrained.
fn classify_or_sentinel(classifier: &classify::Classifier, snippet: &str) -> String {
    match classifier.classify(snippet) {
        Ok(path) => path.joined(),
        Err(ClassifyError::NotTrained) => UNCLASSIFIED.to_string(),
        Err(e) => {
            warn!(error = %e, "classification failed");
            UNCLASSIFIED.to_string()
        }
    }
}

/// Run the ingest command over a batch of local files.
pub async fn run_ingest(config: &Config, storage: &dyn Storage, paths: &[PathBuf]) -> Result<()> {
    let classifier = classify::build_classifier(config)?;
    let journal = Journal::new(config.journal.path.clone());

    let mut ingested = 0usize;
    let mut degraded = 0usize;
    let mut unsupported = 0usize;
    let mut failed = 0usize;

    for path in paths {
        let filename = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => {
                warn!(path = %path.display(), "skipping path without a file name");
                failed += 1;
                continue;
            }
        };

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %filename, error = %e, "skipping unreadable file");
                failed += 1;
                continue;
            }
        };

        if let Err(e) = storage.store(&filename, &bytes).await {
            warn!(file = %filename, error = %e, "failed to store file");
            failed += 1;
            continue;
        }

        let extracted = extract::extract(&bytes, Some(&filename));
        match extracted.status {
            ExtractStatus::Degraded(_) => degraded += 1,
            ExtractStatus::Unsupported => unsupported += 1,
            ExtractStatus::Full => {}
        }

        let classification = classify_or_sentinel(&classifier, &extracted.snippet);

        let metadata = match storage.stat(&filename).await {
            Ok(metadata) => metadata,
            Err(_) => FileMetadata {
                size: bytes.len() as u64,
                created: now_iso(),
                modified: now_iso(),
            },
        };

        let entry = LogEntry {
            filename: filename.clone(),
            title: extracted.title,
            text: truncate_for_log(&extracted.content),
            predicted_label: classification,
            timestamp: now_iso(),
            metadata: Some(metadata),
        };
        if let Err(e) = journal.append(&entry) {
            warn!(file = %filename, error = %e, "failed to journal file");
            failed += 1;
            continue;
        }
        ingested += 1;
    }

    println!("ingest");
    println!("  files: {}", paths.len());
    println!("  ingested: {}", ingested);
    println!("  extraction degraded: {}", degraded);
    println!("  unsupported type: {}", unsupported);
    println!("  failed: {}", failed);
    println!("ok");
    Ok(())
}

/// Re-extract, re-classify, and refresh metadata for a tracked document,
/// preserving its original `created` timestamp.
pub async fn run_update(config: &Config, storage: &dyn Storage, filename: &str) -> Result<()> {
    let classifier = classify::build_classifier(config)?;
    let journal = Journal::new(config.journal.path.clone());

    let mut entries = journal.read_all()?;
    let index = entries
        .iter()
        .position(|entry| entry.filename == filename)
        .with_context(|| format!("not tracked in the journal: {}", filename))?;

    let bytes = storage
        .retrieve(filename)
        .await
        .with_context(|| format!("not present in storage: {}", filename))?;

    let extracted = extract::extract(&bytes, Some(filename));
    let classification = classify_or_sentinel(&classifier, &extracted.snippet);

    let stat = match storage.stat(filename).await {
        Ok(metadata) => metadata,
        Err(_) => FileMetadata {
            size: bytes.len() as u64,
            created: now_iso(),
            modified: now_iso(),
        },
    };
    // The original created stamp survives the update.
    let created = entries[index]
        .metadata
        .as_ref()
        .map(|m| m.created.clone())
        .unwrap_or_else(|| stat.created.clone());

    entries[index] = LogEntry {
        filename: filename.to_string(),
        title: extracted.title,
        text: truncate_for_log(&extracted.content),
        predicted_label: classification.clone(),
        timestamp: now_iso(),
        metadata: Some(FileMetadata {
            size: stat.size,
            created,
            modified: stat.modified,
        }),
    };
    journal.rewrite(&entries)?;

    println!("update {}", filename);
    println!("  classification: {}", classification);
    println!("ok");
    Ok(())
}

/// Remove a document from storage and journal together.
pub async fn run_delete(config: &Config, storage: &dyn Storage, filename: &str) -> Result<()> {
    let journal = Journal::new(config.journal.path.clone());

    let stored_removed = match storage.delete(filename).await {
        Ok(()) => true,
        Err(e) => {
            warn!(file = %filename, error = %e, "storage delete failed");
            false
        }
    };

    let entries = journal.read_all()?;
    let kept: Vec<LogEntry> = entries
        .iter()
        .filter(|entry| entry.filename != filename)
        .cloned()
        .collect();
    let journal_removed = kept.len() != entries.len();
    if journal_removed {
        journal.rewrite(&kept)?;
    }

    if !stored_removed && !journal_removed {
        bail!("unknown document: {}", filename);
    }

    println!("delete {}", filename);
    println!("  storage: {}", if stored_removed { "removed" } else { "missing" });
    println!("  journal: {}", if journal_removed { "removed" } else { "missing" });
    println!("ok");
    Ok(())
}

/// Print the journal-tracked corpus.
pub fn run_list(config: &Config) -> Result<()> {
    let journal = Journal::new(config.journal.path.clone());
    let entries = journal.read_all()?;

    if entries.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!(
        "{:<32} {:<8} {:<36} {:>10}  {}",
        "FILENAME", "TYPE", "CLASSIFICATION", "SIZE", "MODIFIED"
    );
    println!("{}", "-".repeat(100));
    for entry in &entries {
        let (size, modified) = entry
            .metadata
            .as_ref()
            .map(|m| (m.size, m.modified.as_str()))
            .unwrap_or((0, ""));
        let label = if entry.predicted_label.is_empty() {
            UNCLASSIFIED
        } else {
            entry.predicted_label.as_str()
        };
        println!(
            "{:<32} {:<8} {:<36} {:>10}  {}",
            entry.filename,
            filetype_of(&entry.filename),
            label,
            size,
            modified
        );
    }
    println!();
    println!("{} document(s)", entries.len());
    Ok(())
}
