//! Keyword search with highlighted, padded excerpts.
//!
//! Matching is case-insensitive substring containment over full document
//! content; only the first occurrence per document is reported. Two corpus
//! adapters feed the same [`SearchMatch`] shape: the journal (classified,
//! no timing) and a live storage listing (extracted on the fly, timed).
//! Search never mutates documents; persistent highlighting is the separate
//! `annotate` operation.

use std::time::Instant;

use anyhow::{bail, Result};
use tracing::warn;

use crate::config::Config;
use crate::extract;
use crate::journal::{Journal, LogEntry};
use crate::models::{filetype_of, FileMetadata, UNCLASSIFIED};
use crate::stats;
use crate::storage::Storage;

/// Characters of context kept on each side of the match in the snippet.
pub const CONTEXT_CHARS: usize = 200;

pub const HIGHLIGHT_OPEN: &str = "<mark>";
pub const HIGHLIGHT_CLOSE: &str = "</mark>";

/// One matching document.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    pub filename: String,
    pub title: Option<String>,
    pub content: String,
    /// Absent on the live-storage path, where no classification step ran.
    pub classification: Option<String>,
    pub snippet: String,
    pub metadata: FileMetadata,
    pub filetype: String,
}

// ============ Matching & snippets ============

/// Locate the first case-insensitive occurrence of `keyword`, returning the
/// byte range of the occurrence in the original string.
///
/// Lowercasing can change byte lengths outside ASCII, so the lowered text is
/// built together with a byte-offset map back into the original.
pub(crate) fn find_case_insensitive(content: &str, keyword: &str) -> Option<(usize, usize)> {
    let needle = keyword.to_lowercase();
    if needle.is_empty() {
        return None;
    }

    let mut lowered = String::with_capacity(content.len());
    let mut offsets: Vec<usize> = Vec::with_capacity(content.len());
    for (byte_index, ch) in content.char_indices() {
        for lower_ch in ch.to_lowercase() {
            let mut buf = [0u8; 4];
            let encoded = lower_ch.encode_utf8(&mut buf);
            for _ in 0..encoded.len() {
                offsets.push(byte_index);
            }
            lowered.push_str(encoded);
        }
    }

    let pos = lowered.find(&needle)?;
    let start = offsets[pos];
    let last_char_start = offsets[pos + needle.len() - 1];
    let end = last_char_start
        + content[last_char_start..]
            .chars()
            .next()
            .map(char::len_utf8)
            .unwrap_or(0);
    Some((start, end))
}

/// Byte index `n` characters back from the end of `s`.
fn back_chars(s: &str, n: usize) -> usize {
    let mut index = s.len();
    for _ in 0..n {
        match s[..index].chars().next_back() {
            Some(c) => index -= c.len_utf8(),
            None => break,
        }
    }
    index
}

/// Byte index `n` characters forward from the start of `s`.
fn forward_chars(s: &str, n: usize) -> usize {
    let mut index = 0;
    let mut chars = s.chars();
    for _ in 0..n {
        match chars.next() {
            Some(c) => index += c.len_utf8(),
            None => break,
        }
    }
    index
}

/// Build the highlighted excerpt for the first occurrence of `keyword`, or
/// `None` when the document does not contain it.
///
/// The window spans [`CONTEXT_CHARS`] characters either side of the match,
/// clamped to the content bounds; the matched substring keeps its original
/// casing and is wrapped in the highlight marker. Content itself is returned
/// to callers unmodified.
pub fn highlighted_snippet(content: &str, keyword: &str) -> Option<String> {
    let (start, end) = find_case_insensitive(content, keyword)?;

    let window_start = back_chars(&content[..start], CONTEXT_CHARS);
    let window_end = end + forward_chars(&content[end..], CONTEXT_CHARS);

    let mut snippet = String::with_capacity(
        window_end - window_start + HIGHLIGHT_OPEN.len() + HIGHLIGHT_CLOSE.len(),
    );
    snippet.push_str(&content[window_start..start]);
    snippet.push_str(HIGHLIGHT_OPEN);
    snippet.push_str(&content[start..end]);
    snippet.push_str(HIGHLIGHT_CLOSE);
    snippet.push_str(&content[end..window_end]);
    Some(snippet)
}

// ============ Corpus adapters ============

/// Search the journal-tracked corpus.
pub fn search_journal(journal: &Journal, keyword: &str) -> Result<Vec<SearchMatch>> {
    let entries = journal.read_all()?;
    Ok(entries
        .iter()
        .filter_map(|entry| match_entry(entry, keyword))
        .collect())
}

fn match_entry(entry: &LogEntry, keyword: &str) -> Option<SearchMatch> {
    let snippet = highlighted_snippet(&entry.text, keyword)?;
    let metadata = entry.metadata.clone().unwrap_or_else(|| FileMetadata {
        size: entry.text.chars().count() as u64,
        created: entry.timestamp.clone(),
        modified: entry.timestamp.clone(),
    });
    let classification = if entry.predicted_label.is_empty() {
        UNCLASSIFIED.to_string()
    } else {
        entry.predicted_label.clone()
    };
    Some(SearchMatch {
        filename: entry.filename.clone(),
        title: (!entry.title.is_empty()).then(|| entry.title.clone()),
        content: entry.text.clone(),
        classification: Some(classification),
        snippet,
        metadata,
        filetype: filetype_of(&entry.filename),
    })
}

/// Search live storage: list, retrieve, extract, match.
///
/// No classification step runs here, so matches carry none. Returns the
/// matches plus the wall-clock duration in seconds.
pub async fn search_storage(
    storage: &dyn Storage,
    keyword: &str,
) -> Result<(Vec<SearchMatch>, f64)> {
    let started = Instant::now();
    let mut matches = Vec::new();

    for filename in storage.list().await? {
        let bytes = match storage.retrieve(&filename).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %filename, error = %e, "skipping unreadable file");
                continue;
            }
        };
        let extracted = extract::extract(&bytes, Some(&filename));
        let Some(snippet) = highlighted_snippet(&extracted.content, keyword) else {
            continue;
        };
        let metadata = match storage.stat(&filename).await {
            Ok(metadata) => metadata,
            Err(_) => FileMetadata {
                size: bytes.len() as u64,
                created: String::new(),
                modified: String::new(),
            },
        };
        matches.push(SearchMatch {
            filetype: filetype_of(&filename),
            filename,
            title: Some(extracted.title),
            content: extracted.content,
            classification: None,
            snippet,
            metadata,
        });
    }

    Ok((matches, started.elapsed().as_secs_f64()))
}

// ============ CLI ============

/// Run the search command against the chosen corpus.
pub async fn run_search(
    config: &Config,
    storage: &dyn Storage,
    keyword: &str,
    source: &str,
    sort: Option<String>,
) -> Result<()> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let (mut matches, elapsed) = match source {
        "log" => {
            let journal = Journal::new(config.journal.path.clone());
            (search_journal(&journal, keyword)?, None)
        }
        "storage" => {
            let (matches, secs) = search_storage(storage, keyword).await?;
            (matches, Some(secs))
        }
        _ => bail!("Unknown search source: {}. Use log or storage.", source),
    };

    if let Some(sort) = sort.as_deref() {
        match sort {
            "name" => matches.sort_by(|a, b| a.filename.cmp(&b.filename)),
            "size" => matches.sort_by(|a, b| {
                b.metadata
                    .size
                    .cmp(&a.metadata.size)
                    .then_with(|| a.filename.cmp(&b.filename))
            }),
            "modified" => matches.sort_by(|a, b| {
                b.metadata
                    .modified
                    .cmp(&a.metadata.modified)
                    .then_with(|| a.filename.cmp(&b.filename))
            }),
            _ => bail!("Unknown sort key: {}. Use name, size, or modified.", sort),
        }
    }

    if matches.is_empty() {
        println!("No results.");
    }

    for (i, result) in matches.iter().enumerate() {
        println!(
            "{}. {} [{}]",
            i + 1,
            result.filename,
            result.filetype
        );
        if let Some(ref title) = result.title {
            println!("    title: {}", title);
        }
        if let Some(ref classification) = result.classification {
            println!("    classification: {}", classification);
        }
        println!("    size: {} bytes", result.metadata.size);
        if !result.metadata.modified.is_empty() {
            println!("    modified: {}", result.metadata.modified);
        }
        println!(
            "    excerpt: \"{}\"",
            result.snippet.replace('\n', " ").trim()
        );
        println!();
    }

    let records: Vec<stats::StatRecord> = matches.iter().map(stats::StatRecord::from).collect();
    stats::print_summary(&stats::aggregate(&records));

    // Only live-storage scans report timing.
    if let Some(secs) = elapsed {
        println!();
        println!("search took {:.2}s", secs);
    }

    Ok(())
}
