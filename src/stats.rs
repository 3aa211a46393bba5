//! Corpus summary statistics.
//!
//! Aggregation runs over [`StatRecord`], a normalized record shape; explicit
//! adapters convert journal entries and search matches into it instead of
//! branching on input shape at runtime. Sizes prefer the stored metadata and
//! fall back to the text length when a record has none.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::Config;
use crate::journal::{Journal, LogEntry};
use crate::models::extension_of;
use crate::search::SearchMatch;

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Size bucket thresholds: small < 100 KiB <= medium < 1 MiB <= large.
const SMALL_LIMIT: u64 = 100 * 1024;
const MEDIUM_LIMIT: u64 = 1024 * 1024;

/// Normalized input record for aggregation.
#[derive(Debug, Clone)]
pub struct StatRecord {
    pub filename: String,
    pub size: u64,
    pub timestamp: Option<String>,
}

impl From<&LogEntry> for StatRecord {
    fn from(entry: &LogEntry) -> Self {
        let size = entry
            .metadata
            .as_ref()
            .map(|m| m.size)
            .unwrap_or_else(|| entry.text.chars().count() as u64);
        StatRecord {
            filename: entry.filename.clone(),
            size,
            timestamp: (!entry.timestamp.is_empty()).then(|| entry.timestamp.clone()),
        }
    }
}

impl From<&SearchMatch> for StatRecord {
    fn from(matched: &SearchMatch) -> Self {
        StatRecord {
            filename: matched.filename.clone(),
            size: matched.metadata.size,
            timestamp: (!matched.metadata.created.is_empty())
                .then(|| matched.metadata.created.clone()),
        }
    }
}

/// Document counts per size bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SizeDistribution {
    pub small: u64,
    pub medium: u64,
    pub large: u64,
}

/// Corpus-wide summary metrics.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_files: u64,
    /// Total corpus size in MB, 2-decimal rounding.
    pub total_size_mb: f64,
    /// Average document size in KB.
    pub avg_file_size_kb: f64,
    /// Largest document in MB.
    pub largest_file_mb: f64,
    /// Smallest document in KB.
    pub smallest_file_kb: f64,
    /// Median document size in KB (lower-middle element for even lengths).
    pub median_file_size_kb: f64,
    /// Display-formatted timestamp of the most recent upload.
    pub last_upload: Option<String>,
    /// Histogram keyed by lower-cased extension; `""` for extensionless files.
    pub file_types: BTreeMap<String, u64>,
    pub size_distribution: SizeDistribution,
}

impl Summary {
    fn empty() -> Self {
        Summary {
            total_files: 0,
            total_size_mb: 0.0,
            avg_file_size_kb: 0.0,
            largest_file_mb: 0.0,
            smallest_file_kb: 0.0,
            median_file_size_kb: 0.0,
            last_upload: None,
            file_types: BTreeMap::new(),
            size_distribution: SizeDistribution::default(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Accept RFC 3339 and naive ISO-8601 (the original tooling wrote the latter).
fn parse_iso(timestamp: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(timestamp).is_ok()
        || NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

fn reformat_iso(timestamp: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(timestamp) {
        return dt.format("%Y-%m-%d %H:%M").to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format("%Y-%m-%d %H:%M").to_string();
    }
    // Reformat failed; keep the raw string.
    timestamp.to_string()
}

/// Compute summary metrics over normalized records.
///
/// Empty input yields the all-zero summary with `last_upload = None`.
/// Records whose timestamp fails ISO-8601 parsing are excluded from the
/// last-upload computation but still count in `total_files`.
pub fn aggregate(records: &[StatRecord]) -> Summary {
    if records.is_empty() {
        return Summary::empty();
    }

    let mut sizes: Vec<u64> = records.iter().map(|r| r.size).collect();
    sizes.sort_unstable();
    let total: u64 = sizes.iter().sum();
    let count = sizes.len();

    let mut file_types: BTreeMap<String, u64> = BTreeMap::new();
    for record in records {
        *file_types.entry(extension_of(&record.filename)).or_insert(0) += 1;
    }

    let mut distribution = SizeDistribution::default();
    for &size in &sizes {
        if size < SMALL_LIMIT {
            distribution.small += 1;
        } else if size < MEDIUM_LIMIT {
            distribution.medium += 1;
        } else {
            distribution.large += 1;
        }
    }

    let last_upload = records
        .iter()
        .filter_map(|r| r.timestamp.as_deref())
        .filter(|ts| parse_iso(ts))
        .max()
        .map(reformat_iso);

    // Lower-middle element; even lengths take index (n - 1) / 2.
    let median = sizes[(count - 1) / 2];

    Summary {
        total_files: count as u64,
        total_size_mb: round2(total as f64 / MIB),
        avg_file_size_kb: round2(total as f64 / count as f64 / KIB),
        largest_file_mb: round2(*sizes.last().unwrap() as f64 / MIB),
        smallest_file_kb: round2(sizes[0] as f64 / KIB),
        median_file_size_kb: round2(median as f64 / KIB),
        last_upload,
        file_types,
        size_distribution: distribution,
    }
}

/// Print a summary block, shared by `dk stats` and the search footer.
pub fn print_summary(summary: &Summary) {
    println!("  documents:     {}", summary.total_files);
    println!("  total size:    {:.2} MB", summary.total_size_mb);
    println!("  average size:  {:.2} KB", summary.avg_file_size_kb);
    println!("  largest:       {:.2} MB", summary.largest_file_mb);
    println!("  smallest:      {:.2} KB", summary.smallest_file_kb);
    println!("  median:        {:.2} KB", summary.median_file_size_kb);
    println!(
        "  last upload:   {}",
        summary.last_upload.as_deref().unwrap_or("never")
    );

    if !summary.file_types.is_empty() {
        println!();
        println!("  By type:");
        for (ext, count) in &summary.file_types {
            let label = if ext.is_empty() { "(none)" } else { ext.as_str() };
            println!("  {:<12} {:>6}", label, count);
        }
    }

    println!();
    println!(
        "  Size:  small {}  medium {}  large {}",
        summary.size_distribution.small,
        summary.size_distribution.medium,
        summary.size_distribution.large
    );
}

/// Run the stats command over the journal-tracked corpus.
pub fn run_stats(config: &Config) -> Result<()> {
    let journal = Journal::new(config.journal.path.clone());
    let entries = journal.read_all()?;
    let records: Vec<StatRecord> = entries.iter().map(StatRecord::from).collect();
    let summary = aggregate(&records);

    println!("Docket — Corpus Stats");
    println!("=====================");
    println!();
    print_summary(&summary);
    println!();
    Ok(())
}
