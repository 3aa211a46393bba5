//! Core data models used throughout Docket.
//!
//! These types represent the documents, labels, and file metadata that flow
//! through the intake and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// File metadata as reported by a storage backend or carried in the journal.
///
/// Timestamps are display/ISO-8601 strings rather than parsed values; the
/// journal is the interchange format and keeps whatever the writer produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub size: u64,
    pub created: String,
    pub modified: String,
}

/// Sentinel used when no trained model produced a label for a document.
pub const UNCLASSIFIED: &str = "Unclassified";

/// Separator between the levels of a hierarchical label.
pub const LABEL_SEPARATOR: &str = " > ";

/// A three-level category path, e.g. `Finance > Billing > Invoice`.
///
/// Levels are predicted independently; nothing ties level 2 to level 1 at the
/// model layer, so this is a plain tuple of names rather than a tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelPath {
    pub level1: String,
    pub level2: String,
    pub level3: String,
}

impl LabelPath {
    /// Parse a label string into its three segments.
    ///
    /// Returns `None` unless the label has exactly three non-empty segments;
    /// training uses this to drop malformed examples.
    pub fn parse(label: &str) -> Option<Self> {
        let parts: Vec<&str> = label.split(LABEL_SEPARATOR).map(str::trim).collect();
        match parts.as_slice() {
            [l1, l2, l3] if !l1.is_empty() && !l2.is_empty() && !l3.is_empty() => {
                Some(LabelPath {
                    level1: l1.to_string(),
                    level2: l2.to_string(),
                    level3: l3.to_string(),
                })
            }
            _ => None,
        }
    }

    pub fn joined(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.level1,
            self.level2,
            self.level3,
            sep = LABEL_SEPARATOR
        )
    }
}

impl std::fmt::Display for LabelPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.joined())
    }
}

/// Upper-cased extension for display, or `UNKNOWN` when the filename has none.
pub fn filetype_of(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_uppercase(),
        _ => "UNKNOWN".to_string(),
    }
}

/// Lower-cased extension for grouping, empty string when the filename has none.
pub fn extension_of(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_lowercase(),
        _ => String::new(),
    }
}
