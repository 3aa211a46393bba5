//! Document detail and raw-bytes retrieval.
//!
//! `show` re-extracts a stored document on demand and classifies its full
//! text; `fetch` writes the stored bytes to a local path. Missing files are
//! reported to the caller, never a panic.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::classify;
use crate::config::Config;
use crate::extract::{self, ExtractStatus};
use crate::models::filetype_of;
use crate::storage::Storage;

/// Run the show command: retrieve, extract, stat, classify, print.
pub async fn run_show(config: &Config, storage: &dyn Storage, filename: &str) -> Result<()> {
    let bytes = match storage.retrieve(filename).await {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let extracted = extract::extract(&bytes, Some(filename));
    let metadata = storage.stat(filename).await.ok();

    let classifier = classify::build_classifier(config)?;
    let classification = match classifier.classify(&extracted.content) {
        Ok(path) => path.joined(),
        Err(_) => crate::models::UNCLASSIFIED.to_string(),
    };

    println!("--- Document ---");
    println!("filename:       {}", filename);
    println!("title:          {}", extracted.title);
    println!("filetype:       {}", filetype_of(filename));
    println!("classification: {}", classification);
    if let Some(ref metadata) = metadata {
        println!("size:           {} bytes", metadata.size);
        println!("created:        {}", metadata.created);
        println!("modified:       {}", metadata.modified);
    }
    match extracted.status {
        ExtractStatus::Full => println!("extraction:     ok"),
        ExtractStatus::Degraded(ref reason) => println!("extraction:     degraded ({})", reason),
        ExtractStatus::Unsupported => println!("extraction:     unsupported type"),
    }
    println!();

    println!("--- Content ---");
    println!("{}", extracted.content);
    Ok(())
}

/// Run the fetch command: write the stored bytes to a local path.
pub async fn run_fetch(
    storage: &dyn Storage,
    filename: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let bytes = storage
        .retrieve(filename)
        .await
        .with_context(|| format!("cannot fetch {}", filename))?;

    let target = output.unwrap_or_else(|| {
        PathBuf::from(
            std::path::Path::new(filename)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| filename.to_string()),
        )
    });
    std::fs::write(&target, &bytes)
        .with_context(|| format!("Failed to write {}", target.display()))?;

    println!("fetched {} -> {} ({} bytes)", filename, target.display(), bytes.len());
    Ok(())
}
