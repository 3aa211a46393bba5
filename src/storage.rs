//! Storage collaborator: where the raw document bytes live.
//!
//! The core is indifferent to the backend; it sees five operations behind the
//! [`Storage`] trait. Two adapters exist: the local filesystem and S3-style
//! object storage (`storage_s3`).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::FileMetadata;
use crate::storage_s3::S3Storage;

/// A document store keyed by filename.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist raw bytes under the given filename, replacing any prior copy.
    async fn store(&self, filename: &str, bytes: &[u8]) -> Result<()>;

    /// Fetch the raw bytes for a stored file.
    async fn retrieve(&self, filename: &str) -> Result<Vec<u8>>;

    /// Size and timestamps for a stored file. Timestamps are display strings.
    async fn stat(&self, filename: &str) -> Result<FileMetadata>;

    /// Remove a stored file.
    async fn delete(&self, filename: &str) -> Result<()>;

    /// All stored filenames (relative, sorted) that pass the configured globs.
    async fn list(&self) -> Result<Vec<String>>;
}

/// Pick the storage adapter the config asks for.
pub fn make_storage(config: &Config) -> Result<Box<dyn Storage>> {
    match config.storage.backend.as_str() {
        "local" => Ok(Box::new(LocalStorage::new(
            config.storage.root.clone(),
            &config.storage.include_globs,
            &config.storage.exclude_globs,
        )?)),
        "s3" => {
            let s3_config = config
                .storage
                .s3
                .clone()
                .ok_or_else(|| anyhow::anyhow!("[storage.s3] section missing"))?;
            Ok(Box::new(S3Storage::new(
                s3_config,
                &config.storage.include_globs,
                &config.storage.exclude_globs,
            )?))
        }
        other => bail!("Unknown storage backend: '{}'", other),
    }
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn format_system_time(time: std::time::SystemTime) -> String {
    DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M").to_string()
}

// ============ Local filesystem ============

/// Files under a root directory; filenames are root-relative paths.
pub struct LocalStorage {
    root: PathBuf,
    include_set: GlobSet,
    exclude_set: GlobSet,
}

impl LocalStorage {
    pub fn new(root: PathBuf, include_globs: &[String], exclude_globs: &[String]) -> Result<Self> {
        Ok(Self {
            root,
            include_set: build_globset(include_globs)?,
            exclude_set: build_globset(exclude_globs)?,
        })
    }

    fn resolve(&self, filename: &str) -> Result<PathBuf> {
        // Keys are relative paths; refuse anything that would escape the root.
        let relative = Path::new(filename);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            bail!("invalid storage filename: {}", filename);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn store(&self, filename: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(filename)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    async fn retrieve(&self, filename: &str) -> Result<Vec<u8>> {
        let path = self.resolve(filename)?;
        std::fs::read(&path).with_context(|| format!("File not found: {}", filename))
    }

    async fn stat(&self, filename: &str) -> Result<FileMetadata> {
        let path = self.resolve(filename)?;
        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("File not found: {}", filename))?;
        let modified = metadata
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        // Creation time is unavailable on some filesystems; fall back to mtime.
        let created = metadata.created().unwrap_or(modified);
        Ok(FileMetadata {
            size: metadata.len(),
            created: format_system_time(created),
            modified: format_system_time(modified),
        })
    }

    async fn delete(&self, filename: &str) -> Result<()> {
        let path = self.resolve(filename)?;
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to delete {}", filename))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path());
            let rel_str = relative.to_string_lossy().to_string();
            if self.exclude_set.is_match(&rel_str) {
                continue;
            }
            if !self.include_set.is_match(&rel_str) {
                continue;
            }
            names.push(rel_str);
        }

        // Sort for deterministic ordering
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(dir: &Path) -> LocalStorage {
        LocalStorage::new(dir.to_path_buf(), &["**/*".to_string()], &[]).unwrap()
    }

    #[tokio::test]
    async fn store_retrieve_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = local(dir.path());
        storage.store("nested/doc.txt", b"hello").await.unwrap();
        assert_eq!(storage.retrieve("nested/doc.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn stat_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let storage = local(dir.path());
        storage.store("doc.txt", b"12345").await.unwrap();
        let meta = storage.stat("doc.txt").await.unwrap();
        assert_eq!(meta.size, 5);
        assert!(!meta.modified.is_empty());
    }

    #[tokio::test]
    async fn list_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(
            dir.path().to_path_buf(),
            &["**/*.txt".to_string()],
            &["skip/**".to_string()],
        )
        .unwrap();
        storage.store("b.txt", b"b").await.unwrap();
        storage.store("a.txt", b"a").await.unwrap();
        storage.store("c.pdf", b"c").await.unwrap();
        storage.store("skip/d.txt", b"d").await.unwrap();

        assert_eq!(storage.list().await.unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = local(dir.path());
        storage.store("doc.txt", b"x").await.unwrap();
        storage.delete("doc.txt").await.unwrap();
        assert!(storage.retrieve("doc.txt").await.is_err());
        assert!(storage.delete("doc.txt").await.is_err());
    }

    #[tokio::test]
    async fn path_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = local(dir.path());
        assert!(storage.store("../outside.txt", b"x").await.is_err());
        assert!(storage.retrieve("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn missing_root_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = local(&dir.path().join("never-created"));
        assert!(storage.list().await.unwrap().is_empty());
    }
}
