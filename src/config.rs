use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    pub s3: Option<S3StorageConfig>,
}

fn default_backend() -> String {
    "local".to_string()
}

fn default_root() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3StorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    pub endpoint_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct JournalConfig {
    #[serde(default = "default_journal_path")]
    pub path: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: default_journal_path(),
        }
    }
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("classified_log.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_training_data")]
    pub training_data: PathBuf,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            training_data: default_training_data(),
        }
    }
}

fn default_training_data() -> PathBuf {
    PathBuf::from("training_data.json")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    match config.storage.backend.as_str() {
        "local" => {}
        "s3" => {
            let s3 = config
                .storage
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("storage.backend = \"s3\" requires a [storage.s3] section"))?;
            if s3.bucket.is_empty() {
                anyhow::bail!("storage.s3.bucket must not be empty");
            }
        }
        other => anyhow::bail!(
            "Unknown storage backend: '{}'. Must be local or s3.",
            other
        ),
    }

    if config.storage.include_globs.is_empty() {
        anyhow::bail!("storage.include_globs must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: Config = toml::from_str("[storage]\n").unwrap();
        assert_eq!(config.storage.backend, "local");
        assert_eq!(config.journal.path, PathBuf::from("classified_log.json"));
        assert_eq!(
            config.classifier.training_data,
            PathBuf::from("training_data.json")
        );
    }

    #[test]
    fn s3_backend_requires_section() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[storage]\nbackend = \"s3\"\n").unwrap();
        let err = load_config(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("[storage.s3]"));
    }

    #[test]
    fn unknown_backend_rejected() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[storage]\nbackend = \"ftp\"\n").unwrap();
        assert!(load_config(tmp.path()).is_err());
    }
}
