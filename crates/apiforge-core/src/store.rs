//! On-disk descriptor files written by the sync pipeline.
//!
//! Layout: one JSON array of descriptors per source at
//! `<data_dir>/descriptors/<source>.json`.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::descriptor::ResourceDescriptor;

static SOURCE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("source id pattern"));

const EXTENSION: &str = "json";

/// Errors raised by the descriptor store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The source id is not a safe file stem.
    #[error("invalid source id '{0}'")]
    InvalidSource(String),

    /// No file exists for the source.
    #[error("no descriptor file for source '{0}'")]
    SourceNotFound(String),

    /// Reading a file or directory failed.
    #[error("failed to read {}: {source}", .path.display())]
    ReadError {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Writing a file failed.
    #[error("failed to write {}: {source}", .path.display())]
    WriteError {
        /// Path being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A file is not a JSON array of descriptors.
    #[error("failed to parse {}: {source}", .path.display())]
    ParseError {
        /// Path being parsed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Descriptors could not be serialized.
    #[error("failed to serialize descriptors: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Whether a source id is usable as a file stem.
#[must_use]
pub fn is_valid_source_id(source: &str) -> bool {
    SOURCE_ID.is_match(source)
}

/// Reads and writes per-source descriptor files.
#[derive(Debug, Clone)]
pub struct DescriptorStore {
    dir: PathBuf,
}

impl DescriptorStore {
    /// Store rooted at a descriptors directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The descriptors directory.
    #[must_use]
    pub const fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Source ids with a descriptor file, sorted. A missing directory has no
    /// sources.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be listed.
    pub async fn list_sources(&self) -> StoreResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::ReadError {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut sources = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StoreError::ReadError {
                path: self.dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if is_valid_source_id(stem) => sources.push(stem.to_string()),
                _ => tracing::debug!(path = %path.display(), "Ignoring non-source file"),
            }
        }

        sources.sort();
        Ok(sources)
    }

    /// Load every descriptor of a source.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid id, a missing file or malformed JSON.
    pub async fn load(&self, source: &str) -> StoreResult<Vec<ResourceDescriptor>> {
        let path = self.path_for(source)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::SourceNotFound(source.to_string()))
            }
            Err(source) => return Err(StoreError::ReadError { path, source }),
        };

        serde_json::from_str(&content).map_err(|source| StoreError::ParseError { path, source })
    }

    /// Write every descriptor of a source, replacing the previous file.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid id or a failed write.
    pub async fn save(&self, source: &str, descriptors: &[ResourceDescriptor]) -> StoreResult<()> {
        let path = self.path_for(source)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::WriteError {
                path: self.dir.clone(),
                source,
            })?;

        let content = serde_json::to_string_pretty(descriptors)?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| StoreError::WriteError { path, source })
    }

    fn path_for(&self, source: &str) -> StoreResult<PathBuf> {
        if !is_valid_source_id(source) {
            return Err(StoreError::InvalidSource(source.to_string()));
        }
        Ok(self.dir.join(format!("{source}.{EXTENSION}")))
    }
}
