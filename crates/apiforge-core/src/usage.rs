//! Usage analysis: which generated endpoints and schemas a project imports.
//!
//! The analyzer walks the project root, reads every file selected by the
//! include/exclude globs and extracts module specifiers from `import`,
//! `export … from`, dynamic `import()` and `require()` forms, ignoring
//! anything inside `//` and `/* */` comments. Specifiers
//! under the generated package are bucketed by source, controller, endpoint
//! and data type. Each bucket maps a key to the set of distinct files that
//! import it.
//!
//! Re-indexing is explicit and full. A report remembers the descriptor-set
//! generation it was computed against so callers can tell when it is stale.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use walkdir::WalkDir;

use crate::config::UsageConfig;
use crate::descriptor::{ResourceDescriptor, COMPONENTS_SEGMENT};

static MODULE_SPECIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"\b(?:import|export)\s[^'"]*?\bfrom\s*['"]([^'"]+)['"]"#,
        r#"|\bimport\s*['"]([^'"]+)['"]"#,
        r#"|\bimport\s*\(\s*['"]([^'"]+)['"]\s*\)"#,
        r#"|\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#,
    ))
    .expect("module specifier pattern")
});

/// Errors raised by the usage analyzer.
#[derive(Debug, Error)]
pub enum UsageError {
    /// An include or exclude pattern does not compile.
    #[error("invalid glob '{pattern}': {source}")]
    InvalidGlob {
        /// The offending pattern.
        pattern: String,
        /// Compiler error.
        #[source]
        source: globset::Error,
    },

    /// The project root does not exist.
    #[error("project root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// The blocking scan task panicked or was cancelled.
    #[error("usage scan aborted: {0}")]
    ScanAborted(String),
}

/// Result alias for usage operations.
pub type UsageResult<T> = std::result::Result<T, UsageError>;

/// Import usage of a project, bucketed four ways.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    /// Descriptor-set generation this report was computed against.
    pub generation: u64,
    /// When the scan finished.
    pub generated_at: DateTime<Utc>,
    /// Files that were read.
    pub files_scanned: usize,
    /// Source id → importing files.
    pub by_source: BTreeMap<String, BTreeSet<String>>,
    /// `source/tag…` → importing files.
    pub by_controller: BTreeMap<String, BTreeSet<String>>,
    /// `source/tag…/operation` → importing files.
    pub by_endpoint: BTreeMap<String, BTreeSet<String>>,
    /// `source/components/Name` → importing files.
    pub by_datatype: BTreeMap<String, BTreeSet<String>>,
}

impl UsageReport {
    /// Whether the descriptor set has changed since this report was built.
    #[must_use]
    pub const fn is_stale(&self, generation: u64) -> bool {
        self.generation != generation
    }

    /// Files importing anything from a source.
    #[must_use]
    pub fn source_files(&self, source: &str) -> usize {
        self.by_source.get(source).map_or(0, BTreeSet::len)
    }

    /// Files importing a controller or one of its endpoints.
    #[must_use]
    pub fn controller_files(&self, controller: &str) -> usize {
        self.by_controller.get(controller).map_or(0, BTreeSet::len)
    }

    /// Files importing a descriptor, by its grouping path.
    #[must_use]
    pub fn files_using(&self, path: &str) -> usize {
        self.by_endpoint
            .get(path)
            .or_else(|| self.by_datatype.get(path))
            .map_or(0, BTreeSet::len)
    }

    /// Key counts for API responses.
    #[must_use]
    pub fn summary(&self) -> UsageSummary {
        UsageSummary {
            generation: self.generation,
            generated_at: self.generated_at,
            files_scanned: self.files_scanned,
            sources: self.by_source.len(),
            controllers: self.by_controller.len(),
            endpoints: self.by_endpoint.len(),
            datatypes: self.by_datatype.len(),
        }
    }

    fn record(&mut self, file: &str, sub_path: &str) {
        let segments: Vec<&str> = sub_path.split('/').filter(|s| !s.is_empty()).collect();
        let Some(source) = segments.first() else {
            return;
        };
        insert(&mut self.by_source, source, file);

        match segments.as_slice() {
            [source, COMPONENTS_SEGMENT, name, ..] => {
                let key = format!("{source}/{COMPONENTS_SEGMENT}/{name}");
                insert(&mut self.by_datatype, &key, file);
            }
            [.., _] if segments.len() >= 3 => {
                let endpoint = segments.join("/");
                let controller = segments[..segments.len() - 1].join("/");
                insert(&mut self.by_endpoint, &endpoint, file);
                insert(&mut self.by_controller, &controller, file);
            }
            [_, _] => insert(&mut self.by_controller, &segments.join("/"), file),
            _ => {}
        }
    }
}

fn insert(bucket: &mut BTreeMap<String, BTreeSet<String>>, key: &str, file: &str) {
    bucket
        .entry(key.to_string())
        .or_default()
        .insert(file.to_string());
}

/// Counts of a [`UsageReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    /// Descriptor-set generation the report was computed against.
    pub generation: u64,
    /// When the scan finished.
    pub generated_at: DateTime<Utc>,
    /// Files that were read.
    #[schema(example = 128)]
    pub files_scanned: usize,
    /// Sources imported at least once.
    pub sources: usize,
    /// Controllers imported at least once.
    pub controllers: usize,
    /// Endpoints imported at least once.
    pub endpoints: usize,
    /// Schemas imported at least once.
    pub datatypes: usize,
}

/// Module specifiers imported by a source file, in order of appearance.
///
/// Imports that only appear inside comments are not reported.
#[must_use]
pub fn extract_specifiers(text: &str) -> Vec<&str> {
    let code = blank_comments(text);
    MODULE_SPECIFIER
        .captures_iter(&code)
        .filter_map(|caps| (1..=4).find_map(|group| caps.get(group)))
        .map(|m| &text[m.range()])
        .collect()
}

/// Copy of `text` with `//` and `/* */` comments overwritten by spaces.
///
/// Quoted and template literals are skipped so `'http://…'` is not taken
/// for a comment. Byte offsets and line breaks are preserved.
fn blank_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = bytes.to_vec();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if let Some(open) = quote {
            match byte {
                b'\\' => i += 1,
                b'\n' if open != b'`' => quote = None,
                _ if byte == open => quote = None,
                _ => {}
            }
            i += 1;
            continue;
        }

        let end = match (byte, bytes.get(i + 1)) {
            (b'\'' | b'"' | b'`', _) => {
                quote = Some(byte);
                i += 1;
                continue;
            }
            (b'/', Some(b'/')) => bytes[i..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |offset| i + offset),
            (b'/', Some(b'*')) => bytes[i + 2..]
                .windows(2)
                .position(|pair| pair == b"*/")
                .map_or(bytes.len(), |offset| i + 2 + offset + 2),
            _ => {
                i += 1;
                continue;
            }
        };

        for slot in &mut out[i..end] {
            if *slot != b'\n' {
                *slot = b' ';
            }
        }
        i = end;
    }

    // Whole comments were replaced, so no multi-byte character was split.
    String::from_utf8(out).unwrap_or_else(|_| text.to_string())
}

/// Scans a project for imports of the generated client.
pub struct UsageAnalyzer {
    config: UsageConfig,
    include: GlobSet,
    exclude: GlobSet,
    report: Option<Arc<UsageReport>>,
}

impl std::fmt::Debug for UsageAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageAnalyzer")
            .field("config", &self.config)
            .field("generation", &self.report.as_ref().map(|r| r.generation))
            .finish_non_exhaustive()
    }
}

impl UsageAnalyzer {
    /// Compile the configured globs.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::InvalidGlob`] for a pattern that does not compile.
    pub fn new(config: UsageConfig) -> UsageResult<Self> {
        let include = build_globset(&config.include)?;
        let exclude = build_globset(&config.exclude)?;
        Ok(Self {
            config,
            include,
            exclude,
            report: None,
        })
    }

    /// The last computed report.
    #[must_use]
    pub fn report(&self) -> Option<Arc<UsageReport>> {
        self.report.clone()
    }

    /// Whether the report is missing or older than `generation`.
    #[must_use]
    pub fn is_stale(&self, generation: u64) -> bool {
        self.report
            .as_ref()
            .map_or(true, |report| report.is_stale(generation))
    }

    /// Rescan the project against the full descriptor list.
    ///
    /// Only imports of sources present in `descriptors` are counted. The scan
    /// runs on a blocking thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is missing or the scan task fails.
    pub async fn reindex(
        &mut self,
        descriptors: &[Arc<ResourceDescriptor>],
        generation: u64,
    ) -> UsageResult<Arc<UsageReport>> {
        if !self.config.root.exists() {
            return Err(UsageError::RootNotFound(self.config.root.clone()));
        }

        let scan = Scan {
            root: self.config.root.clone(),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            prefix: format!("{}/", self.config.package.trim_end_matches('/')),
            sources: descriptors.iter().map(|d| d.source.clone()).collect(),
        };

        let mut report = tokio::task::spawn_blocking(move || scan.run())
            .await
            .map_err(|e| UsageError::ScanAborted(e.to_string()))?;
        report.generation = generation;

        tracing::info!(
            generation,
            files = report.files_scanned,
            endpoints = report.by_endpoint.len(),
            datatypes = report.by_datatype.len(),
            "Usage index rebuilt"
        );

        let report = Arc::new(report);
        self.report = Some(Arc::clone(&report));
        Ok(report)
    }
}

struct Scan {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    prefix: String,
    sources: HashSet<String>,
}

impl Scan {
    fn run(&self) -> UsageReport {
        let mut report = UsageReport::default();

        for entry in WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable path");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = relative_path(&self.root, entry.path());
            if self.exclude.is_match(&relative) || !self.include.is_match(&relative) {
                continue;
            }

            let text = match std::fs::read_to_string(entry.path()) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(file = %relative, error = %e, "Skipping unreadable file");
                    continue;
                }
            };
            report.files_scanned += 1;

            for specifier in extract_specifiers(&text) {
                let Some(sub_path) = specifier.strip_prefix(&self.prefix) else {
                    continue;
                };
                let source = sub_path.split('/').next().unwrap_or_default();
                if self.sources.contains(source) {
                    report.record(&relative, sub_path);
                }
            }
        }

        report.generated_at = Utc::now();
        report
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn build_globset(patterns: &[String]) -> UsageResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| UsageError::InvalidGlob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| UsageError::InvalidGlob {
        pattern: patterns.join(", "),
        source,
    })
}
