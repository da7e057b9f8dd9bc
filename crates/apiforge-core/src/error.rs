//! Unified error types for the apiforge core library.
//!
//! [`ApiforgeError`] covers every failure mode the daemon can surface. Each
//! module also keeps its own error type ([`ConfigError`], [`SearchError`],
//! [`SyncError`], [`StoreError`], [`UsageError`]) which converts into it.
//!
//! Not-found conditions are deliberately absent: lookups return `Option`
//! and searches return empty results.
//!
//! # Example
//!
//! ```rust
//! use apiforge_core::error::{ApiforgeError, Result};
//!
//! fn check_source(id: &str) -> Result<()> {
//!     if id.is_empty() {
//!         return Err(ApiforgeError::InvalidSourceId(id.to_string()));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! [`ConfigError`]: crate::config::ConfigError
//! [`SearchError`]: crate::search::SearchError
//! [`SyncError`]: crate::sync::SyncError
//! [`StoreError`]: crate::store::StoreError
//! [`UsageError`]: crate::usage::UsageError

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all apiforge operations.
#[derive(Debug, Error)]
pub enum ApiforgeError {
    // =========================================================================
    // SEARCH ERRORS
    // =========================================================================
    /// The search service was constructed with unusable ranking parameters.
    #[error("Invalid search configuration: {0}")]
    InvalidSearchConfig(String),

    /// A descriptor id was re-added with a different resource type.
    #[error(
        "Descriptor '{id}' is a {existing} and cannot become a {requested}. Remove it before re-adding."
    )]
    DescriptorTypeChanged {
        /// Descriptor id.
        id: String,
        /// Type currently stored.
        existing: String,
        /// Type that was offered.
        requested: String,
    },

    /// The search index failed to write, commit or execute a query.
    #[error("Search index error: {0}")]
    SearchIndexFailed(String),

    // =========================================================================
    // SYNC ERRORS
    // =========================================================================
    /// A sync for the same key is still running.
    #[error("Sync already in progress for '{0}'. Wait for it to finish and retry.")]
    SyncInProgress(String),

    // =========================================================================
    // STORAGE ERRORS
    // =========================================================================
    /// A source id is not a safe file name.
    #[error(
        "Invalid source id: '{0}'. Use letters, digits, '.', '_' or '-', starting with a letter or digit."
    )]
    InvalidSourceId(String),

    /// No descriptor file exists for a source.
    #[error("No descriptors stored for source '{0}'. Run a sync for it first.")]
    SourceNotFound(String),

    /// A descriptor file exists but is not a valid descriptor list.
    #[error("Malformed descriptor file: {0}")]
    MalformedDescriptors(String),

    // =========================================================================
    // USAGE ERRORS
    // =========================================================================
    /// An include/exclude glob does not compile.
    #[error("Invalid usage glob: {0}")]
    InvalidGlob(String),

    /// The project scan could not run.
    #[error("Usage scan failed: {0}")]
    UsageScanFailed(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for apiforge operations.
pub type Result<T> = std::result::Result<T, ApiforgeError>;

impl ApiforgeError {
    /// Returns `true` if this error came from the search service.
    #[inline]
    #[must_use]
    pub const fn is_search_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSearchConfig(_)
                | Self::DescriptorTypeChanged { .. }
                | Self::SearchIndexFailed(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_)
                | Self::ConfigParseError(_)
                | Self::ConfigValidationError(_)
                | Self::InvalidSearchConfig(_)
                | Self::InvalidGlob(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(
            self,
            Self::PersistenceError(_) | Self::IoError(_) | Self::MalformedDescriptors(_)
        )
    }

    /// Returns `true` if this error represents an expected operational state
    /// rather than a failure.
    #[inline]
    #[must_use]
    pub const fn is_expected_state(&self) -> bool {
        matches!(self, Self::SyncInProgress(_))
    }

    /// Returns `true` if retrying later may succeed without user action.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::SyncInProgress(_) | Self::UsageScanFailed(_))
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidSourceId(_) => 400,

            // 404 Not Found
            Self::ConfigNotFound(_) | Self::SourceNotFound(_) => 404,

            // 409 Conflict - competing state
            Self::SyncInProgress(_) | Self::DescriptorTypeChanged { .. } => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::InvalidSearchConfig(_)
            | Self::InvalidGlob(_)
            | Self::ConfigParseError(_)
            | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::MalformedDescriptors(_)
            | Self::SearchIndexFailed(_)
            | Self::UsageScanFailed(_)
            | Self::PersistenceError(_)
            | Self::IoError(_) => 500,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidSearchConfig(_) => "INVALID_SEARCH_CONFIG",
            Self::DescriptorTypeChanged { .. } => "DESCRIPTOR_TYPE_CHANGED",
            Self::SearchIndexFailed(_) => "SEARCH_INDEX_FAILED",
            Self::SyncInProgress(_) => "SYNC_IN_PROGRESS",
            Self::InvalidSourceId(_) => "INVALID_SOURCE_ID",
            Self::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            Self::MalformedDescriptors(_) => "MALFORMED_DESCRIPTORS",
            Self::InvalidGlob(_) => "INVALID_GLOB",
            Self::UsageScanFailed(_) => "USAGE_SCAN_FAILED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for ApiforgeError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path.into()),
            ConfigError::LoadError(e) => Self::ConfigParseError(e.to_string()),
            e @ ConfigError::ValidationError { .. } => Self::ConfigValidationError(e.to_string()),
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
            ConfigError::NoPlatformDirs => {
                Self::ConfigParseError(ConfigError::NoPlatformDirs.to_string())
            }
        }
    }
}

impl From<crate::search::SearchError> for ApiforgeError {
    fn from(err: crate::search::SearchError) -> Self {
        use crate::search::SearchError;
        match err {
            SearchError::InvalidConfig(message) => Self::InvalidSearchConfig(message),
            SearchError::TypeChanged {
                id,
                existing,
                requested,
            } => Self::DescriptorTypeChanged {
                id,
                existing: existing.to_string(),
                requested: requested.to_string(),
            },
            SearchError::Index(message) => Self::SearchIndexFailed(message),
        }
    }
}

impl From<crate::sync::SyncError> for ApiforgeError {
    fn from(err: crate::sync::SyncError) -> Self {
        use crate::sync::SyncError;
        match err {
            SyncError::AlreadyInProgress { key } => Self::SyncInProgress(key),
        }
    }
}

impl From<crate::store::StoreError> for ApiforgeError {
    fn from(err: crate::store::StoreError) -> Self {
        use crate::store::StoreError;
        match err {
            StoreError::InvalidSource(source) => Self::InvalidSourceId(source),
            StoreError::SourceNotFound(source) => Self::SourceNotFound(source),
            StoreError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {}: {source}", path.display()))
            }
            StoreError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {source}", path.display()))
            }
            StoreError::ParseError { path, source } => Self::MalformedDescriptors(format!(
                "{}: {source}",
                path.display()
            )),
            StoreError::SerializeError(e) => Self::PersistenceError(e.to_string()),
        }
    }
}

impl From<crate::usage::UsageError> for ApiforgeError {
    fn from(err: crate::usage::UsageError) -> Self {
        use crate::usage::UsageError;
        match err {
            e @ UsageError::InvalidGlob { .. } => Self::InvalidGlob(e.to_string()),
            e @ (UsageError::RootNotFound(_) | UsageError::ScanAborted(_)) => {
                Self::UsageScanFailed(e.to_string())
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
