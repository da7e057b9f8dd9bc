//! # apiforge-core
//!
//! Core logic for the apiforge daemon: resource descriptors derived from
//! OpenAPI documents and the in-memory search engine over them.
//!
//! This crate provides:
//! - The resource descriptor model (REST operations and schemas)
//! - A field-weighted full-text index with prefix and fuzzy matching
//! - The search service: intent detection, recency-blended ranking, pagination
//! - Project usage analysis of the generated client
//! - Sync coordination and on-disk descriptor storage
//!
//! ## Architecture
//!
//! - [`descriptor`] - Descriptor types and stable id derivation
//! - [`search`] - Index adapter, intent detection, ranking and the service
//! - [`usage`] - Import scanning of a consuming project
//! - [`sync`] - Per-key sync state machine
//! - [`store`] - Per-source descriptor files
//! - [`config`] - Layered configuration loading and validation
//! - [`clock`] - Injectable time source
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared API types

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod search;
pub mod store;
pub mod sync;
pub mod types;
pub mod usage;

// Re-export primary types for convenience
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    Config, ConfigError, ConfigResult, SearchConfig, ServerConfig, StorageConfig, SyncConfig,
    UsageConfig,
};
pub use descriptor::{
    HttpMethod, ResourceData, ResourceDescriptor, ResourceType, RestData, SchemaData, Variable,
    VariableLocation,
};
pub use error::{ApiforgeError, Result};
pub use search::{
    SearchError, SearchOptions, SearchService, SearchStats, SourceReplacement, SourceStats,
    UsageStats,
};
pub use store::{DescriptorStore, StoreError};
pub use sync::{SyncCoordinator, SyncError, SyncGuard, SyncState, ALL_SOURCES_KEY};
pub use types::{HealthResponse, SearchPage, SyncReport, SyncStatusResponse};
pub use usage::{UsageAnalyzer, UsageError, UsageReport, UsageSummary};
