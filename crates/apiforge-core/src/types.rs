//! Shared types and OpenAPI schemas.
//!
//! Response envelopes used by both the daemon and the CLI client live here.
//! Most other API types are defined next to the module that produces them
//! (descriptors, statistics, usage, sync state).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::descriptor::ResourceDescriptor;
use crate::sync::SyncState;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Service status.
    #[schema(example = "ok")]
    pub status: String,

    /// Service version.
    #[schema(example = "0.1.0")]
    pub version: String,

    /// Descriptors currently indexed.
    #[schema(example = 42)]
    pub descriptors: usize,
}

/// One page of ranked search results.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    /// Descriptors on this page, best match first.
    pub data: Vec<ResourceDescriptor>,

    /// Matches across all pages.
    #[schema(example = 42)]
    pub total: usize,

    /// 1-based page number.
    #[schema(example = 1)]
    pub page: usize,

    /// Page size that was applied.
    #[schema(example = 20)]
    pub limit: usize,

    /// Number of pages; zero when nothing matched.
    #[schema(example = 3)]
    pub total_pages: usize,

    /// Whether a later page exists.
    pub has_next: bool,

    /// Whether an earlier page exists.
    pub has_previous: bool,
}

impl SearchPage {
    /// Wrap one page of results. `limit` must be non-zero.
    #[must_use]
    pub fn new(data: Vec<ResourceDescriptor>, total: usize, page: usize, limit: usize) -> Self {
        let total_pages = total.div_ceil(limit.max(1));
        Self {
            data,
            total,
            page,
            limit,
            total_pages,
            has_next: page < total_pages,
            has_previous: page > 1,
        }
    }
}

/// Outcome of a completed sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "key": "petstore",
    "runId": "6f1c1d0e-4c3a-4e0b-9a52-0b8f6b3f5e21",
    "sources": ["petstore"],
    "removed": 12,
    "added": 14,
    "total": 14
}))]
pub struct SyncReport {
    /// Sync key: a source id or `all`.
    pub key: String,
    /// Identifier of the run.
    pub run_id: Uuid,
    /// Sources that were reloaded.
    pub sources: Vec<String>,
    /// Descriptors dropped.
    pub removed: usize,
    /// Descriptors indexed.
    pub added: usize,
    /// Descriptors held after the run.
    pub total: usize,
}

/// State of one sync key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncStatusResponse {
    /// Source id or `all`.
    #[schema(example = "all")]
    pub key: String,

    /// Current state of the key.
    pub status: SyncState,
}
