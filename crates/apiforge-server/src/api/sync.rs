//! Sync API endpoints.
//!
//! A sync re-reads descriptor files written by the external pipeline and
//! swaps them into the search index. At most one run per key is allowed.

use apiforge_core::{SyncReport, SyncStatusResponse};
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the sync router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(start_sync))
        .route("/{key}", get(get_sync_status))
}

/// Request body for a sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"source": "petstore"}))]
pub struct SyncRequest {
    /// Source to reload. Omit to reload every source.
    #[serde(default)]
    #[schema(example = "petstore")]
    pub source: Option<String>,
}

/// Reload descriptors.
#[utoipa::path(
    post,
    path = "/api/sync",
    tag = "sync",
    operation_id = "startSync",
    summary = "Reload descriptors for one source or all",
    description = "Reads the descriptor files of one source (or every source) and replaces \
        the indexed descriptors. Fails with 409 while another run holds the same key; \
        syncing one source and syncing all are independent keys.",
    request_body = SyncRequest,
    responses(
        (status = 200, description = "Sync finished", body = SyncReport),
        (status = 400, description = "Invalid source id", body = ErrorResponse),
        (status = 404, description = "No descriptor file for the source", body = ErrorResponse),
        (status = 409, description = "A sync for this key is in progress", body = ErrorResponse)
    )
)]
pub async fn start_sync(
    State(state): State<SharedState>,
    Json(request): Json<SyncRequest>,
) -> ApiResult<Json<SyncReport>> {
    let report = state.sync(request.source.as_deref()).await?;
    Ok(Json(report))
}

/// Sync state of a key.
#[utoipa::path(
    get,
    path = "/api/sync/{key}",
    tag = "sync",
    operation_id = "getSyncStatus",
    summary = "Get the sync state of a source or of `all`",
    params(("key" = String, Path, description = "Source id or `all`")),
    responses(
        (status = 200, description = "Current state", body = SyncStatusResponse)
    )
)]
pub async fn get_sync_status(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> Json<SyncStatusResponse> {
    let status = state.sync_coordinator().state(&key);
    Json(SyncStatusResponse { key, status })
}
