//! Project usage API endpoint.

use apiforge_core::UsageSummary;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the usage router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/reindex", post(reindex_usage))
}

/// Rescan the project for imports of the generated client.
#[utoipa::path(
    post,
    path = "/api/usage/reindex",
    tag = "usage",
    operation_id = "reindexUsage",
    summary = "Rescan project usage",
    description = "Walks the configured project root and counts which sources, \
        controllers, endpoints and schemas of the generated client are imported. \
        Usage only feeds statistics and never affects ranking.",
    responses(
        (status = 200, description = "Scan finished", body = UsageSummary),
        (status = 422, description = "Invalid include or exclude glob", body = ErrorResponse),
        (status = 500, description = "Project root missing or scan failed", body = ErrorResponse)
    )
)]
pub async fn reindex_usage(State(state): State<SharedState>) -> ApiResult<Json<UsageSummary>> {
    let report = state.usage_report(true).await?;
    Ok(Json(report.summary()))
}
