//! Descriptor search API endpoints.
//!
//! The search facade turns 1-based `page`/`size` query parameters into the
//! explicit offset and limit the search service expects, and wraps one page
//! of ranked descriptors in a pagination envelope.

use std::sync::Arc;

use apiforge_core::{ResourceDescriptor, ResourceType, SearchOptions, SearchPage, SearchStats};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{debug, warn};
use utoipa::IntoParams;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

const DEFAULT_PAGE: usize = 1;
const DEFAULT_PAGE_SIZE: usize = 20;
const DEFAULT_RECENT_LIMIT: usize = 10;

/// Creates the data router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/search", get(search))
        .route("/recent", get(get_recent))
        .route("/stats", get(get_stats))
        .route("/{id}", get(get_descriptor))
        .route("/{id}/touch", post(touch_descriptor))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for the search endpoint.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Free text, a URL path, a `useXxx` hook name or `METHOD text`.
    /// Omit to list every descriptor.
    #[param(example = "get user")]
    pub query: Option<String>,

    /// 1-based page number.
    #[param(example = 1, minimum = 1)]
    pub page: Option<usize>,

    /// Page size (default 20), at most the configured maximum (100 by default).
    #[param(example = 20, minimum = 1)]
    pub size: Option<usize>,

    /// Restrict to `rest` or `schema` descriptors.
    #[serde(rename = "type")]
    #[param(example = "rest")]
    pub resource_type: Option<String>,

    /// Restrict to one source.
    #[param(example = "petstore")]
    pub source: Option<String>,

    /// Restrict to a tag path (`users`) or a source-qualified one
    /// (`petstore/users`), including anything nested under it.
    #[param(example = "petstore/users")]
    pub pkg: Option<String>,
}

/// Query parameters for the recent endpoint.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecentQuery {
    /// Maximum descriptors to return (default 10).
    #[param(example = 10, minimum = 1)]
    pub limit: Option<usize>,
}

/// Query parameters for the stats endpoint.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    /// Include project usage counts, rescanning if descriptors changed.
    #[param(example = true)]
    #[serde(default)]
    pub usage: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Search descriptors.
#[utoipa::path(
    get,
    path = "/api/data/search",
    tag = "data",
    operation_id = "searchDescriptors",
    summary = "Search REST operations and schemas",
    description = "Ranks descriptors by field-weighted relevance blended with recency of \
        access. An exact URL path or operation name is always returned first. A query \
        of the form `useGetUser` searches for `getUser`; `GET users` restricts to GET \
        operations. Without `query` every descriptor is listed.",
    params(SearchQuery),
    responses(
        (status = 200, description = "One page of results", body = SearchPage),
        (status = 400, description = "Invalid page or size", body = ErrorResponse)
    )
)]
pub async fn search(
    State(state): State<SharedState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchPage>> {
    let max_page_size = state.config().search.max_page_size;
    let page = query.page.unwrap_or(DEFAULT_PAGE);
    let limit = query.size.unwrap_or(DEFAULT_PAGE_SIZE);
    validate_window(page, limit, max_page_size)?;

    let resource_type = match query.resource_type.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<ResourceType>() {
            Ok(resource_type) => Some(resource_type),
            Err(e) => {
                debug!(error = %e, "Unknown type filter, returning no results");
                return Ok(Json(SearchPage::new(Vec::new(), 0, page, limit)));
            }
        },
    };

    let text = query.query.unwrap_or_default();
    let options = SearchOptions {
        resource_type,
        package: query.pkg,
        source: query.source,
        offset: (page - 1).saturating_mul(limit),
        limit: Some(limit),
        ..SearchOptions::default()
    };

    let search = state.search().await;
    let total = search.get_total_count(&text, &options);
    let data = owned(search.search(&text, &options));
    drop(search);

    debug!(query = %text, page, limit, total, "Search served");
    Ok(Json(SearchPage::new(data, total, page, limit)))
}

/// Get one descriptor.
#[utoipa::path(
    get,
    path = "/api/data/{id}",
    tag = "data",
    operation_id = "getDescriptor",
    summary = "Get a descriptor by id",
    params(("id" = String, Path, description = "Descriptor id")),
    responses(
        (status = 200, description = "The descriptor", body = ResourceDescriptor),
        (status = 404, description = "Unknown id", body = ErrorResponse)
    )
)]
pub async fn get_descriptor(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResourceDescriptor>> {
    state
        .search()
        .await
        .get_by_id(&id)
        .map(|descriptor| Json(ResourceDescriptor::clone(&descriptor)))
        .ok_or_else(|| not_found(&id))
}

/// Mark a descriptor as accessed now.
#[utoipa::path(
    post,
    path = "/api/data/{id}/touch",
    tag = "data",
    operation_id = "touchDescriptor",
    summary = "Record an access to a descriptor",
    description = "Stamps the descriptor with the current time so it ranks higher in \
        later searches and appears in the recent list.",
    params(("id" = String, Path, description = "Descriptor id")),
    responses(
        (status = 200, description = "The touched descriptor", body = ResourceDescriptor),
        (status = 404, description = "Unknown id", body = ErrorResponse)
    )
)]
pub async fn touch_descriptor(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResourceDescriptor>> {
    state
        .search_mut()
        .await
        .touch_descriptor(&id)?
        .map(|descriptor| Json(ResourceDescriptor::clone(&descriptor)))
        .ok_or_else(|| not_found(&id))
}

/// Recently accessed descriptors.
#[utoipa::path(
    get,
    path = "/api/data/recent",
    tag = "data",
    operation_id = "getRecentDescriptors",
    summary = "List recently accessed descriptors",
    params(RecentQuery),
    responses(
        (status = 200, description = "Newest access first", body = Vec<ResourceDescriptor>),
        (status = 400, description = "Invalid limit", body = ErrorResponse)
    )
)]
pub async fn get_recent(
    State(state): State<SharedState>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Json<Vec<ResourceDescriptor>>> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    validate_window(DEFAULT_PAGE, limit, state.config().search.max_page_size)?;

    let recent = state.search().await.get_recent(limit);
    Ok(Json(owned(recent)))
}

/// Aggregate statistics.
#[utoipa::path(
    get,
    path = "/api/data/stats",
    tag = "data",
    operation_id = "getStats",
    summary = "Get descriptor statistics",
    description = "Counts descriptors per type, source and controller. With `usage=true` \
        the counts are joined with the project usage scan; if the scan cannot run the \
        usage fields are omitted.",
    params(StatsQuery),
    responses(
        (status = 200, description = "Statistics", body = SearchStats)
    )
)]
pub async fn get_stats(
    State(state): State<SharedState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<SearchStats>> {
    let report = if query.usage {
        match state.usage_report(false).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Usage scan failed, returning stats without usage");
                None
            }
        }
    } else {
        None
    };

    let stats = state.search().await.stats(report.as_deref());
    Ok(Json(stats))
}

// ============================================================================
// Helpers
// ============================================================================

fn validate_window(page: usize, size: usize, max_page_size: usize) -> ApiResult<()> {
    if page == 0 {
        return Err(ApiError::bad_request("invalid_page", "page must be at least 1"));
    }
    if size == 0 || size > max_page_size {
        return Err(ApiError::bad_request(
            "invalid_page_size",
            format!("size must be between 1 and {max_page_size}"),
        ));
    }
    Ok(())
}

fn owned(descriptors: Vec<Arc<ResourceDescriptor>>) -> Vec<ResourceDescriptor> {
    descriptors
        .iter()
        .map(|descriptor| descriptor.as_ref().clone())
        .collect()
}

fn not_found(id: &str) -> ApiError {
    ApiError::not_found("descriptor_not_found", format!("No descriptor with id '{id}'"))
}
