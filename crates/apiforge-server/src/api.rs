//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `health` - Service health checks
//! - `data` - Descriptor search, lookup, recency and statistics
//! - `sync` - Reloading descriptors from the sync pipeline
//! - `usage` - Project usage scanning
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

pub mod data;
pub mod error;
pub mod health;
pub mod openapi;
pub mod sync;
pub mod usage;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::{get_openapi_json, ApiDoc};

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                   - Health check
/// /swagger-ui               - Interactive API documentation
/// /api
/// ├── /data/search          - Ranked, paginated search
/// ├── /data/recent          - Recently accessed descriptors
/// ├── /data/stats           - Aggregate statistics
/// ├── /data/{id}            - Descriptor lookup
/// ├── /data/{id}/touch      - Record an access
/// ├── /sync                 - Reload descriptors
/// ├── /sync/{key}           - Sync state
/// ├── /usage/reindex        - Rescan project usage
/// └── /openapi.json         - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    let cors = if state.config().server.cors_allow_any {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .nest("/data", data::router())
                .nest("/sync", sync::router())
                .nest("/usage", usage::router()),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}
