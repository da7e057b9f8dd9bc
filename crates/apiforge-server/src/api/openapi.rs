//! OpenAPI specification for the apiforge daemon.
//!
//! Served at `/api/openapi.json` next to Swagger UI, and written to the
//! workspace root by the `gen-openapi` binary.

use apiforge_core::{
    HealthResponse, HttpMethod, ResourceData, ResourceDescriptor, ResourceType, RestData,
    SchemaData, SearchPage, SearchStats, SourceStats, SyncReport, SyncState, SyncStatusResponse,
    UsageStats, UsageSummary, Variable, VariableLocation,
};
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::sync::SyncRequest;

/// Returns the OpenAPI specification as pretty JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for apiforge.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "apiforge API",
        version = "0.1.0",
        description = r#"
# apiforge API

apiforge indexes the REST operations and data schemas of your OpenAPI
sources and lets editors, documentation tools and the `apiforge` CLI find
them quickly.

## Searching

- Plain text ranks by name, operation id, URL, summary and referenced schemas.
- An exact URL path (`/api/users/{id}`) or operation name comes first.
- `useGetUser` searches for the `getUser` operation.
- `POST users` restricts results to POST operations.

Results are blended with how recently a descriptor was opened; record an
access with `touchDescriptor`.

## Syncing

An external pipeline writes one descriptor file per source. `startSync`
reloads one source or all of them without interrupting searches.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local apiforge daemon")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "data", description = "Descriptor search, lookup and statistics"),
        (name = "sync", description = "Reloading descriptors from the sync pipeline"),
        (name = "usage", description = "Import usage of the generated client in a project")
    ),
    paths(
        super::health::health_check,
        super::data::search,
        super::data::get_descriptor,
        super::data::touch_descriptor,
        super::data::get_recent,
        super::data::get_stats,
        super::sync::start_sync,
        super::sync::get_sync_status,
        super::usage::reindex_usage,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            // Descriptor model
            ResourceDescriptor,
            ResourceData,
            ResourceType,
            RestData,
            SchemaData,
            HttpMethod,
            Variable,
            VariableLocation,
            // Search
            SearchPage,
            SearchStats,
            SourceStats,
            UsageStats,
            UsageSummary,
            // Sync
            SyncRequest,
            SyncReport,
            SyncState,
            SyncStatusResponse,
        )
    )
)]
pub struct ApiDoc;
