//! HTTP-level tests for the apiforge daemon.

use std::collections::BTreeMap;
use std::sync::Arc;

use apiforge_core::{
    Config, DescriptorStore, FixedClock, HttpMethod, ResourceDescriptor, RestData, SchemaData,
};
use apiforge_server::api::create_router;
use apiforge_server::state::AppState;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use tempfile::TempDir;

fn rest(operation: &str, method: HttpMethod, url: &str, response: Option<&str>) -> ResourceDescriptor {
    ResourceDescriptor::rest(
        "petstore",
        RestData {
            method,
            url: url.to_string(),
            operation_id: operation.to_string(),
            tags: vec!["users".to_string()],
            variables: Vec::new(),
            request_body: None,
            response: response.map(str::to_string),
            content_type: None,
            response_type: None,
            summary: String::new(),
            description: String::new(),
            examples: None,
            errors: BTreeMap::new(),
        },
    )
}

fn schema(name: &str) -> ResourceDescriptor {
    ResourceDescriptor::schema(
        "petstore",
        SchemaData {
            name: name.to_string(),
            schema: json!({"type": "object"}),
        },
    )
}

fn petstore() -> Vec<ResourceDescriptor> {
    vec![
        rest("getUser", HttpMethod::Get, "/api/users/{id}", Some("User")),
        rest("listUsers", HttpMethod::Get, "/api/users", Some("User")),
        rest("createUser", HttpMethod::Post, "/api/users", Some("User")),
        rest("deleteUser", HttpMethod::Delete, "/api/users/{id}", None),
        schema("User"),
    ]
}

struct Harness {
    server: TestServer,
    state: AppState,
    dir: TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("project");
    std::fs::create_dir_all(project.join("src")).unwrap();

    let mut config = Config::default();
    config.storage.data_dir = dir.path().join("data");
    config.usage.root = project;

    DescriptorStore::new(config.descriptors_dir())
        .save("petstore", &petstore())
        .await
        .unwrap();

    let clock = Arc::new(FixedClock::new(1_736_899_200_000));
    let state = AppState::with_clock(config, clock).unwrap();
    state.sync(None).await.unwrap();

    let server = TestServer::new(create_router(state.clone())).unwrap();
    Harness { server, state, dir }
}

fn ids(page: &Value) -> Vec<String> {
    page["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health_reports_descriptor_count() {
    let h = harness().await;

    let response = h.server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["descriptors"], 5);
}

#[tokio::test]
async fn test_search_envelope_and_pagination() {
    let h = harness().await;

    let response = h
        .server
        .get("/api/data/search")
        .add_query_param("size", 2)
        .add_query_param("page", 2)
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["total"], 5);
    assert_eq!(body["page"], 2);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["totalPages"], 3);
    assert_eq!(body["hasNext"], true);
    assert_eq!(body["hasPrevious"], true);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_pages_cover_results_once() {
    let h = harness().await;

    let mut seen = Vec::new();
    for page in 1..=3 {
        let body: Value = h
            .server
            .get("/api/data/search")
            .add_query_param("size", 2)
            .add_query_param("page", page)
            .await
            .json();
        seen.extend(ids(&body));
    }

    let all: Value = h.server.get("/api/data/search").await.json();
    assert_eq!(seen, ids(&all));
}

#[tokio::test]
async fn test_search_filters_and_intent() {
    let h = harness().await;

    let schemas: Value = h
        .server
        .get("/api/data/search")
        .add_query_param("type", "schema")
        .await
        .json();
    assert_eq!(ids(&schemas), vec!["User"]);

    let posts: Value = h
        .server
        .get("/api/data/search")
        .add_query_param("query", "POST users")
        .await
        .json();
    assert_eq!(ids(&posts), vec!["createUser"]);

    let hook: Value = h
        .server
        .get("/api/data/search")
        .add_query_param("query", "useGetUser")
        .await
        .json();
    assert_eq!(ids(&hook)[0], "getUser");
}

#[tokio::test]
async fn test_package_filter_accepts_plain_and_qualified_paths() {
    let h = harness().await;

    for pkg in ["users", "petstore/users", "petstore"] {
        let body: Value = h
            .server
            .get("/api/data/search")
            .add_query_param("pkg", pkg)
            .await
            .json();
        assert_eq!(body["total"], 4, "pkg={pkg}");
        assert!(!ids(&body).contains(&"User".to_string()));
    }

    let other: Value = h
        .server
        .get("/api/data/search")
        .add_query_param("pkg", "billing/users")
        .await
        .json();
    assert_eq!(other["total"], 0);
}

#[tokio::test]
async fn test_default_page_size_is_twenty() {
    let h = harness().await;

    let body: Value = h.server.get("/api/data/search").await.json();
    assert_eq!(body["limit"], 20);
    assert_eq!(body["totalPages"], 1);
}

#[tokio::test]
async fn test_search_without_matches_is_empty_page() {
    let h = harness().await;

    let response = h
        .server
        .get("/api/data/search")
        .add_query_param("query", "zzzqqq")
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["total"], 0);
    assert_eq!(body["totalPages"], 0);
    assert!(body["data"].as_array().unwrap().is_empty());

    let unknown_type: Value = h
        .server
        .get("/api/data/search")
        .add_query_param("type", "graphql")
        .await
        .json();
    assert_eq!(unknown_type["total"], 0);
}

#[tokio::test]
async fn test_invalid_page_and_size_are_rejected() {
    let h = harness().await;

    for (param, value) in [("page", 0), ("size", 0), ("size", 101)] {
        let response = h
            .server
            .get("/api/data/search")
            .add_query_param(param, value)
            .expect_failure()
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    let body: Value = h
        .server
        .get("/api/data/search")
        .add_query_param("page", 0)
        .expect_failure()
        .await
        .json();
    assert_eq!(body["error"], "invalid_page");
}

#[tokio::test]
async fn test_get_descriptor_and_not_found() {
    let h = harness().await;
    let id = petstore()[0].id.clone();

    let response = h.server.get(&format!("/api/data/{id}")).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["name"], "getUser");
    assert_eq!(body["type"], "rest");
    assert_eq!(body["data"]["method"], "GET");

    let missing = h.server.get("/api/data/does-not-exist").expect_failure().await;
    missing.assert_status(StatusCode::NOT_FOUND);
    let body: Value = missing.json();
    assert_eq!(body["error"], "descriptor_not_found");
}

#[tokio::test]
async fn test_touch_feeds_recent() {
    let h = harness().await;
    let id = petstore()[3].id.clone();

    let empty: Value = h.server.get("/api/data/recent").await.json();
    assert!(empty.as_array().unwrap().is_empty());

    let touched: Value = h.server.post(&format!("/api/data/{id}/touch")).await.json();
    assert_eq!(touched["lastAccessed"], 1_736_899_200_000_i64);

    let recent: Value = h.server.get("/api/data/recent").await.json();
    assert_eq!(recent[0]["id"], id.as_str());

    h.server
        .post("/api/data/unknown/touch")
        .expect_failure()
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sync_reloads_changed_source() {
    let h = harness().await;

    let store = h.state.store().clone();
    store
        .save("petstore", &[schema("User"), schema("Pet")])
        .await
        .unwrap();

    let response = h
        .server
        .post("/api/sync")
        .json(&json!({"source": "petstore"}))
        .await;
    response.assert_status_ok();

    let report: Value = response.json();
    assert_eq!(report["key"], "petstore");
    assert_eq!(report["removed"], 5);
    assert_eq!(report["added"], 2);
    assert_eq!(report["total"], 2);

    let status: Value = h.server.get("/api/sync/petstore").await.json();
    assert_eq!(status["status"]["state"], "done");

    let idle: Value = h.server.get("/api/sync/billing").await.json();
    assert_eq!(idle["status"]["state"], "idle");
}

#[tokio::test]
async fn test_sync_all_drops_deleted_sources() {
    let h = harness().await;

    std::fs::remove_file(h.state.store().dir().join("petstore.json")).unwrap();

    let report: Value = h.server.post("/api/sync").json(&json!({})).await.json();
    assert_eq!(report["key"], "all");
    assert_eq!(report["total"], 0);
}

#[tokio::test]
async fn test_concurrent_sync_conflicts() {
    let h = harness().await;
    let _running = h.state.sync_coordinator().begin("petstore").unwrap();

    let response = h
        .server
        .post("/api/sync")
        .json(&json!({"source": "petstore"}))
        .expect_failure()
        .await;
    response.assert_status(StatusCode::CONFLICT);

    let body: Value = response.json();
    assert_eq!(body["error"], "sync_in_progress");
    assert_eq!(body["details"]["key"], "petstore");

    // Syncing everything is a separate key.
    h.server
        .post("/api/sync")
        .json(&json!({}))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_sync_unknown_and_invalid_sources() {
    let h = harness().await;

    h.server
        .post("/api/sync")
        .json(&json!({"source": "billing"}))
        .expect_failure()
        .await
        .assert_status(StatusCode::NOT_FOUND);

    h.server
        .post("/api/sync")
        .json(&json!({"source": "../etc"}))
        .expect_failure()
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_usage_reindex_and_stats() {
    let h = harness().await;

    std::fs::write(
        h.dir.path().join("project/src/profile.ts"),
        "import { getUser } from '@apiforge/client/petstore/users/getUser';\n\
         import type { User } from '@apiforge/client/petstore/components/User';\n",
    )
    .unwrap();

    let response = h.server.post("/api/usage/reindex").await;
    response.assert_status_ok();
    let summary: Value = response.json();
    assert_eq!(summary["filesScanned"], 1);
    assert_eq!(summary["endpoints"], 1);
    assert_eq!(summary["datatypes"], 1);

    let stats: Value = h
        .server
        .get("/api/data/stats")
        .add_query_param("usage", true)
        .await
        .json();
    assert_eq!(stats["total"], 5);
    assert_eq!(stats["restCount"], 4);
    assert_eq!(stats["schemaCount"], 1);
    assert_eq!(stats["usage"]["usedEndpoints"], 1);

    let plain: Value = h.server.get("/api/data/stats").await.json();
    assert!(plain.get("usage").map_or(true, Value::is_null));
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let h = harness().await;

    let response = h.server.get("/api/openapi.json").await;
    response.assert_status_ok();

    let spec: Value = response.json();
    assert_eq!(spec["info"]["title"], "apiforge API");
    assert!(spec["paths"]["/api/data/search"].is_object());
}
