//! Behavioural scenarios for the search service.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::*;
use crate::clock::FixedClock;
use crate::config::SearchConfig;
use crate::descriptor::{HttpMethod, ResourceDescriptor, ResourceType, RestData, SchemaData};
use crate::usage::UsageReport;

const HOUR: i64 = 3_600_000;
const NOW: i64 = 1_000 * HOUR;

fn rest(source: &str, operation: &str, method: HttpMethod, url: &str, tag: &str) -> ResourceDescriptor {
    ResourceDescriptor::rest(
        source,
        RestData {
            method,
            url: url.to_string(),
            operation_id: operation.to_string(),
            tags: vec![tag.to_string()],
            variables: Vec::new(),
            request_body: None,
            response: None,
            content_type: None,
            response_type: None,
            summary: String::new(),
            description: String::new(),
            examples: None,
            errors: BTreeMap::new(),
        },
    )
}

fn with_text(mut descriptor: ResourceDescriptor, summary: &str, description: &str) -> ResourceDescriptor {
    if let crate::descriptor::ResourceData::Rest(data) = &mut descriptor.data {
        data.summary = summary.to_string();
        data.description = description.to_string();
    }
    descriptor
}

fn with_response(mut descriptor: ResourceDescriptor, schema: &str) -> ResourceDescriptor {
    if let crate::descriptor::ResourceData::Rest(data) = &mut descriptor.data {
        data.response = Some(schema.to_string());
    }
    descriptor
}

fn schema(source: &str, name: &str) -> ResourceDescriptor {
    ResourceDescriptor::schema(
        source,
        SchemaData {
            name: name.to_string(),
            schema: serde_json::json!({"type": "object"}),
        },
    )
}

fn service_with(config: SearchConfig) -> (SearchService, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(NOW));
    let service = SearchService::with_clock(config, clock.clone()).unwrap();
    (service, clock)
}

fn service() -> (SearchService, Arc<FixedClock>) {
    service_with(SearchConfig::default())
}

fn load(service: &mut SearchService, descriptors: Vec<ResourceDescriptor>) {
    for descriptor in descriptors {
        service.add_descriptor(descriptor).unwrap();
    }
}

fn names(results: &[Arc<ResourceDescriptor>]) -> Vec<&str> {
    results.iter().map(|d| d.name.as_str()).collect()
}

fn files(paths: &[&str]) -> BTreeSet<String> {
    paths.iter().map(|p| (*p).to_string()).collect()
}

fn all() -> SearchOptions {
    SearchOptions {
        limit: Some(1_000),
        ..SearchOptions::default()
    }
}

fn users() -> Vec<ResourceDescriptor> {
    vec![
        rest("petstore", "listUsers", HttpMethod::Get, "/api/users", "users"),
        rest("petstore", "getUser", HttpMethod::Get, "/api/users/{id}", "users"),
        rest("petstore", "createUser", HttpMethod::Post, "/api/users", "users"),
        rest("petstore", "getUserSettings", HttpMethod::Get, "/api/users/{id}/settings", "users"),
        rest("petstore", "listPets", HttpMethod::Get, "/api/pets", "pets"),
        schema("petstore", "User"),
    ]
}

// =============================================================================
// FIELD WEIGHTING
// =============================================================================

#[test]
fn test_identifier_match_outranks_description_match() {
    let (mut service, _) = service();
    load(
        &mut service,
        vec![
            with_text(
                rest("petstore", "fetchProfile", HttpMethod::Get, "/api/profile", "profile"),
                "",
                "Returns the user profile for the session",
            ),
            rest("petstore", "getUser", HttpMethod::Get, "/api/accounts/{id}", "accounts"),
        ],
    );

    let results = service.search("user", &all());
    assert_eq!(names(&results), vec!["getUser", "fetchProfile"]);
}

// =============================================================================
// INTENT
// =============================================================================

#[test]
fn test_exact_path_beats_recency() {
    let (mut service, clock) = service();
    load(&mut service, users());

    let list = service.search("listUsers", &all())[0].id.clone();
    service.touch_descriptor(&list).unwrap();
    clock.advance(1_000);

    let results = service.search("/api/users/{id}", &all());
    assert_eq!(results[0].name, "getUser");

    // A path inside a method query still pins.
    let results = service.search("GET /api/users/{id}", &all());
    assert_eq!(results[0].name, "getUser");
}

#[test]
fn test_method_intent_filters_to_method() {
    let (mut service, _) = service();
    load(&mut service, users());

    let results = service.search("POST user", &all());
    assert_eq!(names(&results), vec!["createUser"]);

    let results = service.search("get", &all());
    assert_eq!(results.len(), 4);
    assert!(results
        .iter()
        .all(|d| d.as_rest().is_some_and(|r| r.method == HttpMethod::Get)));
}

#[test]
fn test_method_intent_miss_is_empty_by_default() {
    let (mut service, _) = service();
    load(&mut service, users());

    assert!(service.search("DELETE user", &all()).is_empty());
    assert_eq!(service.get_total_count("DELETE user", &all()), 0);
}

#[test]
fn test_method_intent_fallback_when_enabled() {
    let (mut service, _) = service_with(SearchConfig {
        method_intent_fallback: true,
        ..SearchConfig::default()
    });
    load(&mut service, users());

    let results = service.search("DELETE user", &all());
    assert!(!results.is_empty());
    // A hit for the method still filters.
    let results = service.search("POST user", &all());
    assert_eq!(names(&results), vec!["createUser"]);
}

#[test]
fn test_hook_name_resolves_to_operation() {
    let (mut service, clock) = service();
    load(&mut service, users());

    let settings = service.search("getUserSettings", &all())[0].id.clone();
    service.touch_descriptor(&settings).unwrap();
    clock.advance(HOUR);

    let results = service.search("useGetUser", &all());
    assert_eq!(results[0].name, "getUser");
    assert!(names(&results).contains(&"getUserSettings"));
}

#[test]
fn test_exact_operation_name_is_pinned_case_insensitively() {
    let (mut service, _) = service();
    load(&mut service, users());

    let other = service.search("listUsers", &all())[0].id.clone();
    service.touch_descriptor(&other).unwrap();

    let results = service.search("getuser", &all());
    assert_eq!(results[0].name, "getUser");
    // Pinning does not change membership.
    assert_eq!(service.get_total_count("getuser", &all()), results.len());
}

// =============================================================================
// MUTATION
// =============================================================================

#[test]
fn test_readding_is_idempotent() {
    let (mut service, _) = service();
    load(&mut service, users());
    let before = service.search("user", &all());
    let count = service.get_total_count("user", &all());

    load(&mut service, users());

    assert_eq!(service.len(), users().len());
    assert_eq!(service.get_total_count("user", &all()), count);
    assert_eq!(names(&service.search("user", &all())), names(&before));
}

#[test]
fn test_removed_descriptor_never_returned() {
    let (mut service, _) = service();
    load(&mut service, users());
    let target = service.search("getUser", &all())[0].id.clone();
    let total = service.get_total_count("", &all());

    let removed = service.remove_descriptor(&target).unwrap().unwrap();
    assert_eq!(removed.name, "getUser");

    assert!(service.get_by_id(&target).is_none());
    for query in ["", "user", "getUser", "/api/users/{id}", "useGetUser", "GET user"] {
        assert!(service.search(query, &all()).iter().all(|d| d.id != target));
    }
    assert_eq!(service.get_total_count("", &all()), total - 1);
    assert!(service.remove_descriptor(&target).unwrap().is_none());
}

#[test]
fn test_type_change_is_rejected() {
    let (mut service, _) = service();
    let endpoint = rest("petstore", "getUser", HttpMethod::Get, "/api/users/{id}", "users");
    let mut impostor = schema("petstore", "getUser");
    impostor.id = endpoint.id.clone();

    service.add_descriptor(endpoint.clone()).unwrap();
    let err = service.add_descriptor(impostor).unwrap_err();

    assert_eq!(
        err,
        SearchError::TypeChanged {
            id: endpoint.id.clone(),
            existing: ResourceType::Rest,
            requested: ResourceType::Schema,
        }
    );
    assert_eq!(service.get_by_id(&endpoint.id).unwrap().as_ref(), &endpoint);
}

#[test]
fn test_replacement_keeps_insertion_order() {
    let (mut service, _) = service();
    let a = rest("a", "listThings", HttpMethod::Get, "/a/things", "things");
    let b = rest("b", "listThings", HttpMethod::Get, "/b/things", "things");
    load(&mut service, vec![a.clone(), b.clone()]);

    service.add_descriptor(a.clone()).unwrap();

    let results = service.search("things", &all());
    assert_eq!(results[0].id, a.id);
    assert_eq!(results[1].id, b.id);
}

#[test]
fn test_get_by_id_round_trip() {
    let (mut service, _) = service();
    let descriptor = with_response(
        rest("petstore", "getUser", HttpMethod::Get, "/api/users/{id}", "users"),
        "User",
    );
    service.add_descriptor(descriptor.clone()).unwrap();

    assert_eq!(service.get_by_id(&descriptor.id).unwrap().as_ref(), &descriptor);
    assert!(service.get_by_id("missing").is_none());
}

#[test]
fn test_remove_and_replace_source() {
    let (mut service, _) = service();
    load(&mut service, users());
    service.add_descriptor(schema("billing", "Invoice")).unwrap();

    let outcome = service
        .replace_source("petstore", vec![schema("petstore", "Pet")])
        .unwrap();
    assert_eq!(outcome, SourceReplacement { removed: 6, added: 1 });
    assert_eq!(service.len(), 2);

    assert_eq!(service.remove_source("billing").unwrap(), 1);
    assert_eq!(names(&service.search("", &all())), vec!["Pet"]);
}

#[test]
fn test_clear_all() {
    let (mut service, _) = service();
    load(&mut service, users());
    let generation = service.generation();

    service.clear_all().unwrap();

    assert!(service.is_empty());
    assert!(service.search("", &all()).is_empty());
    assert!(service.search("/api/users/{id}", &all()).is_empty());
    assert!(service.generation() > generation);
}

#[test]
fn test_generation_tracks_descriptor_set() {
    let (mut service, _) = service();
    assert_eq!(service.generation(), 0);

    let descriptor = schema("petstore", "User");
    service.add_descriptor(descriptor.clone()).unwrap();
    assert_eq!(service.generation(), 1);

    service.touch_descriptor(&descriptor.id).unwrap();
    assert_eq!(service.generation(), 1);

    service.remove_descriptor(&descriptor.id).unwrap();
    assert_eq!(service.generation(), 2);
}

// =============================================================================
// PAGINATION & LISTING
// =============================================================================

#[test]
fn test_pages_partition_the_full_result() {
    let (mut service, _) = service();
    let descriptors = (0..25)
        .map(|i| {
            rest(
                "petstore",
                &format!("listThing{i:02}"),
                HttpMethod::Get,
                &format!("/api/things/{i}"),
                "things",
            )
        })
        .collect();
    load(&mut service, descriptors);

    for query in ["", "thing"] {
        let total = service.get_total_count(query, &SearchOptions::default());
        assert_eq!(total, 25);

        let mut paged = Vec::new();
        for page in 0..3 {
            let options = SearchOptions {
                offset: page * 10,
                limit: Some(10),
                ..SearchOptions::default()
            };
            paged.extend(service.search(query, &options));
        }

        let full = service.search(query, &all());
        assert_eq!(paged.len(), total);
        assert_eq!(names(&paged), names(&full));
    }
}

#[test]
fn test_default_limit_applies() {
    let (mut service, _) = service();
    load(
        &mut service,
        (0..30).map(|i| schema("petstore", &format!("Model{i}"))).collect(),
    );
    assert_eq!(service.search("", &SearchOptions::default()).len(), 20);
}

#[test]
fn test_empty_query_lists_everything() {
    let (mut service, _) = service();
    load(&mut service, users());

    for query in ["", "   "] {
        assert_eq!(service.search(query, &all()).len(), service.len());
    }

    let schemas = SearchOptions {
        resource_type: Some(ResourceType::Schema),
        ..all()
    };
    assert_eq!(names(&service.search("", &schemas)), vec!["User"]);
}

#[test]
fn test_special_characters_do_not_crash() {
    let (mut service, _) = service();
    load(&mut service, users());

    for query in ["!@#$%^&*()", "(", "[", "\\", "*", "?", "{}", "a|b", "\u{1F600}", "use", "POST"] {
        let results = service.search(query, &all());
        assert_eq!(results.len(), service.get_total_count(query, &all()));
    }
    assert!(service.search("!@#$%^&*()", &all()).is_empty());
}

// =============================================================================
// FILTERS
// =============================================================================

#[test]
fn test_structured_filters() {
    let (mut service, _) = service();
    load(&mut service, users());
    load(
        &mut service,
        vec![
            with_response(
                rest("billing", "getInvoice", HttpMethod::Get, "/invoices/{id}", "invoices"),
                "Invoice",
            ),
            with_response(
                rest("petstore", "whoAmI", HttpMethod::Get, "/api/me", "users/self"),
                "User",
            ),
        ],
    );

    let by_source = SearchOptions {
        source: Some("billing".to_string()),
        ..all()
    };
    assert_eq!(names(&service.search("", &by_source)), vec!["getInvoice"]);

    let by_package = SearchOptions {
        package: Some("users".to_string()),
        ..all()
    };
    assert_eq!(service.search("", &by_package).len(), 5);

    let by_data_type = SearchOptions {
        data_types: Some(vec!["User".to_string(), "Nope".to_string()]),
        ..all()
    };
    assert_eq!(names(&service.search("", &by_data_type)), vec!["whoAmI"]);

    let by_name = SearchOptions {
        names: Some(vec!["listPets".to_string(), "User".to_string()]),
        ..all()
    };
    assert_eq!(names(&service.search("", &by_name)), vec!["listPets", "User"]);

    let unmatched = SearchOptions {
        data_types: Some(vec!["Missing".to_string()]),
        ..all()
    };
    assert!(service.search("user", &unmatched).is_empty());
}

// =============================================================================
// RECENCY
// =============================================================================

#[test]
fn test_recently_accessed_breaks_text_ties() {
    let (mut service, clock) = service();
    let a = rest("a", "listThings", HttpMethod::Get, "/a/things", "things");
    let b = rest("b", "listThings", HttpMethod::Get, "/b/things", "things");
    load(&mut service, vec![a.clone(), b.clone()]);

    service.touch_descriptor(&b.id).unwrap();
    clock.advance(2 * HOUR);

    let results = service.search("things", &all());
    assert_eq!(results[0].id, b.id);
    assert_eq!(results[0].last_accessed, Some(NOW));
}

#[test]
fn test_get_recent_orders_by_access() {
    let (mut service, clock) = service();
    load(&mut service, users());
    let ids: Vec<String> = service.descriptors().iter().map(|d| d.id.clone()).collect();

    service.touch_descriptor(&ids[0]).unwrap();
    clock.advance(HOUR);
    service.touch_descriptor(&ids[2]).unwrap();
    assert!(service.touch_descriptor("missing").unwrap().is_none());

    let recent = service.get_recent(10);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].id, ids[2]);
    assert_eq!(recent[1].id, ids[0]);
    assert_eq!(service.get_recent(1).len(), 1);
}

// =============================================================================
// CONFIGURATION & STATISTICS
// =============================================================================

#[test]
fn test_invalid_config_is_rejected() {
    let config = SearchConfig {
        alpha: 2.0,
        ..SearchConfig::default()
    };
    assert!(matches!(
        SearchService::new(config),
        Err(SearchError::InvalidConfig(_))
    ));
}

#[test]
fn test_stats_counts_and_usage() {
    let (mut service, _) = service();
    load(&mut service, users());
    service.add_descriptor(schema("billing", "Invoice")).unwrap();

    let stats = service.stats(None);
    assert_eq!(stats.total, 7);
    assert_eq!(stats.rest_count, 5);
    assert_eq!(stats.schema_count, 2);
    assert_eq!(stats.unique_sources, 2);
    assert_eq!(stats.unique_controllers, 2);
    assert_eq!(stats.sources[0].source, "billing");
    assert!(stats.usage.is_none());

    let mut report = UsageReport {
        generation: service.generation(),
        files_scanned: 3,
        ..UsageReport::default()
    };
    report.by_source.insert("petstore".into(), files(&["a.ts", "b.ts"]));
    report
        .by_endpoint
        .insert("petstore/users/getUser".into(), files(&["a.ts"]));
    report.by_controller.insert("petstore/users".into(), files(&["a.ts"]));
    report
        .by_datatype
        .insert("petstore/components/User".into(), files(&["b.ts"]));

    let stats = service.stats(Some(&report));
    let usage = stats.usage.unwrap();
    assert_eq!(usage.used_endpoints, 1);
    assert_eq!(usage.unused_endpoints, 4);
    assert_eq!(usage.used_datatypes, 1);
    assert_eq!(usage.unused_datatypes, 1);
    assert_eq!(usage.used_controllers, 1);

    let petstore = stats.sources.iter().find(|s| s.source == "petstore").unwrap();
    assert_eq!(petstore.used_in_files, Some(2));
    assert_eq!(petstore.used_endpoints, Some(1));
}

// =============================================================================
// EXACT-MATCH SHORTCUT
// =============================================================================

#[test]
fn test_exact_match_shortcut_keeps_generic_membership() {
    let (mut service, _) = service();
    load(&mut service, users());

    let mut plain = TextIndex::new(FieldBoosts::default()).unwrap();
    let documents = service
        .descriptors()
        .iter()
        .map(|d| IndexedDocument::from_descriptor(d))
        .collect();
    plain.apply(&[], documents).unwrap();
    let options = QueryOptions {
        prefix: true,
        fuzzy: service.config().fuzzy,
        filter: None,
    };

    for (query, text) in [
        ("getUser", "getUser"),
        ("GETUSER", "GETUSER"),
        ("/api/users/{id}", "/api/users/{id}"),
        ("User", "User"),
        ("useGetUser", "getUser"),
    ] {
        let ranked: BTreeSet<String> = service
            .search(query, &all())
            .iter()
            .map(|d| d.id.clone())
            .collect();
        let generic: BTreeSet<String> = plain
            .query(text, &options)
            .unwrap()
            .into_iter()
            .map(|hit| hit.id)
            .collect();

        assert_eq!(ranked, generic, "membership differs for {query:?}");
        assert_eq!(service.get_total_count(query, &all()), generic.len());
    }
}

#[test]
fn test_pinned_descriptor_respects_filters() {
    let (mut service, _) = service();
    load(&mut service, users());

    let posts = SearchOptions {
        method: Some(HttpMethod::Post),
        ..all()
    };
    assert!(service.search("getUser", &posts).iter().all(|d| d.name != "getUser"));
}

// =============================================================================
// SOURCE REPLACEMENT
// =============================================================================

fn generation_set(prefix: &str) -> Vec<ResourceDescriptor> {
    (0..20)
        .map(|i| schema("petstore", &format!("{prefix}{i:02}")))
        .collect()
}

#[test]
fn test_readers_never_see_a_half_replaced_source() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    let (mut service, _) = service();
    load(&mut service, generation_set("Alpha"));
    let shared = Arc::new(parking_lot::RwLock::new(service));
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let shared = Arc::clone(&shared);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut checks = 0;
                while !done.load(Ordering::Acquire) || checks < 5 {
                    let service = shared.read();
                    let results = service.search("", &all());
                    assert_eq!(results.len(), 20);
                    assert_eq!(service.get_total_count("", &all()), 20);

                    let alpha = results.iter().filter(|d| d.name.starts_with("Alpha")).count();
                    assert!(alpha == 0 || alpha == 20, "mixed generations: {alpha} alpha");
                    for descriptor in &results {
                        let stored = service.get_by_id(&descriptor.id).unwrap();
                        assert_eq!(stored.name, descriptor.name);
                    }
                    checks += 1;
                }
            })
        })
        .collect();

    for round in 0..20 {
        let next = if round % 2 == 0 { "Beta" } else { "Alpha" };
        let outcome = shared
            .write()
            .replace_source("petstore", generation_set(next))
            .unwrap();
        assert_eq!(outcome, SourceReplacement { removed: 20, added: 20 });
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn test_replace_source_keeps_unchanged_positions() {
    let (mut service, _) = service();
    let a = rest("petstore", "listThings", HttpMethod::Get, "/a/things", "things");
    let b = rest("billing", "listThings", HttpMethod::Get, "/b/things", "things");
    load(&mut service, vec![a.clone(), b.clone()]);

    service.replace_source("petstore", vec![a.clone()]).unwrap();

    let results = service.search("things", &all());
    assert_eq!(results[0].id, a.id);
    assert_eq!(results[1].id, b.id);
}

#[test]
fn test_replace_source_allows_own_type_change_and_skips_foreign_one() {
    let (mut service, _) = service();
    let endpoint = rest("billing", "getInvoice", HttpMethod::Get, "/invoices/{id}", "invoices");
    service.add_descriptor(endpoint.clone()).unwrap();

    let mut impostor = schema("petstore", "Invoice");
    impostor.id = endpoint.id.clone();
    let outcome = service
        .replace_source("petstore", vec![impostor, schema("petstore", "Pet")])
        .unwrap();

    assert_eq!(outcome, SourceReplacement { removed: 0, added: 1 });
    assert_eq!(service.get_by_id(&endpoint.id).unwrap().as_ref(), &endpoint);

    let mut renamed = schema("billing", "getInvoice");
    renamed.id = endpoint.id.clone();
    let outcome = service.replace_source("billing", vec![renamed]).unwrap();
    assert_eq!(outcome, SourceReplacement { removed: 1, added: 1 });
    assert_eq!(
        service.get_by_id(&endpoint.id).unwrap().resource_type(),
        ResourceType::Schema
    );
}

#[test]
fn test_replace_source_last_duplicate_wins() {
    let (mut service, _) = service();
    let first = schema("petstore", "Pet");
    let mut second = first.clone();
    second.last_accessed = Some(NOW);

    let outcome = service
        .replace_source("petstore", vec![first, second.clone()])
        .unwrap();

    assert_eq!(outcome.added, 1);
    assert_eq!(service.len(), 1);
    assert_eq!(service.get_by_id(&second.id).unwrap().last_accessed, Some(NOW));
}

// =============================================================================
// PACKAGES & NON-ASCII TEXT
// =============================================================================

#[test]
fn test_package_filter_accepts_source_qualified_path() {
    let (mut service, _) = service();
    load(&mut service, users());
    service
        .add_descriptor(rest("billing", "listUsers", HttpMethod::Get, "/users", "users"))
        .unwrap();

    let plain = SearchOptions {
        package: Some("users".to_string()),
        ..all()
    };
    assert_eq!(service.search("", &plain).len(), 5);

    let qualified = SearchOptions {
        package: Some("petstore/users".to_string()),
        ..all()
    };
    let results = service.search("", &qualified);
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|d| d.source == "petstore"));

    let source_only = SearchOptions {
        package: Some("petstore".to_string()),
        ..all()
    };
    assert_eq!(service.search("", &source_only).len(), 5);

    let partial = SearchOptions {
        package: Some("petstore/use".to_string()),
        ..all()
    };
    assert!(service.search("", &partial).is_empty());
}

#[test]
fn test_non_ascii_names_are_searchable() {
    let (mut service, _) = service();
    load(
        &mut service,
        vec![
            schema("petstore", "用户资料"),
            with_text(
                rest("petstore", "fetchItem", HttpMethod::Get, "/api/items/{id}", "items"),
                "Récupérer l'élément",
                "",
            ),
            schema("petstore", "User"),
        ],
    );

    assert_eq!(names(&service.search("用户", &all())), vec!["用户资料"]);
    assert_eq!(names(&service.search("用户资料", &all())), vec!["用户资料"]);
    assert_eq!(names(&service.search("élément", &all())), vec!["fetchItem"]);
    assert_eq!(names(&service.search("ÉLÉMENT", &all())), vec!["fetchItem"]);
}
