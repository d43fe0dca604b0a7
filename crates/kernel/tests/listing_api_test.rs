#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Listing endpoint tests against the real router over an in-memory store.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use beta_kernel::listing::Resource;
use beta_kernel::routes;
use beta_test_utils::{
    MemoryStore, event_rows, lead_rows, profession_rows, test_state, tied_profession_rows,
};

fn app(store: Arc<MemoryStore>) -> Router {
    routes::router(test_state(store, &[]))
}

fn uri(path: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();
    format!("{path}?{query}")
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

fn ids(items: &Value, field: &str) -> Vec<i64> {
    items
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item[field].as_i64().unwrap())
        .collect()
}

// =============================================================================
// Paging
// =============================================================================

#[tokio::test]
async fn invalid_page_falls_back_to_first_page() {
    let store = MemoryStore::new()
        .with_rows(Resource::Professions, profession_rows(25))
        .into_arc();

    for page in ["0", "-3", "abc", ""] {
        let (status, body) = get(app(store.clone()), &uri("/api/professions", &[("page", page)])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["page"], 1, "page={page:?}");
        assert_eq!(body["data"].as_array().unwrap().len(), 10);
    }
}

#[tokio::test]
async fn invalid_sort_and_direction_resolve_to_defaults() {
    let store = MemoryStore::new()
        .with_rows(Resource::Professions, profession_rows(25))
        .into_arc();

    let (status, body) = get(
        app(store),
        &uri(
            "/api/professions",
            &[
                ("page", "2"),
                ("limit", "10"),
                ("sortBy", "invalid_field"),
                ("sortDirection", "up"),
            ],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let meta = &body["meta"];
    assert_eq!(meta["page"], 2);
    assert_eq!(meta["limit"], 10);
    assert_eq!(meta["sort_by"], "created_at");
    assert_eq!(meta["sort_direction"], "desc");
    assert_eq!(meta["total"], 25);
    assert_eq!(meta["last_page"], 3);
    assert!(
        meta["valid_sort_fields"]
            .as_array()
            .unwrap()
            .contains(&json!("profession_name"))
    );

    // Newest first: the second page holds ids 15 down to 6.
    assert_eq!(ids(&body["data"], "profession_id"), (6..=15).rev().collect::<Vec<_>>());
}

#[tokio::test]
async fn requested_sort_is_applied() {
    let store = MemoryStore::new()
        .with_rows(Resource::Professions, profession_rows(5))
        .into_arc();

    let (_, body) = get(
        app(store),
        &uri(
            "/api/professions",
            &[("sortBy", "profession_name"), ("sortDirection", "ASC")],
        ),
    )
    .await;

    assert_eq!(body["meta"]["sort_by"], "profession_name");
    assert_eq!(body["meta"]["sort_direction"], "asc");
    assert_eq!(ids(&body["data"], "profession_id"), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn last_page_is_at_least_one() {
    let store = MemoryStore::new().into_arc();

    let (status, body) = get(app(store), "/api/surveys").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"], json!([]));
    assert_eq!(body["meta"]["total"], 0);
    assert_eq!(body["meta"]["last_page"], 1);
}

#[tokio::test]
async fn page_past_the_end_is_empty_with_accurate_meta() {
    let store = MemoryStore::new()
        .with_rows(Resource::Professions, profession_rows(25))
        .into_arc();

    let (status, body) = get(app(store), &uri("/api/professions", &[("page", "5")])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["meta"]["total"], 25);
    assert_eq!(body["meta"]["page"], 5);
    assert_eq!(body["meta"]["last_page"], 3);
}

#[tokio::test]
async fn equal_sort_keys_page_without_gaps_or_repeats() {
    let store = MemoryStore::new()
        .with_rows(Resource::Professions, tied_profession_rows(25))
        .into_arc();

    let mut seen = Vec::new();
    for page in ["1", "2", "3"] {
        let (_, body) = get(app(store.clone()), &uri("/api/professions", &[("page", page)])).await;
        seen.extend(ids(&body["data"], "profession_id"));
    }

    assert_eq!(seen, (1..=25).rev().collect::<Vec<_>>());

    let calls = store.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].offset, 20);
    assert_eq!(calls[2].limit, 10);
}

#[tokio::test]
async fn export_flag_returns_the_whole_set() {
    let store = MemoryStore::new()
        .with_rows(Resource::Events, event_rows(30))
        .into_arc();

    let (status, body) = get(app(store), &uri("/api/events", &[("export", "true"), ("page", "3")])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["events"].as_array().unwrap().len(), 30);
    assert_eq!(body["meta"]["page"], 1);
    assert_eq!(body["meta"]["limit"], 10_000);
    assert_eq!(body["meta"]["total"], 30);
}

// =============================================================================
// Filters
// =============================================================================

#[tokio::test]
async fn blank_advanced_filters_match_no_filter() {
    let store = MemoryStore::new()
        .with_rows(Resource::Events, event_rows(30))
        .into_arc();

    let (_, unfiltered) = get(app(store.clone()), "/api/events").await;
    let (status, filtered) = get(
        app(store),
        &uri(
            "/api/events",
            &[(
                "advanced_filters",
                r#"[{"field":"event_name","operator":"contains","value":""},{"field":"utm_source","operator":"equals","value":"  "}]"#,
            )],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(filtered, unfiltered);
    assert_eq!(filtered["meta"]["total"], 30);
}

#[tokio::test]
async fn malformed_advanced_filters_are_ignored() {
    let store = MemoryStore::new()
        .with_rows(Resource::Events, event_rows(12))
        .into_arc();

    let (status, body) = get(
        app(store),
        &uri("/api/events", &[("advanced_filters", "[{broken")]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 12);
}

#[tokio::test]
async fn advanced_filters_join_with_the_requested_condition() {
    let store = MemoryStore::new()
        .with_rows(Resource::Events, event_rows(30))
        .into_arc();
    let clauses = r#"[
        {"field":"event_name","operator":"equals","value":"PageView"},
        {"field":"profession_id","operator":"equals","value":2}
    ]"#;

    let (_, all) = get(
        app(store.clone()),
        &uri("/api/events", &[("advanced_filters", clauses), ("filter_condition", "and")]),
    )
    .await;
    let (_, any) = get(
        app(store),
        &uri("/api/events", &[("advanced_filters", clauses), ("filter_condition", "OR")]),
    )
    .await;

    // PageView on every third row, profession 2 on odd rows.
    assert_eq!(all["meta"]["total"], 5);
    assert_eq!(any["meta"]["total"], 20);
}

#[tokio::test]
async fn unknown_filter_fields_are_dropped() {
    let store = MemoryStore::new()
        .with_rows(Resource::Events, event_rows(8))
        .into_arc();

    let (status, body) = get(
        app(store),
        &uri(
            "/api/events",
            &[(
                "advanced_filters",
                r#"[{"field":"password; DROP TABLE events","operator":"equals","value":"x"}]"#,
            )],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 8);
}

#[tokio::test]
async fn single_day_range_uses_the_fixed_timezone() {
    let store = MemoryStore::new()
        .with_rows(Resource::Events, event_rows(30))
        .into_arc();

    let (_, body) = get(
        app(store),
        &uri("/api/events", &[("from", "2024-03-01"), ("to", "2024-03-01")]),
    )
    .await;

    // Hourly events from 12:00Z; the -03:00 day ends at 02:59:59.999Z.
    assert_eq!(body["meta"]["total"], 15);
}

#[tokio::test]
async fn category_date_range_filters_its_own_column() {
    let store = MemoryStore::new()
        .with_rows(Resource::Leads, lead_rows(10))
        .into_arc();

    let (_, body) = get(
        app(store),
        &uri(
            "/api/leads",
            &[("captacao_from", "2024-03-03"), ("captacao_to", "2024-03-05")],
        ),
    )
    .await;

    assert_eq!(body["meta"]["total"], 3);
}

#[tokio::test]
async fn equality_params_filter_rows() {
    let store = MemoryStore::new()
        .with_rows(Resource::Leads, lead_rows(12))
        .into_arc();

    let (_, body) = get(app(store), &uri("/api/leads", &[("profession_id", "2")])).await;

    assert_eq!(body["meta"]["total"], 4);
    for lead in body["data"].as_array().unwrap() {
        assert_eq!(lead["profession_id"], 2);
    }
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn storage_failure_returns_500_with_empty_envelope() {
    let store = MemoryStore::new()
        .with_rows(Resource::Events, event_rows(5))
        .into_arc();
    store.fail_with("connection reset");

    let (status, body) = get(app(store), &uri("/api/events", &[("page", "2")])).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["events"], json!([]));
    assert_eq!(body["meta"]["total"], 0);
    assert_eq!(body["meta"]["page"], 2);
    assert_eq!(body["meta"]["limit"], 10);
    assert_eq!(body["meta"]["last_page"], 1);
    assert_eq!(body["meta"]["sort_by"], "event_time");
}

#[tokio::test]
async fn unknown_resource_returns_404_envelope() {
    let (status, body) = get(app(MemoryStore::new().into_arc()), "/api/invoices").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["meta"]["total"], 0);
    assert_eq!(body["meta"]["last_page"], 1);
}

// =============================================================================
// Authentication
// =============================================================================

fn authed_app(store: Arc<MemoryStore>) -> Router {
    routes::router(test_state(store, &["secret-token"]))
}

#[tokio::test]
async fn protected_resource_requires_a_token() {
    let store = MemoryStore::new()
        .with_rows(Resource::Leads, lead_rows(3))
        .into_arc();

    let response = authed_app(store)
        .oneshot(Request::get("/api/leads").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["meta"]["total"], 0);
}

#[tokio::test]
async fn wrong_token_is_rejected() {
    let store = MemoryStore::new()
        .with_rows(Resource::Users, Vec::new())
        .into_arc();

    let request = Request::get("/api/users")
        .header(header::AUTHORIZATION, "Bearer not-the-token")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(authed_app(store.clone()), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["users"], json!([]));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn valid_token_opens_protected_resource() {
    let store = MemoryStore::new()
        .with_rows(Resource::Leads, lead_rows(3))
        .into_arc();

    let request = Request::get("/api/leads")
        .header(header::AUTHORIZATION, "Bearer secret-token")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(authed_app(store), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 3);
}

#[tokio::test]
async fn public_resource_ignores_missing_token() {
    let store = MemoryStore::new()
        .with_rows(Resource::Events, event_rows(3))
        .into_arc();

    let (status, body) = get(authed_app(store), "/api/events").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 3);
}

#[tokio::test]
async fn protected_resource_is_open_without_configured_tokens() {
    let store = MemoryStore::new()
        .with_rows(Resource::Leads, lead_rows(2))
        .into_arc();

    let (status, _) = get(app(store), "/api/leads").await;

    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn health_reflects_storage() {
    let store = MemoryStore::new().into_arc();

    let (status, body) = get(app(store.clone()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "healthy", "storage": true }));

    store.fail_with("down");
    let (status, body) = get(app(store), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}
