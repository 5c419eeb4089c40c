//! Integration tests for pipekeep-health API endpoints
//!
//! Requests go through the full router via `oneshot`, backed by a temporary
//! database and a fixed clock.

mod helpers;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use helpers::{h, Harness};
use pipekeep_common::db::{close_lead, upsert_owner};
use pipekeep_common::{OwnerRole, PipelineStatus, UNASSIGNED_OWNER};
use pipekeep_health::{build_router, AppState};
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot` method

fn setup_app(harness: &Harness) -> axum::Router {
    build_router(AppState::new(harness.ctx.clone()))
}

fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

// =============================================================================
// Health and build info
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let harness = Harness::new().await;
    let app = setup_app(&harness);

    let response = app.oneshot(test_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "pipekeep-health");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_buildinfo_endpoint() {
    let harness = Harness::new().await;
    let app = setup_app(&harness);

    let response = app
        .oneshot(test_request("GET", "/api/buildinfo"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert!(body["git_hash"].is_string());
    assert!(body["build_profile"].is_string());
}

// =============================================================================
// Pipeline
// =============================================================================

#[tokio::test]
async fn test_pipeline_view_classifies_leads() {
    let harness = Harness::new().await;
    let stale = harness.seed("Marta", PipelineStatus::Contacted).await;
    harness.seed("Ivo", PipelineStatus::Qualified).await;

    harness.at(h(80));
    let app = setup_app(&harness);
    let response = app
        .oneshot(test_request("GET", "/api/pipeline?owner=Marta"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["lead"]["id"], stale.id.to_string());
    assert_eq!(entries[0]["classification"], "STALE_FRESH");
    assert_eq!(body["summary"]["stale_fresh"], 1);
    assert_eq!(body["degraded"], false);
}

#[tokio::test]
async fn test_warn_then_evict_over_http() {
    let harness = Harness::new().await;
    let lead = harness.seed("Marta", PipelineStatus::Negotiating).await;

    harness.at(h(73));
    let response = setup_app(&harness)
        .oneshot(json_request(
            "POST",
            "/api/pipeline/warn",
            json!({ "ids": [lead.id, lead.id] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["kind"], "warn");
    assert_eq!(body["requested"], 1);
    assert_eq!(body["applied"], 1);
    assert_eq!(body["message"], "1 of 1 requested were applied");

    // Too early: grace has not elapsed
    harness.at(h(90));
    let response = setup_app(&harness)
        .oneshot(json_request(
            "POST",
            "/api/pipeline/evict",
            json!({ "ids": [lead.id] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["applied"], 0);
    assert_eq!(body["message"], "Nothing left to evict");

    harness.at(h(100));
    let response = setup_app(&harness)
        .oneshot(json_request(
            "POST",
            "/api/pipeline/evict",
            json!({ "ids": [lead.id] }),
        ))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["kind"], "evict");
    assert_eq!(body["applied"], 1);
    assert_eq!(harness.reload(lead.id).await.owner, UNASSIGNED_OWNER);
}

#[tokio::test]
async fn test_empty_batch_is_bad_request() {
    let harness = Harness::new().await;

    let response = setup_app(&harness)
        .oneshot(json_request("POST", "/api/pipeline/warn", json!({ "ids": [] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("No lead ids"));
}

#[tokio::test]
async fn test_malformed_batch_bodies_return_json_errors() {
    let harness = Harness::new().await;

    let response = setup_app(&harness)
        .oneshot(json_request(
            "POST",
            "/api/pipeline/warn",
            json!({ "ids": ["not-a-uuid"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"].is_string());

    let request = Request::builder()
        .method("POST")
        .uri("/api/pipeline/evict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"ids\": ["))
        .unwrap();
    let response = setup_app(&harness).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"].is_string());

    let response = setup_app(&harness)
        .oneshot(test_request("POST", "/api/pipeline/warn"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_reconcile_endpoint() {
    let harness = Harness::new().await;
    let lead = harness.seed("Marta", PipelineStatus::Contacted).await;

    harness.at(h(73));
    pipekeep_health::issue_warnings(&harness.ctx, &[lead.id])
        .await
        .unwrap();
    pipekeep_common::db::schedule_touchpoint(&harness.db, lead.id, "call", h(120))
        .await
        .unwrap();

    harness.at(h(80));
    let response = setup_app(&harness)
        .oneshot(test_request("POST", "/api/pipeline/reconcile"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["examined"], 1);
    assert_eq!(body["cleared"], json!([lead.id.to_string()]));
    assert_eq!(body["failed"], json!([]));
}

// =============================================================================
// Ratio report
// =============================================================================

#[tokio::test]
async fn test_ratio_report_for_explicit_period() {
    let harness = Harness::new().await;
    upsert_owner(&harness.db, "Nadia", OwnerRole::Seller).await.unwrap();
    upsert_owner(&harness.db, "Root", OwnerRole::Admin).await.unwrap();
    harness.seed("Marta", PipelineStatus::Contacted).await;
    harness.seed("Marta", PipelineStatus::Qualified).await;
    let sold = harness.seed("Marta", PipelineStatus::Negotiating).await;
    close_lead(&harness.db, sold.id, PipelineStatus::Won, h(10))
        .await
        .unwrap();

    harness.at(h(80));
    let response = setup_app(&harness)
        .oneshot(test_request(
            "GET",
            "/api/ratio?from=2026-04-01T00:00:00Z&to=2026-05-01T00:00:00Z",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let owners = body["owners"].as_array().unwrap();
    assert_eq!(owners.len(), 2);

    assert_eq!(owners[0]["owner"], "Marta");
    assert_eq!(owners[0]["stock"], 2);
    assert_eq!(owners[0]["period_sales"], 1);
    assert_eq!(owners[0]["health"], "healthy");
    assert_eq!(owners[0]["stale"], 2);

    assert_eq!(owners[1]["owner"], "Nadia");
    assert_eq!(owners[1]["stock"], 0);
    assert_eq!(owners[1]["health"], "healthy");
}

#[tokio::test]
async fn test_ratio_report_defaults_to_current_month() {
    let harness = Harness::new().await;
    harness.at(h(80));

    let response = setup_app(&harness)
        .oneshot(test_request("GET", "/api/ratio"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["period"]["from"], "2026-04-01T00:00:00Z");
    assert_eq!(body["period"]["to"], "2026-05-01T00:00:00Z");
    assert_eq!(body["owners"], json!([]));
}

#[tokio::test]
async fn test_ratio_report_rejects_half_or_inverted_period() {
    let harness = Harness::new().await;

    let response = setup_app(&harness)
        .oneshot(test_request("GET", "/api/ratio?from=2026-04-01T00:00:00Z"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = setup_app(&harness)
        .oneshot(test_request(
            "GET",
            "/api/ratio?from=2026-05-01T00:00:00Z&to=2026-04-01T00:00:00Z",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ratio_report_rejects_unparseable_dates_as_json() {
    let harness = Harness::new().await;

    let response = setup_app(&harness)
        .oneshot(test_request(
            "GET",
            "/api/ratio?from=garbage&to=2026-04-01T00:00:00Z",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().starts_with("Failed to deserialize query string"));
}
