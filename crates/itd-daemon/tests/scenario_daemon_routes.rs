//! In-process scenario tests for the itd-daemon HTTP endpoints.
//!
//! The router is driven via `tower::ServiceExt::oneshot`; no socket is bound.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use itd_config::DeskConfig;
use itd_daemon::{routes, state};
use itd_runtime::{ExclusionSet, MemoryExclusionStore, RuntimeStatus};
use itd_schemas::AlertHandle;
use tokio::sync::RwLock;
use tower::ServiceExt;

fn make_state() -> (Arc<state::AppState>, Arc<MemoryExclusionStore>) {
    let cfg = Arc::new(DeskConfig::default());
    let store = Arc::new(MemoryExclusionStore::new(BTreeSet::from(["INFY".to_string()])));
    let exclusions = Arc::new(ExclusionSet::load(&cfg.universe, store.clone(), AlertHandle::disabled()));
    let status = Arc::new(RwLock::new(RuntimeStatus::default()));
    let st = state::AppState::new(cfg, "abc123".to_string(), status, exclusions);
    (Arc::new(st), store)
}

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, serde_json::Value) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp.into_body().collect().await.expect("body collect failed").to_bytes();
    (status, serde_json::from_slice(&body).expect("body is not valid JSON"))
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder().method("GET").uri(uri).body(axum::body::Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_returns_200_ok_true() {
    let (st, _) = make_state();
    let (status, json) = call(routes::build_router(st), get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "itd-daemon");
}

#[tokio::test]
async fn status_reports_runtime_and_config() {
    let (st, _) = make_state();
    st.status.write().await.cycles = 42;

    let (status, json) = call(routes::build_router(Arc::clone(&st)), get("/v1/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["config_hash"], "abc123");
    assert_eq!(json["broker"], "paper");
    assert_eq!(json["excluded"], 1);
    assert_eq!(json["runtime"]["cycles"], 42);
    assert_eq!(json["runtime"]["state"], "idle");
    assert!(json["runtime"]["last_exit_date"].is_null());
}

#[tokio::test]
async fn exclude_then_include_round_trip() {
    let (st, store) = make_state();

    let (status, json) = call(
        routes::build_router(Arc::clone(&st)),
        post_json("/v1/exclusions/exclude", serde_json::json!({"symbols": ["tcs"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["changed"], serde_json::json!(["TCS"]));
    assert_eq!(json["excluded"], serde_json::json!(["INFY", "TCS"]));
    assert!(store.saved().contains("TCS"));

    let (status, json) = call(
        routes::build_router(Arc::clone(&st)),
        post_json("/v1/exclusions/include", serde_json::json!({"symbols": ["INFY", "TCS"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["excluded"], serde_json::json!([]));

    let (_, json) = call(routes::build_router(st), get("/v1/exclusions")).await;
    assert_eq!(json["excluded"], serde_json::json!([]));
}

#[tokio::test]
async fn exclude_outside_universe_is_400_listing_invalid() {
    let (st, store) = make_state();
    let (status, json) = call(
        routes::build_router(Arc::clone(&st)),
        post_json("/v1/exclusions/exclude", serde_json::json!({"symbols": ["TCS", "DOGE"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["invalid"], serde_json::json!(["DOGE"]));
    assert!(json["error"].as_str().unwrap().contains("DOGE"));
    assert!(!st.exclusions.is_excluded("TCS"));
    assert_eq!(store.saved(), BTreeSet::from(["INFY".to_string()]));
}

#[tokio::test]
async fn empty_symbol_list_is_400() {
    let (st, _) = make_state();
    let (status, json) = call(
        routes::build_router(st),
        post_json("/v1/exclusions/include", serde_json::json!({"symbols": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "no symbols given");
}
