//! Axum router and HTTP handlers for itd-daemon.
//!
//! Middleware layers are attached in `main.rs`; tests drive the bare router.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use itd_runtime::ExclusionError;
use tracing::info;

use crate::{
    api_types::{ErrorResponse, ExclusionsResponse, HealthResponse, StatusResponse, SymbolsRequest},
    state::{uptime_secs, AppState},
};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/exclusions", get(list_exclusions))
        .route("/v1/exclusions/exclude", post(exclude))
        .route("/v1/exclusions/include", post(include))
        .with_state(state)
}

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let runtime = st.status.read().await.clone();
    (
        StatusCode::OK,
        Json(StatusResponse {
            daemon_uptime_secs: uptime_secs(),
            config_hash: st.config_hash.clone(),
            broker: st.cfg.broker.kind,
            universe: st.cfg.universe.len(),
            excluded: st.exclusions.snapshot().len(),
            runtime,
        }),
    )
}

pub(crate) async fn list_exclusions(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ExclusionsResponse {
            changed: Vec::new(),
            excluded: st.exclusions.snapshot().into_iter().collect(),
        }),
    )
}

pub(crate) async fn exclude(State(st): State<Arc<AppState>>, Json(req): Json<SymbolsRequest>) -> Response {
    let result = st.exclusions.exclude(&req.symbols);
    if result.is_ok() {
        info!(symbols = ?req.symbols, "exclusions/exclude");
    }
    exclusion_response(&st, result)
}

pub(crate) async fn include(State(st): State<Arc<AppState>>, Json(req): Json<SymbolsRequest>) -> Response {
    let result = st.exclusions.include(&req.symbols);
    if result.is_ok() {
        info!(symbols = ?req.symbols, "exclusions/include");
    }
    exclusion_response(&st, result)
}

fn exclusion_response(
    st: &AppState,
    result: Result<std::collections::BTreeSet<String>, ExclusionError>,
) -> Response {
    match result {
        Ok(changed) => (
            StatusCode::OK,
            Json(ExclusionsResponse {
                changed: changed.into_iter().collect(),
                excluded: st.exclusions.snapshot().into_iter().collect(),
            }),
        )
            .into_response(),
        Err(e) => {
            let (status, invalid) = match &e {
                ExclusionError::UnknownSymbols(v) => (StatusCode::BAD_REQUEST, v.clone()),
                ExclusionError::Empty => (StatusCode::BAD_REQUEST, Vec::new()),
                ExclusionError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()),
            };
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                    invalid,
                }),
            )
                .into_response()
        }
    }
}
