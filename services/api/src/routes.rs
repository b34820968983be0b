use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use dnc_scrub::workflows::registry::{
    registry_router, ChangeListIngestor, ChangeListLedger, RegistryReader,
};
use dnc_scrub::workflows::scrub::{
    scrub_router, ExistingLeadLookup, ScrubJobRepository, ScrubJobService,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Serialize)]
pub(crate) struct RegistryStatusResponse {
    pub(crate) version: u64,
    pub(crate) active_entries: usize,
}

pub(crate) fn with_scrub_routes<J, G, C, L>(
    service: Arc<ScrubJobService<J, G, C>>,
    ingestor: Arc<ChangeListIngestor<L>>,
) -> axum::Router
where
    J: ScrubJobRepository + 'static,
    G: RegistryReader + 'static,
    C: ExistingLeadLookup + 'static,
    L: ChangeListLedger + 'static,
{
    scrub_router(service)
        .merge(registry_router(ingestor))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/registry/status",
            axum::routing::get(registry_status_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn registry_status_endpoint(
    Extension(state): Extension<AppState>,
) -> axum::response::Response {
    match state.registry.snapshot() {
        Ok(snapshot) => Json(RegistryStatusResponse {
            version: snapshot.version(),
            active_entries: snapshot.active_count(),
        })
        .into_response(),
        Err(err) => {
            warn!(error = %err, "registry snapshot unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": err.to_string(), "code": "unavailable" })),
            )
                .into_response()
        }
    }
}
