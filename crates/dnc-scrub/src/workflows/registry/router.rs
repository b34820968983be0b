use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ChangeListEntry, ChangeListId, ChangeListRequest, IngestOutcome};
use super::ingestion::{ChangeListIngestor, ChangeListLedger, IngestError, LedgerError};
use super::store::RegistryError;

/// Change-list upload: the header fields plus the rows of the upstream file.
#[derive(Debug, Deserialize)]
pub struct ChangeListUpload {
    #[serde(flatten)]
    pub request: ChangeListRequest,
    #[serde(default)]
    pub entries: Vec<ChangeListEntry>,
}

/// Router exposing registry maintenance endpoints.
pub fn registry_router<L>(ingestor: Arc<ChangeListIngestor<L>>) -> Router
where
    L: ChangeListLedger + 'static,
{
    Router::new()
        .route("/api/v1/registry/change-lists", post(ingest_handler::<L>))
        .route(
            "/api/v1/registry/change-lists/:change_list_id",
            get(change_list_handler::<L>),
        )
        .with_state(ingestor)
}

pub(crate) async fn ingest_handler<L>(
    State(ingestor): State<Arc<ChangeListIngestor<L>>>,
    axum::Json(upload): axum::Json<ChangeListUpload>,
) -> Response
where
    L: ChangeListLedger + 'static,
{
    let ChangeListUpload { request, entries } = upload;
    let applied = tokio::task::spawn_blocking(move || ingestor.ingest(request, entries)).await;
    let ingested = match applied {
        Ok(ingested) => ingested,
        Err(error) => {
            tracing::error!(error = %error, "change-list ingest worker failed");
            let payload = json!({ "error": error.to_string(), "code": "worker_failed" });
            return (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response();
        }
    };
    match ingested {
        Ok(outcome) => {
            let status = match &outcome {
                IngestOutcome::Applied { .. } => StatusCode::CREATED,
                IngestOutcome::Failed { .. } | IngestOutcome::Duplicate { .. } => StatusCode::OK,
                IngestOutcome::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            };
            (status, axum::Json(outcome)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn change_list_handler<L>(
    State(ingestor): State<Arc<ChangeListIngestor<L>>>,
    Path(change_list_id): Path<String>,
) -> Response
where
    L: ChangeListLedger + 'static,
{
    match ingestor.change_list(&ChangeListId(change_list_id)) {
        Ok(change_list) => (StatusCode::OK, axum::Json(change_list)).into_response(),
        Err(error) => error_response(error),
    }
}

fn error_response(error: IngestError) -> Response {
    let (status, code) = match &error {
        IngestError::Ledger(LedgerError::NotFound) => (StatusCode::NOT_FOUND, "not_found"),
        IngestError::Registry(RegistryError::Unavailable(_))
        | IngestError::Ledger(LedgerError::Unavailable(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
        IngestError::Ledger(LedgerError::Conflict) => (StatusCode::CONFLICT, "conflict"),
    };
    let payload = json!({ "error": error.to_string(), "code": code });
    (status, axum::Json(payload)).into_response()
}
