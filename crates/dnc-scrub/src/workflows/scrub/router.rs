use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::dedupe::ExistingLeadLookup;
use super::job::{BatchId, JobError, JobId};
use super::repository::{RepositoryError, ScrubJobRepository};
use super::service::{ScrubJobService, ScrubServiceError, ScrubSubmission};
use crate::workflows::registry::RegistryReader;

type SharedService<J, G, C> = Arc<ScrubJobService<J, G, C>>;

/// Router exposing batch submission, polling and job control.
pub fn scrub_router<J, G, C>(service: SharedService<J, G, C>) -> Router
where
    J: ScrubJobRepository + 'static,
    G: RegistryReader + 'static,
    C: ExistingLeadLookup + 'static,
{
    Router::new()
        .route("/api/v1/scrub/jobs", post(submit_handler::<J, G, C>))
        .route("/api/v1/scrub/jobs/:job_id", get(status_handler::<J, G, C>))
        .route(
            "/api/v1/scrub/jobs/:job_id/result",
            get(result_handler::<J, G, C>),
        )
        .route(
            "/api/v1/scrub/jobs/:job_id/cancel",
            post(cancel_handler::<J, G, C>),
        )
        .route(
            "/api/v1/scrub/jobs/:job_id/retry",
            post(retry_handler::<J, G, C>),
        )
        .route(
            "/api/v1/scrub/batches/:batch_id/attempts",
            get(attempts_handler::<J, G, C>),
        )
        .with_state(service)
}

pub(crate) async fn submit_handler<J, G, C>(
    State(service): State<SharedService<J, G, C>>,
    axum::Json(submission): axum::Json<ScrubSubmission>,
) -> Response
where
    J: ScrubJobRepository + 'static,
    G: RegistryReader + 'static,
    C: ExistingLeadLookup + 'static,
{
    match service.submit(submission) {
        Ok(job) => {
            let view = job.status_view();
            service.launch(job.id);
            (StatusCode::ACCEPTED, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<J, G, C>(
    State(service): State<SharedService<J, G, C>>,
    Path(job_id): Path<String>,
) -> Response
where
    J: ScrubJobRepository + 'static,
    G: RegistryReader + 'static,
    C: ExistingLeadLookup + 'static,
{
    match service.status(&JobId(job_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn result_handler<J, G, C>(
    State(service): State<SharedService<J, G, C>>,
    Path(job_id): Path<String>,
) -> Response
where
    J: ScrubJobRepository + 'static,
    G: RegistryReader + 'static,
    C: ExistingLeadLookup + 'static,
{
    match service.result(&JobId(job_id)) {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn cancel_handler<J, G, C>(
    State(service): State<SharedService<J, G, C>>,
    Path(job_id): Path<String>,
) -> Response
where
    J: ScrubJobRepository + 'static,
    G: RegistryReader + 'static,
    C: ExistingLeadLookup + 'static,
{
    match service.cancel(&JobId(job_id)) {
        Ok(job) => (StatusCode::ACCEPTED, axum::Json(job.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn retry_handler<J, G, C>(
    State(service): State<SharedService<J, G, C>>,
    Path(job_id): Path<String>,
) -> Response
where
    J: ScrubJobRepository + 'static,
    G: RegistryReader + 'static,
    C: ExistingLeadLookup + 'static,
{
    match service.retry(&JobId(job_id)) {
        Ok(job) => {
            let view = job.status_view();
            service.launch(job.id);
            (StatusCode::ACCEPTED, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn attempts_handler<J, G, C>(
    State(service): State<SharedService<J, G, C>>,
    Path(batch_id): Path<String>,
) -> Response
where
    J: ScrubJobRepository + 'static,
    G: RegistryReader + 'static,
    C: ExistingLeadLookup + 'static,
{
    match service.attempts(&BatchId(batch_id)) {
        Ok(attempts) => {
            let views: Vec<_> = attempts.iter().map(|job| job.status_view()).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

fn error_response(error: ScrubServiceError) -> Response {
    let (status, code) = match &error {
        ScrubServiceError::Submission(submission) => {
            (StatusCode::UNPROCESSABLE_ENTITY, submission.code())
        }
        ScrubServiceError::Job(JobError::NotCompleted { .. }) => {
            (StatusCode::CONFLICT, "job_not_completed")
        }
        ScrubServiceError::Job(_) => (StatusCode::CONFLICT, "illegal_job_state"),
        ScrubServiceError::Repository(RepositoryError::NotFound) => {
            (StatusCode::NOT_FOUND, "not_found")
        }
        ScrubServiceError::Repository(RepositoryError::Conflict) => {
            (StatusCode::CONFLICT, "conflict")
        }
        ScrubServiceError::Repository(RepositoryError::Unavailable(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };
    let payload = json!({
        "error": error.to_string(),
        "code": code,
    });
    (status, axum::Json(payload)).into_response()
}
