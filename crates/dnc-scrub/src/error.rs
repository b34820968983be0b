use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::registry::{ChangeListFileError, IngestError, LedgerError, RegistryError};
use crate::workflows::scrub::{RepositoryError, ScrubServiceError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Scrub(ScrubServiceError),
    Ingest(IngestError),
    ChangeListFile(ChangeListFileError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Scrub(err) => write!(f, "scrub error: {}", err),
            AppError::Ingest(err) => write!(f, "ingestion error: {}", err),
            AppError::ChangeListFile(err) => write!(f, "change list file error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Scrub(err) => Some(err),
            AppError::Ingest(err) => Some(err),
            AppError::ChangeListFile(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Scrub(ScrubServiceError::Submission(_)) | AppError::ChangeListFile(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Scrub(ScrubServiceError::Repository(RepositoryError::NotFound))
            | AppError::Ingest(IngestError::Ledger(LedgerError::NotFound)) => {
                StatusCode::NOT_FOUND
            }
            AppError::Scrub(ScrubServiceError::Job(_))
            | AppError::Scrub(ScrubServiceError::Repository(RepositoryError::Conflict))
            | AppError::Ingest(IngestError::Ledger(LedgerError::Conflict)) => StatusCode::CONFLICT,
            AppError::Scrub(ScrubServiceError::Repository(RepositoryError::Unavailable(_)))
            | AppError::Ingest(IngestError::Ledger(LedgerError::Unavailable(_)))
            | AppError::Ingest(IngestError::Registry(RegistryError::Unavailable(_))) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<ScrubServiceError> for AppError {
    fn from(value: ScrubServiceError) -> Self {
        Self::Scrub(value)
    }
}

impl From<IngestError> for AppError {
    fn from(value: IngestError) -> Self {
        Self::Ingest(value)
    }
}

impl From<ChangeListFileError> for AppError {
    fn from(value: ChangeListFileError) -> Self {
        Self::ChangeListFile(value)
    }
}
