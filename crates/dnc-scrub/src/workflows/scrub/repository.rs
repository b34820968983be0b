use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::RawLeadRecord;
use super::job::{BatchId, JobId, ScrubJob, ScrubResult};
use crate::workflows::registry::{AuthorizedScope, UserId};

/// Input batch as submitted. Every attempt at scrubbing it reads this copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrubBatch {
    pub id: BatchId,
    pub requested_by: UserId,
    pub scope: AuthorizedScope,
    pub records: Vec<RawLeadRecord>,
    pub submitted_at: DateTime<Utc>,
}

/// Storage for batches, job attempts and frozen results.
pub trait ScrubJobRepository: Send + Sync {
    fn insert_batch(&self, batch: ScrubBatch) -> Result<(), RepositoryError>;
    fn fetch_batch(&self, id: &BatchId) -> Result<Option<ScrubBatch>, RepositoryError>;
    fn insert_job(&self, job: ScrubJob) -> Result<ScrubJob, RepositoryError>;
    fn update_job(&self, job: ScrubJob) -> Result<(), RepositoryError>;
    fn fetch_job(&self, id: &JobId) -> Result<Option<ScrubJob>, RepositoryError>;
    /// Attempts recorded against a batch, oldest first.
    fn jobs_for_batch(&self, id: &BatchId) -> Result<Vec<ScrubJob>, RepositoryError>;
    /// Must fail with [`RepositoryError::Conflict`] if a result is already stored for the job.
    fn store_result(&self, result: ScrubResult) -> Result<(), RepositoryError>;
    fn fetch_result(&self, id: &JobId) -> Result<Option<ScrubResult>, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
