use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{InvalidRecord, LeadRecord, ResolvedLead};
use super::scoring::{Classification, RiskAssessment};
use crate::workflows::registry::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub String);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const fn label(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Status only moves forward; terminal states accept nothing.
    pub const fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Cancelled,
    RegistryUnavailable,
    RepositoryUnavailable,
    WorkerFailed,
}

impl FailureReason {
    pub const fn label(self) -> &'static str {
        match self {
            FailureReason::Cancelled => "cancelled",
            FailureReason::RegistryUnavailable => "registry_unavailable",
            FailureReason::RepositoryUnavailable => "repository_unavailable",
            FailureReason::WorkerFailed => "worker_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub reason: FailureReason,
    pub detail: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub clean: usize,
    pub caution: usize,
    pub blocked: usize,
    pub duplicates_removed: usize,
    pub invalid: usize,
}

impl JobCounts {
    pub fn scored(&self) -> usize {
        self.clean + self.caution + self.blocked
    }

    /// Every submitted record is accounted for exactly once.
    pub fn accounts_for(&self, total_records: usize) -> bool {
        self.scored() + self.invalid + self.duplicates_removed == total_records
    }
}

/// One attempt at scrubbing a stored batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrubJob {
    pub id: JobId,
    pub batch_id: BatchId,
    pub retry_of: Option<JobId>,
    pub requested_by: UserId,
    pub status: JobStatus,
    pub total_records: usize,
    pub processed_count: usize,
    pub counts: Option<JobCounts>,
    pub failure: Option<JobFailure>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScrubJob {
    pub fn transition(&mut self, next: JobStatus, at: DateTime<Utc>) -> Result<(), JobError> {
        if !self.status.can_transition_to(next) {
            return Err(JobError::IllegalTransition {
                current: self.status,
                requested: next,
            });
        }
        match next {
            JobStatus::Processing => self.started_at = Some(at),
            JobStatus::Completed | JobStatus::Failed => self.finished_at = Some(at),
            JobStatus::Queued => {}
        }
        self.status = next;
        Ok(())
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id.clone(),
            batch_id: self.batch_id.clone(),
            retry_of: self.retry_of.clone(),
            status: self.status.label(),
            processed_count: self.processed_count,
            total_count: self.total_records,
            counts: self.counts,
            failure: self.failure.clone(),
        }
    }
}

/// Job state exposed to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub batch_id: BatchId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<JobId>,
    pub status: &'static str,
    pub processed_count: usize,
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<JobCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("job cannot move from {} to {}", .current.label(), .requested.label())]
    IllegalTransition {
        current: JobStatus,
        requested: JobStatus,
    },
    #[error("job is {}; results exist only for completed jobs", .status.label())]
    NotCompleted { status: JobStatus },
    #[error("job is already {}", .status.label())]
    NotCancellable { status: JobStatus },
    #[error("job is {}; only failed jobs can be retried", .status.label())]
    NotRetryable { status: JobStatus },
    #[error("job failed with {}, which cannot be retried", .reason.label())]
    FailureNotRetryable { reason: FailureReason },
}

/// A resolved lead with its frozen assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredLead {
    #[serde(flatten)]
    pub record: LeadRecord,
    pub merged_indices: Vec<usize>,
    pub already_exists: bool,
    pub assessment: RiskAssessment,
}

impl ScoredLead {
    pub fn new(lead: ResolvedLead, assessment: RiskAssessment) -> Self {
        Self {
            record: lead.record,
            merged_indices: lead.merged_indices,
            already_exists: lead.already_exists,
            assessment,
        }
    }

    pub fn classification(&self) -> Classification {
        self.assessment.classification
    }
}

/// Output of a completed job. Never revised after completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrubResult {
    pub job_id: JobId,
    pub clean: Vec<ScoredLead>,
    pub caution: Vec<ScoredLead>,
    pub blocked: Vec<ScoredLead>,
    pub invalid: Vec<InvalidRecord>,
    pub duplicates_removed: usize,
    pub counts: JobCounts,
    /// False when the CRM cross-check could not run and `already_exists` is unreliable.
    pub existing_leads_checked: bool,
    pub completed_at: DateTime<Utc>,
}
