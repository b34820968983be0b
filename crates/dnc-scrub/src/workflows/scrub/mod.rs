//! Lead batch scrubbing: normalize, collapse duplicates, score against the
//! registry, and publish a frozen classification per job attempt.

pub mod dedupe;
pub mod domain;
pub mod job;
pub mod normalizer;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use dedupe::{resolve_duplicates, DedupOutcome, ExistingLeadLookup, LookupError, NoExistingLeads};
pub use domain::{FieldIssue, FieldWarning, InvalidRecord, LeadRecord, RawLeadRecord, ResolvedLead};
pub use job::{
    BatchId, FailureReason, JobCounts, JobError, JobFailure, JobId, JobStatus, JobStatusView,
    ScoredLead, ScrubJob, ScrubResult,
};
pub use normalizer::normalize_record;
pub use repository::{RepositoryError, ScrubBatch, ScrubJobRepository};
pub use router::scrub_router;
pub use scoring::{
    Classification, RiskAssessment, RiskFactor, RiskFlag, RiskScorer, ScoreComponent,
    ScoringConfig,
};
pub use service::{
    PipelineSettings, ScrubJobService, ScrubServiceError, ScrubSubmission, SubmissionError,
};
