use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dedupe::{resolve_duplicates, ExistingLeadLookup};
use super::domain::{InvalidRecord, LeadRecord, RawLeadRecord, ResolvedLead};
use super::job::{
    BatchId, FailureReason, JobCounts, JobError, JobFailure, JobId, JobStatus, JobStatusView,
    ScoredLead, ScrubJob, ScrubResult,
};
use super::normalizer::normalize_record;
use super::repository::{RepositoryError, ScrubBatch, ScrubJobRepository};
use super::scoring::{Classification, RiskScorer, ScoringConfig};
use crate::config::ScrubConfig;
use crate::workflows::phone::PhoneKey;
use crate::workflows::registry::{
    AuthorizedScope, RegistryError, RegistryHit, RegistryReader, UserId,
};

/// Batch submission as received from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrubSubmission {
    pub requested_by: UserId,
    pub scope: AuthorizedScope,
    pub records: Vec<RawLeadRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("batch contains no records")]
    EmptyBatch,
    #[error("batch of {submitted} records exceeds the authorized limit of {allowed}")]
    QuotaExceeded { submitted: usize, allowed: usize },
}

impl SubmissionError {
    pub const fn code(&self) -> &'static str {
        match self {
            SubmissionError::EmptyBatch => "empty_batch",
            SubmissionError::QuotaExceeded { .. } => "quota_exceeded",
        }
    }
}

/// Error raised by the scrub job service.
#[derive(Debug, thiserror::Error)]
pub enum ScrubServiceError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Worker fan-out and retry budget for one service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub worker_count: usize,
    pub score_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&ScrubConfig::default())
    }
}

impl From<&ScrubConfig> for PipelineSettings {
    fn from(config: &ScrubConfig) -> Self {
        Self {
            worker_count: config.worker_count,
            score_retries: config.score_retries,
            retry_backoff: config.retry_backoff,
        }
    }
}

/// Shared between the runner, its workers and cancel requests.
#[derive(Debug, Default)]
pub(super) struct JobControl {
    cancelled: AtomicBool,
    processed: AtomicUsize,
}

impl JobControl {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn advance(&self, records: usize) {
        self.processed.fetch_add(records, Ordering::AcqRel);
    }

    fn processed(&self) -> usize {
        self.processed.load(Ordering::Acquire)
    }
}

pub(super) struct PipelineOutput {
    clean: Vec<ScoredLead>,
    caution: Vec<ScoredLead>,
    blocked: Vec<ScoredLead>,
    invalid: Vec<InvalidRecord>,
    duplicates_removed: usize,
    existing_leads_checked: bool,
}

impl PipelineOutput {
    fn counts(&self) -> JobCounts {
        JobCounts {
            clean: self.clean.len(),
            caution: self.caution.len(),
            blocked: self.blocked.len(),
            duplicates_removed: self.duplicates_removed,
            invalid: self.invalid.len(),
        }
    }
}

static JOB_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static BATCH_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_job_id() -> JobId {
    let id = JOB_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    JobId(format!("job-{id:06}"))
}

fn next_batch_id() -> BatchId {
    let id = BATCH_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    BatchId(format!("batch-{id:06}"))
}

/// Orchestrates normalize, dedupe and score for submitted lead batches.
pub struct ScrubJobService<J, G, C> {
    jobs: Arc<J>,
    registry: Arc<G>,
    existing: Arc<C>,
    scorer: Arc<RiskScorer>,
    settings: PipelineSettings,
    controls: Mutex<HashMap<JobId, Arc<JobControl>>>,
    transitions: Mutex<()>,
}

impl<J, G, C> ScrubJobService<J, G, C>
where
    J: ScrubJobRepository + 'static,
    G: RegistryReader + 'static,
    C: ExistingLeadLookup + 'static,
{
    pub fn new(jobs: Arc<J>, registry: Arc<G>, existing: Arc<C>, config: &ScrubConfig) -> Self {
        Self::with_settings(
            jobs,
            registry,
            existing,
            PipelineSettings::from(config),
            ScoringConfig::from(config),
        )
    }

    pub fn with_settings(
        jobs: Arc<J>,
        registry: Arc<G>,
        existing: Arc<C>,
        settings: PipelineSettings,
        scoring: ScoringConfig,
    ) -> Self {
        Self {
            jobs,
            registry,
            existing,
            scorer: Arc::new(RiskScorer::new(scoring)),
            settings,
            controls: Mutex::new(HashMap::new()),
            transitions: Mutex::new(()),
        }
    }

    /// Validate and store a batch, returning its first queued attempt.
    pub fn submit(&self, submission: ScrubSubmission) -> Result<ScrubJob, ScrubServiceError> {
        let total_records = submission.records.len();
        if total_records == 0 {
            return Err(SubmissionError::EmptyBatch.into());
        }
        if total_records > submission.scope.max_records {
            return Err(SubmissionError::QuotaExceeded {
                submitted: total_records,
                allowed: submission.scope.max_records,
            }
            .into());
        }

        let submitted_at = Utc::now();
        let batch = ScrubBatch {
            id: next_batch_id(),
            requested_by: submission.requested_by.clone(),
            scope: submission.scope,
            records: submission.records,
            submitted_at,
        };
        let batch_id = batch.id.clone();
        self.jobs.insert_batch(batch)?;

        let job = self.jobs.insert_job(queued_job(
            batch_id,
            None,
            submission.requested_by,
            total_records,
            submitted_at,
        ))?;
        self.register(&job.id)?;

        info!(
            job_id = %job.id,
            batch_id = %job.batch_id,
            requested_by = %job.requested_by.0,
            total_records,
            "scrub job queued"
        );
        Ok(job)
    }

    /// Drive a queued job to a terminal state.
    ///
    /// Pipeline failures end the job as `failed` and are returned as `Ok`; an
    /// `Err` means the job could not be run or recorded at all.
    pub async fn run(&self, job_id: &JobId) -> Result<ScrubJob, ScrubServiceError> {
        let control = self.register(job_id)?;
        let (job, batch) = match self.start(job_id) {
            Ok(started) => started,
            Err(error) => {
                self.release(job_id);
                return Err(error);
            }
        };
        info!(
            job_id = %job.id,
            batch_id = %job.batch_id,
            total_records = job.total_records,
            workers = self.settings.worker_count,
            "scrub job started"
        );

        let today = Utc::now().date_naive();
        let outcome = self.execute(batch, &control, today).await;
        let finished = self.finish(job, outcome, &control);
        self.release(job_id);
        finished
    }

    /// Run a job on the tokio runtime without waiting for it.
    pub fn launch(self: &Arc<Self>, job_id: JobId) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(error) = service.run(&job_id).await {
                warn!(job_id = %job_id, %error, "scrub job did not run");
            }
        })
    }

    pub fn job(&self, job_id: &JobId) -> Result<ScrubJob, ScrubServiceError> {
        let job = self
            .jobs
            .fetch_job(job_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(job)
    }

    pub fn status(&self, job_id: &JobId) -> Result<JobStatusView, ScrubServiceError> {
        let job = self.job(job_id)?;
        let mut view = job.status_view();
        if job.status == JobStatus::Processing {
            if let Some(control) = self.existing_control(job_id)? {
                view.processed_count = view.processed_count.max(control.processed());
            }
        }
        Ok(view)
    }

    /// Frozen result of a completed job.
    pub fn result(&self, job_id: &JobId) -> Result<ScrubResult, ScrubServiceError> {
        let job = self.job(job_id)?;
        if job.status != JobStatus::Completed {
            return Err(JobError::NotCompleted { status: job.status }.into());
        }
        let result = self
            .jobs
            .fetch_result(job_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(result)
    }

    /// Request cancellation. A queued job fails immediately; a running job
    /// fails once its workers finish the records they hold.
    pub fn cancel(&self, job_id: &JobId) -> Result<ScrubJob, ScrubServiceError> {
        let _guard = self.lock_transitions()?;
        let mut job = self.job(job_id)?;

        match job.status {
            JobStatus::Queued => {
                if let Some(control) = self.existing_control(job_id)? {
                    control.cancel();
                }
                // Queued jobs still pass through processing on their way to failed.
                let now = Utc::now();
                job.transition(JobStatus::Processing, now)?;
                job.failure = Some(cancelled_failure());
                job.transition(JobStatus::Failed, now)?;
                self.jobs.update_job(job.clone())?;
                self.release(job_id);
                info!(job_id = %job.id, "queued scrub job cancelled");
            }
            JobStatus::Processing => {
                if let Some(control) = self.existing_control(job_id)? {
                    control.cancel();
                }
                info!(job_id = %job.id, "scrub job cancellation requested");
            }
            status => return Err(JobError::NotCancellable { status }.into()),
        }

        Ok(job)
    }

    /// Queue a new attempt for a failed job's batch. The failed job is left as is.
    pub fn retry(&self, job_id: &JobId) -> Result<ScrubJob, ScrubServiceError> {
        let previous = self.job(job_id)?;
        match &previous.failure {
            Some(failure) if previous.status == JobStatus::Failed => {
                if !failure.retryable {
                    return Err(JobError::FailureNotRetryable {
                        reason: failure.reason,
                    }
                    .into());
                }
            }
            _ => {
                return Err(JobError::NotRetryable {
                    status: previous.status,
                }
                .into())
            }
        }

        self.jobs
            .fetch_batch(&previous.batch_id)?
            .ok_or(RepositoryError::NotFound)?;

        let job = self.jobs.insert_job(queued_job(
            previous.batch_id.clone(),
            Some(previous.id.clone()),
            previous.requested_by.clone(),
            previous.total_records,
            Utc::now(),
        ))?;
        self.register(&job.id)?;

        info!(job_id = %job.id, retry_of = %previous.id, batch_id = %job.batch_id, "scrub job retry queued");
        Ok(job)
    }

    /// Every attempt made against a batch, oldest first.
    pub fn attempts(&self, batch_id: &BatchId) -> Result<Vec<ScrubJob>, ScrubServiceError> {
        let attempts = self.jobs.jobs_for_batch(batch_id)?;
        if attempts.is_empty() {
            return Err(RepositoryError::NotFound.into());
        }
        Ok(attempts)
    }

    pub(super) fn start(&self, job_id: &JobId) -> Result<(ScrubJob, ScrubBatch), ScrubServiceError> {
        let _guard = self.lock_transitions()?;
        let mut job = self.job(job_id)?;
        let batch = self
            .jobs
            .fetch_batch(&job.batch_id)?
            .ok_or(RepositoryError::NotFound)?;

        job.transition(JobStatus::Processing, Utc::now())?;
        self.jobs.update_job(job.clone())?;
        Ok((job, batch))
    }

    pub(super) async fn execute(
        &self,
        batch: ScrubBatch,
        control: &Arc<JobControl>,
        today: NaiveDate,
    ) -> Result<PipelineOutput, JobFailure> {
        let workers = self.settings.worker_count;
        let scope = Arc::new(batch.scope);

        let indexed: Vec<(usize, RawLeadRecord)> = batch.records.into_iter().enumerate().collect();
        let mut handles = Vec::new();
        for chunk in partition(indexed, workers) {
            let control = Arc::clone(control);
            handles.push(tokio::task::spawn_blocking(move || {
                normalize_chunk(chunk, &control)
            }));
        }

        let mut leads: Vec<LeadRecord> = Vec::new();
        let mut invalid: Vec<InvalidRecord> = Vec::new();
        for handle in handles {
            let (chunk_leads, chunk_invalid) = handle.await.map_err(worker_failure)?;
            leads.extend(chunk_leads);
            invalid.extend(chunk_invalid);
        }
        if control.is_cancelled() {
            return Err(cancelled_failure());
        }
        invalid.sort_by_key(|record| record.input_index);
        debug!(valid = leads.len(), invalid = invalid.len(), "normalization finished");

        let mut deduped = resolve_duplicates(leads);
        control.advance(deduped.duplicates_removed);
        debug!(
            survivors = deduped.leads.len(),
            duplicates_removed = deduped.duplicates_removed,
            "duplicate resolution finished"
        );

        let existing_leads_checked = match self.existing.existing(&deduped.keys()) {
            Ok(found) => {
                deduped.mark_existing(&found);
                true
            }
            Err(error) => {
                warn!(%error, "existing-lead cross-check skipped");
                false
            }
        };

        let halt = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();
        for chunk in partition(deduped.leads, workers) {
            let registry = Arc::clone(&self.registry);
            let scorer = Arc::clone(&self.scorer);
            let scope = Arc::clone(&scope);
            let control = Arc::clone(control);
            let halt = Arc::clone(&halt);
            let settings = self.settings.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                score_chunk(
                    chunk,
                    registry.as_ref(),
                    &scorer,
                    &scope,
                    today,
                    &settings,
                    &control,
                    &halt,
                )
            }));
        }

        let mut scored: Vec<ScoredLead> = Vec::new();
        let mut registry_failure: Option<RegistryError> = None;
        for handle in handles {
            match handle.await.map_err(worker_failure)? {
                Ok(chunk) => scored.extend(chunk),
                Err(error) => {
                    registry_failure.get_or_insert(error);
                }
            }
        }
        if let Some(error) = registry_failure {
            return Err(JobFailure {
                reason: FailureReason::RegistryUnavailable,
                detail: error.to_string(),
                retryable: true,
            });
        }
        if control.is_cancelled() {
            return Err(cancelled_failure());
        }

        scored.sort_by_key(|lead| lead.record.input_index);
        let mut output = PipelineOutput {
            clean: Vec::new(),
            caution: Vec::new(),
            blocked: Vec::new(),
            invalid,
            duplicates_removed: deduped.duplicates_removed,
            existing_leads_checked,
        };
        for lead in scored {
            match lead.classification() {
                Classification::Clean => output.clean.push(lead),
                Classification::Caution => output.caution.push(lead),
                Classification::Blocked => output.blocked.push(lead),
            }
        }
        Ok(output)
    }

    pub(super) fn finish(
        &self,
        mut job: ScrubJob,
        outcome: Result<PipelineOutput, JobFailure>,
        control: &JobControl,
    ) -> Result<ScrubJob, ScrubServiceError> {
        let output = match outcome {
            Ok(output) => output,
            Err(failure) => return self.fail(job, failure, control),
        };

        let counts = output.counts();
        if !counts.accounts_for(job.total_records) {
            let failure = JobFailure {
                reason: FailureReason::WorkerFailed,
                detail: format!(
                    "accounted for {} of {} records",
                    counts.scored() + counts.invalid + counts.duplicates_removed,
                    job.total_records
                ),
                retryable: false,
            };
            return self.fail(job, failure, control);
        }

        // A cancel accepted after the last record still wins over completion.
        let _guard = self.lock_transitions()?;
        if control.is_cancelled() {
            return self.fail(job, cancelled_failure(), control);
        }

        let completed_at = Utc::now();
        let result = ScrubResult {
            job_id: job.id.clone(),
            clean: output.clean,
            caution: output.caution,
            blocked: output.blocked,
            invalid: output.invalid,
            duplicates_removed: output.duplicates_removed,
            counts,
            existing_leads_checked: output.existing_leads_checked,
            completed_at,
        };
        if let Err(error) = self.jobs.store_result(result) {
            let failure = JobFailure {
                reason: FailureReason::RepositoryUnavailable,
                detail: error.to_string(),
                retryable: true,
            };
            return self.fail(job, failure, control);
        }

        job.processed_count = job.total_records;
        job.counts = Some(counts);
        job.transition(JobStatus::Completed, completed_at)?;
        self.jobs.update_job(job.clone())?;

        info!(
            job_id = %job.id,
            clean = counts.clean,
            caution = counts.caution,
            blocked = counts.blocked,
            invalid = counts.invalid,
            duplicates_removed = counts.duplicates_removed,
            "scrub job completed"
        );
        Ok(job)
    }

    fn fail(
        &self,
        mut job: ScrubJob,
        failure: JobFailure,
        control: &JobControl,
    ) -> Result<ScrubJob, ScrubServiceError> {
        warn!(
            job_id = %job.id,
            reason = failure.reason.label(),
            detail = %failure.detail,
            retryable = failure.retryable,
            "scrub job failed"
        );
        job.processed_count = job.processed_count.max(control.processed());
        job.failure = Some(failure);
        job.transition(JobStatus::Failed, Utc::now())?;
        self.jobs.update_job(job.clone())?;
        Ok(job)
    }

    fn lock_transitions(&self) -> Result<MutexGuard<'_, ()>, RepositoryError> {
        self.transitions
            .lock()
            .map_err(|_| RepositoryError::Unavailable("job state lock poisoned".to_string()))
    }

    fn lock_controls(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<JobId, Arc<JobControl>>>, RepositoryError> {
        self.controls
            .lock()
            .map_err(|_| RepositoryError::Unavailable("job control lock poisoned".to_string()))
    }

    pub(super) fn register(&self, job_id: &JobId) -> Result<Arc<JobControl>, RepositoryError> {
        let mut controls = self.lock_controls()?;
        Ok(Arc::clone(controls.entry(job_id.clone()).or_default()))
    }

    fn existing_control(&self, job_id: &JobId) -> Result<Option<Arc<JobControl>>, RepositoryError> {
        Ok(self.lock_controls()?.get(job_id).cloned())
    }

    fn release(&self, job_id: &JobId) {
        if let Ok(mut controls) = self.controls.lock() {
            controls.remove(job_id);
        }
    }
}

fn queued_job(
    batch_id: BatchId,
    retry_of: Option<JobId>,
    requested_by: UserId,
    total_records: usize,
    submitted_at: DateTime<Utc>,
) -> ScrubJob {
    ScrubJob {
        id: next_job_id(),
        batch_id,
        retry_of,
        requested_by,
        status: JobStatus::Queued,
        total_records,
        processed_count: 0,
        counts: None,
        failure: None,
        submitted_at,
        started_at: None,
        finished_at: None,
    }
}

fn cancelled_failure() -> JobFailure {
    JobFailure {
        reason: FailureReason::Cancelled,
        detail: "cancelled by request".to_string(),
        retryable: true,
    }
}

fn worker_failure(error: tokio::task::JoinError) -> JobFailure {
    JobFailure {
        reason: FailureReason::WorkerFailed,
        detail: error.to_string(),
        retryable: false,
    }
}

/// Split `items` into at most `workers` contiguous chunks, preserving order.
fn partition<T>(items: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let chunk_size = items.len().div_ceil(workers.max(1));
    let mut chunks = Vec::new();
    let mut current = Vec::with_capacity(chunk_size);
    for item in items {
        current.push(item);
        if current.len() == chunk_size {
            chunks.push(std::mem::replace(&mut current, Vec::with_capacity(chunk_size)));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn normalize_chunk(
    chunk: Vec<(usize, RawLeadRecord)>,
    control: &JobControl,
) -> (Vec<LeadRecord>, Vec<InvalidRecord>) {
    let mut leads = Vec::with_capacity(chunk.len());
    let mut invalid = Vec::new();
    for (input_index, raw) in chunk {
        if control.is_cancelled() {
            break;
        }
        match normalize_record(input_index, &raw) {
            Ok(lead) => leads.push(lead),
            Err(record) => {
                invalid.push(record);
                control.advance(1);
            }
        }
    }
    (leads, invalid)
}

#[allow(clippy::too_many_arguments)]
fn score_chunk<G: RegistryReader + ?Sized>(
    chunk: Vec<ResolvedLead>,
    registry: &G,
    scorer: &RiskScorer,
    scope: &AuthorizedScope,
    today: NaiveDate,
    settings: &PipelineSettings,
    control: &JobControl,
    halt: &AtomicBool,
) -> Result<Vec<ScoredLead>, RegistryError> {
    let mut scored = Vec::with_capacity(chunk.len());
    for lead in chunk {
        if control.is_cancelled() || halt.load(Ordering::Acquire) {
            break;
        }
        let hits = match lookup_with_retry(registry, &lead.record.phone_key, scope, settings) {
            Ok(hits) => hits,
            Err(error) => {
                halt.store(true, Ordering::Release);
                return Err(error);
            }
        };
        let assessment = scorer.score(&lead.record, &hits, scope, today);
        scored.push(ScoredLead::new(lead, assessment));
        control.advance(1);
    }
    Ok(scored)
}

fn lookup_with_retry<G: RegistryReader + ?Sized>(
    registry: &G,
    phone_key: &PhoneKey,
    scope: &AuthorizedScope,
    settings: &PipelineSettings,
) -> Result<Vec<RegistryHit>, RegistryError> {
    let mut attempt: u32 = 0;
    loop {
        match registry.lookup(phone_key, scope) {
            Ok(hits) => return Ok(hits),
            Err(error) if attempt < settings.score_retries => {
                let delay = settings
                    .retry_backoff
                    .saturating_mul(2u32.saturating_pow(attempt));
                debug!(%phone_key, attempt, ?delay, %error, "registry lookup failed, backing off");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
