use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::workflows::phone::{normalize_phone, AreaCode, PhoneKey};
use crate::workflows::registry::{
    AuthorizedScope, ChangeListId, RegistryError, RegistryHit, RegistryReader, RegistrySource,
    RegistryStore, StateCode, UserId,
};
use crate::workflows::scrub::dedupe::{ExistingLeadLookup, LookupError};
use crate::workflows::scrub::domain::{LeadRecord, RawLeadRecord};
use crate::workflows::scrub::job::{BatchId, JobId, ScrubJob, ScrubResult};
use crate::workflows::scrub::normalizer::normalize_record;
use crate::workflows::scrub::repository::{RepositoryError, ScrubBatch, ScrubJobRepository};
use crate::workflows::scrub::scoring::ScoringConfig;
use crate::workflows::scrub::service::{PipelineSettings, ScrubJobService, ScrubSubmission};

pub(super) type MemoryService<G> = ScrubJobService<MemoryJobs, G, MemoryCrm>;

pub(super) fn area(raw: &str) -> AreaCode {
    AreaCode::parse(raw).expect("valid area code")
}

pub(super) fn key(raw: &str) -> PhoneKey {
    normalize_phone(raw).expect("valid phone")
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn utah() -> StateCode {
    StateCode::parse("UT").expect("valid state")
}

pub(super) fn scope(area_codes: &[&str]) -> AuthorizedScope {
    AuthorizedScope {
        area_codes: area_codes.iter().map(|code| area(code)).collect(),
        sources: BTreeSet::from([
            RegistrySource::National,
            RegistrySource::State(utah()),
            RegistrySource::Litigator,
        ]),
        max_records: 100,
    }
}

pub(super) fn lead(index: usize, phone: &str) -> LeadRecord {
    normalize_record(index, &RawLeadRecord::with_phone(phone)).expect("valid lead")
}

pub(super) fn submission(records: Vec<RawLeadRecord>) -> ScrubSubmission {
    ScrubSubmission {
        requested_by: UserId("analyst-7".to_string()),
        scope: scope(&["801", "385"]),
        records,
    }
}

/// Records matching the worked example: two spellings of one number, one listed.
pub(super) fn example_batch() -> Vec<RawLeadRecord> {
    let mut first = RawLeadRecord::with_phone("(801) 555-0100");
    first.name = Some("Dana Whitfield".to_string());
    let mut second = RawLeadRecord::with_phone("8015550100");
    second.name = Some("Dana Whitfield".to_string());
    second.email = Some("dana@example.com".to_string());
    vec![
        first,
        RawLeadRecord::with_phone("801-555-0101"),
        second,
        RawLeadRecord::with_phone("385.555.0102"),
        RawLeadRecord::with_phone("801 555 0103"),
    ]
}

/// Store with fixed listings:
/// 801-555-0101 national (2020), 801-555-0103 litigator (2020),
/// 385-555-0102 state:UT (2020).
pub(super) fn seeded_store() -> Arc<RegistryStore> {
    let store = Arc::new(RegistryStore::new());
    let change_list = ChangeListId("cl-seed".to_string());
    let listed_on = date(2020, 1, 15);
    let mut draft = store.begin_write().expect("writer available");
    draft.add(
        key("8015550101"),
        &RegistrySource::National,
        &area("801"),
        listed_on,
        &change_list,
    );
    draft.add(
        key("8015550103"),
        &RegistrySource::Litigator,
        &area("801"),
        listed_on,
        &change_list,
    );
    draft.add(
        key("3855550102"),
        &RegistrySource::State(utah()),
        &area("385"),
        listed_on,
        &change_list,
    );
    draft.publish().expect("publish seed snapshot");
    store
}

pub(super) fn settings(worker_count: usize) -> PipelineSettings {
    PipelineSettings {
        worker_count,
        score_retries: 2,
        retry_backoff: Duration::from_millis(1),
    }
}

pub(super) fn build_service<G>(registry: Arc<G>) -> (Arc<MemoryService<G>>, Arc<MemoryJobs>)
where
    G: RegistryReader + 'static,
{
    build_service_with(registry, settings(2), MemoryCrm::default())
}

pub(super) fn build_service_with<G>(
    registry: Arc<G>,
    settings: PipelineSettings,
    crm: MemoryCrm,
) -> (Arc<MemoryService<G>>, Arc<MemoryJobs>)
where
    G: RegistryReader + 'static,
{
    let jobs = Arc::new(MemoryJobs::default());
    let service = ScrubJobService::with_settings(
        jobs.clone(),
        registry,
        Arc::new(crm),
        settings,
        ScoringConfig::default(),
    );
    (Arc::new(service), jobs)
}

#[derive(Default, Clone)]
pub(super) struct MemoryJobs {
    batches: Arc<Mutex<HashMap<BatchId, ScrubBatch>>>,
    jobs: Arc<Mutex<HashMap<JobId, ScrubJob>>>,
    results: Arc<Mutex<HashMap<JobId, ScrubResult>>>,
}

impl MemoryJobs {
    pub(super) fn result_count(&self) -> usize {
        self.results.lock().expect("results mutex poisoned").len()
    }
}

impl ScrubJobRepository for MemoryJobs {
    fn insert_batch(&self, batch: ScrubBatch) -> Result<(), RepositoryError> {
        let mut guard = self.batches.lock().expect("batch mutex poisoned");
        if guard.contains_key(&batch.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(batch.id.clone(), batch);
        Ok(())
    }

    fn fetch_batch(&self, id: &BatchId) -> Result<Option<ScrubBatch>, RepositoryError> {
        Ok(self
            .batches
            .lock()
            .expect("batch mutex poisoned")
            .get(id)
            .cloned())
    }

    fn insert_job(&self, job: ScrubJob) -> Result<ScrubJob, RepositoryError> {
        let mut guard = self.jobs.lock().expect("job mutex poisoned");
        if guard.contains_key(&job.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    fn update_job(&self, job: ScrubJob) -> Result<(), RepositoryError> {
        let mut guard = self.jobs.lock().expect("job mutex poisoned");
        guard.insert(job.id.clone(), job);
        Ok(())
    }

    fn fetch_job(&self, id: &JobId) -> Result<Option<ScrubJob>, RepositoryError> {
        Ok(self.jobs.lock().expect("job mutex poisoned").get(id).cloned())
    }

    fn jobs_for_batch(&self, id: &BatchId) -> Result<Vec<ScrubJob>, RepositoryError> {
        let guard = self.jobs.lock().expect("job mutex poisoned");
        let mut attempts: Vec<ScrubJob> = guard
            .values()
            .filter(|job| &job.batch_id == id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| (a.submitted_at, &a.id).cmp(&(b.submitted_at, &b.id)));
        Ok(attempts)
    }

    fn store_result(&self, result: ScrubResult) -> Result<(), RepositoryError> {
        let mut guard = self.results.lock().expect("results mutex poisoned");
        if guard.contains_key(&result.job_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(result.job_id.clone(), result);
        Ok(())
    }

    fn fetch_result(&self, id: &JobId) -> Result<Option<ScrubResult>, RepositoryError> {
        Ok(self
            .results
            .lock()
            .expect("results mutex poisoned")
            .get(id)
            .cloned())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryCrm {
    known: HashSet<PhoneKey>,
    offline: bool,
}

impl MemoryCrm {
    pub(super) fn with_known(keys: impl IntoIterator<Item = PhoneKey>) -> Self {
        Self {
            known: keys.into_iter().collect(),
            offline: false,
        }
    }

    pub(super) fn offline() -> Self {
        Self {
            known: HashSet::new(),
            offline: true,
        }
    }
}

impl ExistingLeadLookup for MemoryCrm {
    fn existing(&self, keys: &[PhoneKey]) -> Result<HashSet<PhoneKey>, LookupError> {
        if self.offline {
            return Err(LookupError::Unavailable("crm offline".to_string()));
        }
        Ok(keys
            .iter()
            .filter(|key| self.known.contains(*key))
            .cloned()
            .collect())
    }
}

/// Fails the first `failures` lookups, then delegates.
pub(super) struct FlakyRegistry {
    inner: Arc<RegistryStore>,
    failures: AtomicUsize,
    pub(super) calls: AtomicUsize,
}

impl FlakyRegistry {
    pub(super) fn new(inner: Arc<RegistryStore>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }
}

impl RegistryReader for FlakyRegistry {
    fn lookup(
        &self,
        phone_key: &PhoneKey,
        scope: &AuthorizedScope,
    ) -> Result<Vec<RegistryHit>, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if remaining.is_ok() {
            return Err(RegistryError::Unavailable("replica restarting".to_string()));
        }
        self.inner.lookup(phone_key, scope)
    }
}

/// Blocks the `block_at`-th lookup until the test releases the gate.
pub(super) struct GatedRegistry {
    inner: Arc<RegistryStore>,
    calls: AtomicUsize,
    block_at: usize,
    gate: Mutex<Option<Receiver<()>>>,
}

impl GatedRegistry {
    pub(super) fn new(inner: Arc<RegistryStore>, block_at: usize, gate: Receiver<()>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            block_at,
            gate: Mutex::new(Some(gate)),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RegistryReader for GatedRegistry {
    fn lookup(
        &self,
        phone_key: &PhoneKey,
        scope: &AuthorizedScope,
    ) -> Result<Vec<RegistryHit>, RegistryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.block_at {
            let gate = self.gate.lock().expect("gate mutex poisoned").take();
            if let Some(gate) = gate {
                let _ = gate.recv_timeout(Duration::from_secs(5));
            }
        }
        self.inner.lookup(phone_key, scope)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
