use chrono::NaiveDate;
use dnc_scrub::workflows::registry::{ChangeList, ChangeListId, ChangeListLedger, LedgerError, RegistryStore};
use dnc_scrub::workflows::scrub::{
    BatchId, JobId, RepositoryError, ScrubBatch, ScrubJob, ScrubJobRepository, ScrubResult,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) registry: Arc<RegistryStore>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryScrubJobRepository {
    batches: Arc<Mutex<HashMap<BatchId, ScrubBatch>>>,
    jobs: Arc<Mutex<HashMap<JobId, ScrubJob>>>,
    results: Arc<Mutex<HashMap<JobId, ScrubResult>>>,
}

impl ScrubJobRepository for InMemoryScrubJobRepository {
    fn insert_batch(&self, batch: ScrubBatch) -> Result<(), RepositoryError> {
        let mut guard = self.batches.lock().expect("batch mutex poisoned");
        if guard.contains_key(&batch.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(batch.id.clone(), batch);
        Ok(())
    }

    fn fetch_batch(&self, id: &BatchId) -> Result<Option<ScrubBatch>, RepositoryError> {
        let guard = self.batches.lock().expect("batch mutex poisoned");
        Ok(guard.get(id).cloned())
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
        if guard.contains_key(&job.id) {
            guard.insert(job.id.clone(), job);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch_job(&self, id: &JobId) -> Result<Option<ScrubJob>, RepositoryError> {
        let guard = self.jobs.lock().expect("job mutex poisoned");
        Ok(guard.get(id).cloned())
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
        let guard = self.results.lock().expect("results mutex poisoned");
        Ok(guard.get(id).cloned())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryChangeListLedger {
    records: Arc<Mutex<HashMap<ChangeListId, ChangeList>>>,
}

impl ChangeListLedger for InMemoryChangeListLedger {
    fn insert(&self, change_list: ChangeList) -> Result<(), LedgerError> {
        let mut guard = self.records.lock().expect("ledger mutex poisoned");
        if guard
            .values()
            .any(|existing| existing.fingerprint == change_list.fingerprint)
        {
            return Err(LedgerError::Conflict);
        }
        guard.insert(change_list.id.clone(), change_list);
        Ok(())
    }

    fn update(&self, change_list: ChangeList) -> Result<(), LedgerError> {
        let mut guard = self.records.lock().expect("ledger mutex poisoned");
        if guard.contains_key(&change_list.id) {
            guard.insert(change_list.id.clone(), change_list);
            Ok(())
        } else {
            Err(LedgerError::NotFound)
        }
    }

    fn fetch(&self, id: &ChangeListId) -> Result<Option<ChangeList>, LedgerError> {
        let guard = self.records.lock().expect("ledger mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<ChangeList>, LedgerError> {
        let guard = self.records.lock().expect("ledger mutex poisoned");
        Ok(guard
            .values()
            .find(|existing| existing.fingerprint == fingerprint)
            .cloned())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
