use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate, Utc};
use dnc_scrub::config::ScrubConfig;
use dnc_scrub::workflows::phone::{normalize_phone, AreaCode, PhoneKey};
use dnc_scrub::workflows::registry::{
    AuthorizedScope, ChangeList, ChangeListEntry, ChangeListId, ChangeListIngestor,
    ChangeListLedger, ChangeListRequest, IngestOutcome, LedgerError, RegistrySource,
    RegistryStore, UserId,
};
use dnc_scrub::workflows::scrub::{
    BatchId, Classification, JobId, JobStatus, NoExistingLeads, RawLeadRecord, RepositoryError,
    RiskFlag, ScrubBatch, ScrubJob, ScrubJobRepository, ScrubJobService, ScrubResult,
    ScrubSubmission,
};

#[derive(Default)]
struct Ledger {
    records: Mutex<HashMap<ChangeListId, ChangeList>>,
}

impl ChangeListLedger for Ledger {
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
        self.records
            .lock()
            .expect("ledger mutex poisoned")
            .insert(change_list.id.clone(), change_list);
        Ok(())
    }

    fn fetch(&self, id: &ChangeListId) -> Result<Option<ChangeList>, LedgerError> {
        Ok(self
            .records
            .lock()
            .expect("ledger mutex poisoned")
            .get(id)
            .cloned())
    }

    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<ChangeList>, LedgerError> {
        Ok(self
            .records
            .lock()
            .expect("ledger mutex poisoned")
            .values()
            .find(|existing| existing.fingerprint == fingerprint)
            .cloned())
    }
}

#[derive(Default)]
struct Jobs {
    batches: Mutex<HashMap<BatchId, ScrubBatch>>,
    jobs: Mutex<HashMap<JobId, ScrubJob>>,
    results: Mutex<HashMap<JobId, ScrubResult>>,
}

impl ScrubJobRepository for Jobs {
    fn insert_batch(&self, batch: ScrubBatch) -> Result<(), RepositoryError> {
        self.batches
            .lock()
            .expect("batch mutex poisoned")
            .insert(batch.id.clone(), batch);
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
        self.jobs
            .lock()
            .expect("job mutex poisoned")
            .insert(job.id.clone(), job.clone());
        Ok(job)
    }

    fn update_job(&self, job: ScrubJob) -> Result<(), RepositoryError> {
        self.jobs
            .lock()
            .expect("job mutex poisoned")
            .insert(job.id.clone(), job);
        Ok(())
    }

    fn fetch_job(&self, id: &JobId) -> Result<Option<ScrubJob>, RepositoryError> {
        Ok(self.jobs.lock().expect("job mutex poisoned").get(id).cloned())
    }

    fn jobs_for_batch(&self, id: &BatchId) -> Result<Vec<ScrubJob>, RepositoryError> {
        let mut attempts: Vec<ScrubJob> = self
            .jobs
            .lock()
            .expect("job mutex poisoned")
            .values()
            .filter(|job| &job.batch_id == id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| a.id.cmp(&b.id));
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

fn area(raw: &str) -> AreaCode {
    AreaCode::parse(raw).expect("valid area code")
}

fn key(raw: &str) -> PhoneKey {
    normalize_phone(raw).expect("valid phone")
}

fn change_list(
    change_type: &str,
    source: &str,
    file_date: NaiveDate,
    phones: &[&str],
) -> (ChangeListRequest, Vec<ChangeListEntry>) {
    let request = ChangeListRequest {
        change_type: change_type.to_string(),
        source: Some(source.to_string()),
        area_codes: vec!["801".to_string()],
        source_file_date: file_date,
        fingerprint: None,
        submitted_by: UserId("registry-sync".to_string()),
    };
    let entries = phones
        .iter()
        .map(|phone| ChangeListEntry {
            area_code: "801".to_string(),
            phone: phone.to_string(),
        })
        .collect();
    (request, entries)
}

fn scope() -> AuthorizedScope {
    AuthorizedScope {
        area_codes: BTreeSet::from([area("801")]),
        sources: BTreeSet::from([RegistrySource::National, RegistrySource::Litigator]),
        max_records: 50,
    }
}

fn batch() -> Vec<RawLeadRecord> {
    vec![
        RawLeadRecord::with_phone("(801) 555-0100"),
        RawLeadRecord::with_phone("801.555.0101"),
        RawLeadRecord::with_phone("+1 801 555 0102"),
        RawLeadRecord::with_phone("8015550100"),
        RawLeadRecord::with_phone("not a phone"),
    ]
}

#[tokio::test]
async fn ingested_change_lists_drive_classification_and_results_stay_frozen() {
    let store = Arc::new(RegistryStore::new());
    let ingestor = ChangeListIngestor::new(
        Arc::clone(&store),
        Arc::new(Ledger::default()),
        [area("801")],
    );

    let today = Utc::now().date_naive();
    let (request, entries) = change_list(
        "additions",
        "national",
        today - Duration::days(400),
        &["5550101"],
    );
    let national = ingestor.ingest(request, entries).expect("ingest national");
    assert!(matches!(national, IngestOutcome::Applied { .. }));

    let (request, entries) = change_list(
        "additions",
        "litigator",
        today - Duration::days(5),
        &["801-555-0102"],
    );
    let litigator = ingestor.ingest(request, entries).expect("ingest litigator");
    assert!(matches!(litigator, IngestOutcome::Applied { .. }));

    let service = Arc::new(ScrubJobService::new(
        Arc::new(Jobs::default()),
        Arc::clone(&store),
        Arc::new(NoExistingLeads),
        &ScrubConfig::default(),
    ));

    let submission = ScrubSubmission {
        requested_by: UserId("analyst-3".to_string()),
        scope: scope(),
        records: batch(),
    };
    let first = service.submit(submission.clone()).expect("submit");
    let finished = service.run(&first.id).await.expect("run");
    assert_eq!(finished.status, JobStatus::Completed);

    let result = service.result(&first.id).expect("result");
    assert_eq!(result.counts.invalid, 1);
    assert_eq!(result.counts.duplicates_removed, 1);
    assert_eq!(result.counts.clean, 1);
    assert_eq!(result.counts.caution, 1);
    assert_eq!(result.counts.blocked, 1);
    assert!(result.counts.accounts_for(5));

    let blocked = &result.blocked[0];
    assert_eq!(blocked.record.phone_key, key("8015550102"));
    assert_eq!(blocked.assessment.score, 100);
    assert!(blocked.assessment.flags.contains(&RiskFlag::RecentlyAdded));
    assert_eq!(result.caution[0].assessment.classification, Classification::Caution);

    let (request, entries) = change_list("deletions", "national", today, &["5550101"]);
    let deletion = ingestor.ingest(request, entries).expect("ingest deletion");
    assert!(matches!(deletion, IngestOutcome::Applied { .. }));

    let second = service.submit(submission).expect("resubmit");
    service.run(&second.id).await.expect("rerun");
    let rerun = service.result(&second.id).expect("second result");
    assert_eq!(rerun.counts.clean, 2);
    assert_eq!(rerun.counts.caution, 0);

    let frozen = service.result(&first.id).expect("first result again");
    assert_eq!(frozen, result);
}

#[tokio::test]
async fn launched_jobs_complete_in_the_background() {
    let service = Arc::new(ScrubJobService::new(
        Arc::new(Jobs::default()),
        Arc::new(RegistryStore::new()),
        Arc::new(NoExistingLeads),
        &ScrubConfig::default(),
    ));

    let job = service
        .submit(ScrubSubmission {
            requested_by: UserId("analyst-3".to_string()),
            scope: scope(),
            records: batch(),
        })
        .expect("submit");
    service.launch(job.id.clone()).await.expect("runner joins");

    let status = service.status(&job.id).expect("status");
    assert_eq!(status.status, "completed");
    assert_eq!(status.processed_count, status.total_count);
}
