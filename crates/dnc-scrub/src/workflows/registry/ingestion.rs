use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::domain::{
    ChangeList, ChangeListEntry, ChangeListId, ChangeListRequest, ChangeListStatus, ChangeType,
    EntryFailure, EntryFailureReason, IngestOutcome, IngestionReport, RegistrySource,
    RejectionReason,
};
use super::store::{EntryEffect, RegistryDraft, RegistryError, RegistryStore};
use crate::workflows::phone::{normalize_phone, AreaCode, PhoneKey};

const LOCAL_NUMBER_LENGTH: usize = 7;

/// Persistence collaborator for change-list records. Fingerprints are unique.
pub trait ChangeListLedger: Send + Sync {
    /// Must fail with [`LedgerError::Conflict`] when the fingerprint is already recorded.
    fn insert(&self, change_list: ChangeList) -> Result<(), LedgerError>;
    fn update(&self, change_list: ChangeList) -> Result<(), LedgerError>;
    fn fetch(&self, id: &ChangeListId) -> Result<Option<ChangeList>, LedgerError>;
    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<ChangeList>, LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("change list fingerprint already recorded")]
    Conflict,
    #[error("change list not found")]
    NotFound,
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

static CHANGE_LIST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_change_list_id() -> ChangeListId {
    let id = CHANGE_LIST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ChangeListId(format!("cl-{id:06}"))
}

/// Validated header ready to be applied.
struct ValidatedHeader {
    change_type: ChangeType,
    source: RegistrySource,
    area_codes: BTreeSet<AreaCode>,
}

/// Applies upstream change lists to the registry store, idempotently.
pub struct ChangeListIngestor<L> {
    store: Arc<RegistryStore>,
    ledger: Arc<L>,
    subscribed: RwLock<BTreeSet<AreaCode>>,
}

impl<L> ChangeListIngestor<L>
where
    L: ChangeListLedger + 'static,
{
    pub fn new(
        store: Arc<RegistryStore>,
        ledger: Arc<L>,
        subscribed: impl IntoIterator<Item = AreaCode>,
    ) -> Self {
        Self {
            store,
            ledger,
            subscribed: RwLock::new(subscribed.into_iter().collect()),
        }
    }

    pub fn store(&self) -> &Arc<RegistryStore> {
        &self.store
    }

    pub fn subscribe(&self, area_code: AreaCode) -> Result<(), RegistryError> {
        self.subscribed
            .write()
            .map_err(|_| RegistryError::Unavailable("subscription lock poisoned".to_string()))?
            .insert(area_code);
        Ok(())
    }

    pub fn subscribed(&self) -> Result<BTreeSet<AreaCode>, RegistryError> {
        let guard = self
            .subscribed
            .read()
            .map_err(|_| RegistryError::Unavailable("subscription lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    pub fn change_list(&self, id: &ChangeListId) -> Result<ChangeList, IngestError> {
        self.ledger
            .fetch(id)?
            .ok_or(IngestError::Ledger(LedgerError::NotFound))
    }

    /// Validate and apply a change list.
    ///
    /// Re-submitting a fingerprint that is already on record returns
    /// [`IngestOutcome::Duplicate`] without touching the registry, unless the
    /// earlier attempt failed before any entry reached the registry.
    pub fn ingest(
        &self,
        request: ChangeListRequest,
        entries: Vec<ChangeListEntry>,
    ) -> Result<IngestOutcome, IngestError> {
        let header = match self.validate(&request)? {
            Ok(header) => header,
            Err(reason) => {
                warn!(%reason, submitted_by = %request.submitted_by.0, "change list rejected");
                return Ok(IngestOutcome::Rejected { reason });
            }
        };

        let fingerprint = match request.fingerprint.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => fingerprint_for(&request, &header, &entries),
        };

        let mut change_list = match self.ledger.find_by_fingerprint(&fingerprint)? {
            Some(existing) if existing.can_reapply() => {
                info!(change_list_id = %existing.id, "re-applying change list after a failed write");
                ChangeList {
                    submitted_by: request.submitted_by,
                    finished_at: None,
                    report: IngestionReport {
                        entries: entries.len(),
                        ..IngestionReport::default()
                    },
                    failure: None,
                    ..existing
                }
            }
            Some(existing) => {
                info!(existing_id = %existing.id, "change list fingerprint already ingested");
                return Ok(IngestOutcome::Duplicate {
                    existing_id: existing.id,
                });
            }
            None => {
                let change_list = ChangeList {
                    id: next_change_list_id(),
                    change_type: header.change_type,
                    source: header.source,
                    source_file_date: request.source_file_date,
                    area_codes: header.area_codes,
                    fingerprint,
                    status: ChangeListStatus::Pending,
                    submitted_by: request.submitted_by,
                    received_at: Utc::now(),
                    finished_at: None,
                    report: IngestionReport {
                        entries: entries.len(),
                        ..IngestionReport::default()
                    },
                    failure: None,
                };

                match self.ledger.insert(change_list.clone()) {
                    Ok(()) => {}
                    Err(LedgerError::Conflict) => {
                        // Lost a race with a concurrent submission of the same file.
                        let existing = self
                            .ledger
                            .find_by_fingerprint(&change_list.fingerprint)?
                            .ok_or(LedgerError::NotFound)?;
                        return Ok(IngestOutcome::Duplicate {
                            existing_id: existing.id,
                        });
                    }
                    Err(other) => return Err(other.into()),
                }
                change_list
            }
        };

        change_list.status = ChangeListStatus::Processing;
        self.ledger.update(change_list.clone())?;

        let applied = self
            .store
            .begin_write()
            .and_then(|mut draft| {
                let report = apply_entries(&mut draft, &change_list, &entries);
                draft.publish().map(|version| (report, version))
            });

        let (report, version) = match applied {
            Ok(result) => result,
            Err(err) => {
                change_list.status = ChangeListStatus::Failed;
                change_list.failure = Some(err.to_string());
                change_list.finished_at = Some(Utc::now());
                self.ledger.update(change_list)?;
                return Err(err.into());
            }
        };

        change_list.report = report;
        change_list.finished_at = Some(Utc::now());
        let failed = !change_list.report.failures.is_empty();
        change_list.status = if failed {
            ChangeListStatus::Failed
        } else {
            ChangeListStatus::Completed
        };
        if failed {
            change_list.failure = Some(format!(
                "{} of {} entries could not be applied",
                change_list.report.failures.len(),
                change_list.report.entries
            ));
        }
        self.ledger.update(change_list.clone())?;

        info!(
            change_list_id = %change_list.id,
            change_type = change_list.change_type.label(),
            source = %change_list.source,
            added = change_list.report.added,
            removed = change_list.report.removed,
            unchanged = change_list.report.unchanged,
            failures = change_list.report.failures.len(),
            registry_version = version,
            "change list ingested"
        );

        Ok(if failed {
            IngestOutcome::Failed { change_list }
        } else {
            IngestOutcome::Applied { change_list }
        })
    }

    fn validate(
        &self,
        request: &ChangeListRequest,
    ) -> Result<Result<ValidatedHeader, RejectionReason>, RegistryError> {
        let Some(change_type) = ChangeType::parse(&request.change_type) else {
            return Ok(Err(RejectionReason::UnknownChangeType {
                value: request.change_type.clone(),
            }));
        };

        let source = match request.source.as_deref() {
            None => RegistrySource::National,
            Some(raw) => match RegistrySource::parse(raw) {
                Some(source) => source,
                None => {
                    return Ok(Err(RejectionReason::InvalidSource {
                        value: raw.to_string(),
                    }))
                }
            },
        };

        if request.area_codes.is_empty() {
            return Ok(Err(RejectionReason::EmptyAreaCodes));
        }

        let subscribed = self.subscribed()?;
        let mut area_codes = BTreeSet::new();
        for raw in &request.area_codes {
            let Ok(area_code) = AreaCode::parse(raw) else {
                return Ok(Err(RejectionReason::InvalidAreaCode { value: raw.clone() }));
            };
            if !subscribed.contains(&area_code) {
                return Ok(Err(RejectionReason::UnauthorizedAreaCode { area_code }));
            }
            area_codes.insert(area_code);
        }

        Ok(Ok(ValidatedHeader {
            change_type,
            source,
            area_codes,
        }))
    }
}

fn apply_entries(
    draft: &mut RegistryDraft<'_>,
    change_list: &ChangeList,
    entries: &[ChangeListEntry],
) -> IngestionReport {
    let mut report = IngestionReport {
        entries: entries.len(),
        ..IngestionReport::default()
    };

    for (index, entry) in entries.iter().enumerate() {
        let (phone_key, area_code) = match resolve_entry(entry, &change_list.area_codes) {
            Ok(resolved) => resolved,
            Err(reason) => {
                report.failures.push(EntryFailure {
                    index,
                    area_code: entry.area_code.clone(),
                    phone: entry.phone.clone(),
                    reason,
                });
                continue;
            }
        };

        let effect = match change_list.change_type {
            ChangeType::Additions => draft.add(
                phone_key,
                &change_list.source,
                &area_code,
                change_list.source_file_date,
                &change_list.id,
            ),
            ChangeType::Deletions => draft.remove(
                &phone_key,
                &change_list.source,
                &area_code,
                change_list.source_file_date,
                &change_list.id,
            ),
        };

        match effect {
            EntryEffect::Added => report.added += 1,
            EntryEffect::Removed => report.removed += 1,
            EntryEffect::Unchanged => report.unchanged += 1,
        }
    }

    report
}

fn resolve_entry(
    entry: &ChangeListEntry,
    allowed: &BTreeSet<AreaCode>,
) -> Result<(PhoneKey, AreaCode), EntryFailureReason> {
    let area_code =
        AreaCode::parse(&entry.area_code).map_err(|_| EntryFailureReason::InvalidAreaCode)?;
    if !allowed.contains(&area_code) {
        return Err(EntryFailureReason::AreaCodeNotInChangeList);
    }

    let local_digits: String = entry
        .phone
        .chars()
        .filter(|ch| ch.is_ascii_digit())
        .collect();
    let candidate = if local_digits.len() == LOCAL_NUMBER_LENGTH
        && entry
            .phone
            .chars()
            .all(|ch| ch.is_ascii_digit() || matches!(ch, ' ' | '-' | '.'))
    {
        format!("{}{}", area_code.as_str(), local_digits)
    } else {
        entry.phone.clone()
    };

    let phone_key = normalize_phone(&candidate)
        .map_err(|rejection| EntryFailureReason::InvalidPhone { rejection })?;
    if phone_key.area_code() != area_code {
        return Err(EntryFailureReason::AreaCodeMismatch);
    }

    Ok((phone_key, area_code))
}

/// Content fingerprint used when the upstream feed does not supply one.
fn fingerprint_for(
    request: &ChangeListRequest,
    header: &ValidatedHeader,
    entries: &[ChangeListEntry],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(header.change_type.label().as_bytes());
    hasher.update(b"\n");
    hasher.update(header.source.label().as_bytes());
    hasher.update(b"\n");
    hasher.update(request.source_file_date.to_string().as_bytes());
    hasher.update(b"\n");
    for area_code in &header.area_codes {
        hasher.update(area_code.as_str().as_bytes());
        hasher.update(b",");
    }
    hasher.update(b"\n");

    let mut rows: Vec<String> = entries
        .iter()
        .map(|entry| format!("{}|{}", entry.area_code.trim(), entry.phone.trim()))
        .collect();
    rows.sort();
    for row in rows {
        hasher.update(row.as_bytes());
        hasher.update(b"\n");
    }

    hex::encode(hasher.finalize())
}
