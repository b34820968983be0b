use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::phone::{AreaCode, PhoneKey, PhoneRejection};

/// Opaque caller identity supplied by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Two-letter US state or territory code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StateCode(String);

impl StateCode {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.len() == 2 && trimmed.chars().all(|ch| ch.is_ascii_alphabetic()) {
            Some(Self(trimmed.to_ascii_uppercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StateCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid state code '{value}'"))
    }
}

impl From<StateCode> for String {
    fn from(value: StateCode) -> Self {
        value.0
    }
}

/// Registry a number can be listed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RegistrySource {
    National,
    State(StateCode),
    Litigator,
}

impl RegistrySource {
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "national" => Some(Self::National),
            "litigator" => Some(Self::Litigator),
            other => other
                .strip_prefix("state:")
                .and_then(StateCode::parse)
                .map(Self::State),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::National => "national".to_string(),
            Self::State(code) => format!("state:{}", code.as_str()),
            Self::Litigator => "litigator".to_string(),
        }
    }

    /// Litigator lists are national in reach and are not partitioned by subscription.
    pub fn is_area_scoped(&self) -> bool {
        !matches!(self, Self::Litigator)
    }
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl TryFrom<String> for RegistrySource {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown registry source '{value}'"))
    }
}

impl From<RegistrySource> for String {
    fn from(value: RegistrySource) -> Self {
        value.label()
    }
}

/// Per-caller entitlement supplied by the billing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedScope {
    pub area_codes: BTreeSet<AreaCode>,
    pub sources: BTreeSet<RegistrySource>,
    /// Largest batch the caller may submit in one scrub job.
    pub max_records: usize,
}

impl AuthorizedScope {
    pub fn covers_area(&self, area_code: &AreaCode) -> bool {
        self.area_codes.contains(area_code)
    }

    pub fn authorizes(&self, source: &RegistrySource, area_code: &AreaCode) -> bool {
        if !self.sources.contains(source) {
            return false;
        }
        !source.is_area_scoped() || self.covers_area(area_code)
    }
}

/// One listing of a number on a registry. Removal is recorded, never erased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub phone_key: PhoneKey,
    pub source: RegistrySource,
    pub area_code: AreaCode,
    pub added_on: NaiveDate,
    pub removed_on: Option<NaiveDate>,
    pub added_by: ChangeListId,
    pub removed_by: Option<ChangeListId>,
}

impl RegistryEntry {
    pub fn is_active(&self) -> bool {
        self.removed_on.is_none()
    }
}

/// Match reported to the scorer for an active listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryHit {
    pub source: RegistrySource,
    pub added_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeListId(pub String);

impl fmt::Display for ChangeListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Additions,
    Deletions,
}

impl ChangeType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "additions" | "addition" => Some(Self::Additions),
            "deletions" | "deletion" => Some(Self::Deletions),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Additions => "additions",
            Self::Deletions => "deletions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeListStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ChangeListStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Inbound change-list header as received from the upstream authority feed.
///
/// `change_type`, `source` and `area_codes` stay raw so that validation can
/// report an explicit rejection reason instead of a deserialization error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeListRequest {
    pub change_type: String,
    #[serde(default)]
    pub source: Option<String>,
    pub area_codes: Vec<String>,
    pub source_file_date: NaiveDate,
    #[serde(default)]
    pub fingerprint: Option<String>,
    pub submitted_by: UserId,
}

/// One row of a change list. `phone` may be a full number or the 7-digit
/// local part when the upstream file carries the area code in its own column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeListEntry {
    pub area_code: String,
    pub phone: String,
}

/// Persisted record of a change list and its ingestion result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeList {
    pub id: ChangeListId,
    pub change_type: ChangeType,
    pub source: RegistrySource,
    pub source_file_date: NaiveDate,
    pub area_codes: BTreeSet<AreaCode>,
    pub fingerprint: String,
    pub status: ChangeListStatus,
    pub submitted_by: UserId,
    pub received_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub report: IngestionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ChangeList {
    /// A failed record whose registry write never happened may be submitted again.
    pub fn can_reapply(&self) -> bool {
        self.status == ChangeListStatus::Failed
            && self.report.applied() == 0
            && self.report.failures.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub entries: usize,
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub failures: Vec<EntryFailure>,
}

impl IngestionReport {
    pub fn applied(&self) -> usize {
        self.added + self.removed + self.unchanged
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFailure {
    pub index: usize,
    pub area_code: String,
    pub phone: String,
    pub reason: EntryFailureReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryFailureReason {
    #[error("invalid phone number: {rejection}")]
    InvalidPhone { rejection: PhoneRejection },
    #[error("entry area code is malformed")]
    InvalidAreaCode,
    #[error("entry area code is not listed in the change list header")]
    AreaCodeNotInChangeList,
    #[error("phone number does not belong to the entry's area code")]
    AreaCodeMismatch,
}

/// Why a change list was refused before any entry was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("unknown change type '{value}'")]
    UnknownChangeType { value: String },
    #[error("unknown registry source '{value}'")]
    InvalidSource { value: String },
    #[error("change list does not name any area codes")]
    EmptyAreaCodes,
    #[error("malformed area code '{value}'")]
    InvalidAreaCode { value: String },
    #[error("area code {area_code} is not covered by the registry subscription")]
    UnauthorizedAreaCode { area_code: AreaCode },
}

/// Result of a single `ingest` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Applied { change_list: ChangeList },
    /// Some entries failed; the ones that succeeded remain applied.
    Failed { change_list: ChangeList },
    Rejected { reason: RejectionReason },
    Duplicate { existing_id: ChangeListId },
}

impl IngestOutcome {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Failed { .. } => "failed",
            Self::Rejected { .. } => "rejected",
            Self::Duplicate { .. } => "duplicate",
        }
    }
}
