use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::workflows::phone::{PhoneKey, PhoneRejection};
use crate::workflows::registry::StateCode;

/// Parsed tabular row handed over by the file-ingestion collaborator.
///
/// Known columns are typed; anything else lands in `extra` and is vetted by
/// the normalizer before it can travel further down the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLeadRecord {
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_contact_date: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RawLeadRecord {
    pub fn with_phone(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            ..Self::default()
        }
    }
}

/// A normalized contact. Produced once per input row and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    /// Position of the row in the submitted batch.
    pub input_index: usize,
    pub phone_key: PhoneKey,
    pub raw_phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StateCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_contact_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_warnings: Vec<FieldWarning>,
}

impl LeadRecord {
    /// Count of populated optional fields, used to pick duplicate representatives.
    pub fn populated_fields(&self) -> usize {
        let typed = [
            self.name.is_some(),
            self.email.is_some(),
            self.address.is_some(),
            self.state.is_some(),
            self.last_contact_date.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count();

        typed
            + self
                .metadata
                .values()
                .filter(|value| !value.is_empty())
                .count()
    }
}

/// Field that did not fit the record schema and was dropped at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldWarning {
    pub field: String,
    pub issue: FieldIssue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldIssue {
    InvalidState,
    InvalidDate,
    UnsupportedValue,
}

/// Row whose phone number could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidRecord {
    pub input_index: usize,
    pub raw_phone: String,
    pub reason: PhoneRejection,
}

/// Survivor of duplicate resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLead {
    pub record: LeadRecord,
    /// Input indices of the rows collapsed into this lead, representative included.
    pub merged_indices: Vec<usize>,
    /// Set when the CRM already holds a lead for this number.
    pub already_exists: bool,
}
