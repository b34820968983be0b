use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::domain::{FieldIssue, FieldWarning, InvalidRecord, LeadRecord, RawLeadRecord};
use crate::workflows::phone::normalize_phone;
use crate::workflows::registry::StateCode;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"];

/// Build a [`LeadRecord`] from an input row, or report why its phone was unusable.
///
/// Malformed optional fields never reject the row; they are dropped and noted
/// in `field_warnings`.
pub fn normalize_record(
    input_index: usize,
    raw: &RawLeadRecord,
) -> Result<LeadRecord, InvalidRecord> {
    let phone_key = normalize_phone(&raw.phone).map_err(|reason| InvalidRecord {
        input_index,
        raw_phone: raw.phone.clone(),
        reason,
    })?;

    let mut field_warnings = Vec::new();

    let state = clean_text(raw.state.as_deref()).and_then(|value| {
        let parsed = StateCode::parse(&value);
        if parsed.is_none() {
            field_warnings.push(FieldWarning {
                field: "state".to_string(),
                issue: FieldIssue::InvalidState,
            });
        }
        parsed
    });

    let last_contact_date = clean_text(raw.last_contact_date.as_deref()).and_then(|value| {
        let parsed = parse_date(&value);
        if parsed.is_none() {
            field_warnings.push(FieldWarning {
                field: "last_contact_date".to_string(),
                issue: FieldIssue::InvalidDate,
            });
        }
        parsed
    });

    let mut metadata = BTreeMap::new();
    for (key, value) in &raw.extra {
        match scalar_text(value) {
            Some(text) => {
                metadata.insert(key.trim().to_string(), text);
            }
            None => field_warnings.push(FieldWarning {
                field: key.clone(),
                issue: FieldIssue::UnsupportedValue,
            }),
        }
    }

    Ok(LeadRecord {
        input_index,
        phone_key,
        raw_phone: raw.phone.clone(),
        name: clean_text(raw.name.as_deref()).map(|value| collapse_whitespace(&value)),
        email: clean_text(raw.email.as_deref()).map(|value| value.to_ascii_lowercase()),
        address: clean_text(raw.address.as_deref()).map(|value| collapse_whitespace(&value)),
        state,
        last_contact_date,
        metadata,
        field_warnings,
    })
}

fn clean_text(value: Option<&str>) -> Option<String> {
    let cleaned = value?.replace(['\u{feff}', '\u{200b}'], "");
    let trimmed = cleaned.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// Nested arrays and objects have no place in the flat metadata map.
fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => Some(String::new()),
        serde_json::Value::Bool(flag) => Some(flag.to_string()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        serde_json::Value::String(text) => Some(text.trim().to_string()),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    }
}
