use std::collections::{HashMap, HashSet};

use super::domain::{LeadRecord, ResolvedLead};
use crate::workflows::phone::PhoneKey;

/// CRM cross-check for leads the caller already owns.
pub trait ExistingLeadLookup: Send + Sync {
    /// Keys from `keys` that already exist in the CRM.
    fn existing(&self, keys: &[PhoneKey]) -> Result<HashSet<PhoneKey>, LookupError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    #[error("existing-lead lookup unavailable: {0}")]
    Unavailable(String),
}

/// Lookup used when no CRM is connected.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExistingLeads;

impl ExistingLeadLookup for NoExistingLeads {
    fn existing(&self, _keys: &[PhoneKey]) -> Result<HashSet<PhoneKey>, LookupError> {
        Ok(HashSet::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupOutcome {
    pub leads: Vec<ResolvedLead>,
    pub duplicates_removed: usize,
}

impl DedupOutcome {
    pub fn keys(&self) -> Vec<PhoneKey> {
        self.leads
            .iter()
            .map(|lead| lead.record.phone_key.clone())
            .collect()
    }

    pub fn mark_existing(&mut self, existing: &HashSet<PhoneKey>) {
        for lead in &mut self.leads {
            lead.already_exists = existing.contains(&lead.record.phone_key);
        }
    }
}

/// Collapse records sharing a phone key into one representative each.
///
/// The representative is the record with the most populated fields, the
/// lowest input index winning ties. Output follows first-seen input order, so
/// the result does not depend on the order records arrive in.
pub fn resolve_duplicates(mut records: Vec<LeadRecord>) -> DedupOutcome {
    records.sort_by_key(|record| record.input_index);

    let mut groups: Vec<Vec<LeadRecord>> = Vec::new();
    let mut positions: HashMap<PhoneKey, usize> = HashMap::new();
    for record in records {
        match positions.get(&record.phone_key) {
            Some(&position) => groups[position].push(record),
            None => {
                positions.insert(record.phone_key.clone(), groups.len());
                groups.push(vec![record]);
            }
        }
    }

    let mut duplicates_removed = 0;
    let leads = groups
        .into_iter()
        .filter_map(|group| {
            duplicates_removed += group.len().saturating_sub(1);
            let merged_indices = group.iter().map(|record| record.input_index).collect();
            pick_representative(group).map(|record| ResolvedLead {
                record,
                merged_indices,
                already_exists: false,
            })
        })
        .collect();

    DedupOutcome {
        leads,
        duplicates_removed,
    }
}

/// `group` is sorted by input index, so a strict comparison keeps the earliest on ties.
fn pick_representative(group: Vec<LeadRecord>) -> Option<LeadRecord> {
    group.into_iter().reduce(|best, candidate| {
        if candidate.populated_fields() > best.populated_fields() {
            candidate
        } else {
            best
        }
    })
}
