mod config;
mod policy;
mod rules;

pub use config::ScoringConfig;

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::LeadRecord;
use crate::workflows::phone::PhoneKey;
use crate::workflows::registry::{AuthorizedScope, RegistryHit, StateCode};
use policy::classify;

/// Stateless scorer applying the configured weights to registry hits.
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    config: ScoringConfig,
}

impl RiskScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score one lead. `today` stands in for the last contact date when the lead has none.
    pub fn score(
        &self,
        lead: &LeadRecord,
        hits: &[RegistryHit],
        scope: &AuthorizedScope,
        today: NaiveDate,
    ) -> RiskAssessment {
        let reference = lead.last_contact_date.unwrap_or(today);
        let (components, total, flags, signals) =
            rules::score_lead(lead, hits, scope, reference, &self.config);
        let (score, classification) = classify(total, &signals, &self.config);

        RiskAssessment {
            phone_key: lead.phone_key.clone(),
            score,
            classification,
            flags,
            components,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Clean,
    Caution,
    Blocked,
}

impl Classification {
    pub const fn label(self) -> &'static str {
        match self {
            Classification::Clean => "clean",
            Classification::Caution => "caution",
            Classification::Blocked => "blocked",
        }
    }
}

/// Reason a lead was scored up. Declaration order is the reporting order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RiskFlag {
    Litigator,
    National,
    State(StateCode),
    UnknownCoverage,
    RecentlyAdded,
}

impl RiskFlag {
    pub fn label(&self) -> String {
        match self {
            RiskFlag::Litigator => "litigator".to_string(),
            RiskFlag::National => "national".to_string(),
            RiskFlag::State(code) => format!("state:{}", code.as_str()),
            RiskFlag::UnknownCoverage => "unknown_coverage".to_string(),
            RiskFlag::RecentlyAdded => "recently_added".to_string(),
        }
    }
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl TryFrom<String> for RiskFlag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "litigator" => Ok(RiskFlag::Litigator),
            "national" => Ok(RiskFlag::National),
            "unknown_coverage" => Ok(RiskFlag::UnknownCoverage),
            "recently_added" => Ok(RiskFlag::RecentlyAdded),
            other => other
                .strip_prefix("state:")
                .and_then(StateCode::parse)
                .map(RiskFlag::State)
                .ok_or_else(|| format!("unknown risk flag '{value}'")),
        }
    }
}

impl From<RiskFlag> for String {
    fn from(value: RiskFlag) -> Self {
        value.label()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    Litigator,
    NationalRegistry,
    StateRegistry,
    Coverage,
    Recency,
}

/// Discrete contribution to a score, kept for compliance audits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub factor: RiskFactor,
    pub points: i16,
    pub notes: String,
}

/// Frozen scoring result for one lead within one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub phone_key: PhoneKey,
    pub score: u8,
    pub classification: Classification,
    pub flags: BTreeSet<RiskFlag>,
    pub components: Vec<ScoreComponent>,
}
