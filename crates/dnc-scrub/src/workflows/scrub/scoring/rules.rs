use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};

use super::super::domain::LeadRecord;
use super::config::ScoringConfig;
use super::{RiskFactor, RiskFlag, ScoreComponent};
use crate::workflows::registry::{AuthorizedScope, RegistryHit, RegistrySource};

pub(crate) struct ScoreSignals {
    pub litigator: bool,
}

pub(crate) fn score_lead(
    lead: &LeadRecord,
    hits: &[RegistryHit],
    scope: &AuthorizedScope,
    reference: NaiveDate,
    config: &ScoringConfig,
) -> (Vec<ScoreComponent>, i16, BTreeSet<RiskFlag>, ScoreSignals) {
    let mut components = Vec::new();
    let mut flags = BTreeSet::new();
    let mut total_score: i16 = 0;

    let find = |source: &RegistrySource| hits.iter().find(|hit| &hit.source == source);
    let litigator_hit = find(&RegistrySource::Litigator);
    let national_hit = find(&RegistrySource::National);
    let state_hit = lead
        .state
        .as_ref()
        .and_then(|state| find(&RegistrySource::State(state.clone())));

    let litigator = litigator_hit.is_some();
    if let Some(hit) = litigator_hit {
        flags.insert(RiskFlag::Litigator);
        components.push(ScoreComponent {
            factor: RiskFactor::Litigator,
            points: config.litigator_score,
            notes: format!("listed as litigator since {}", hit.added_on),
        });
        total_score = config.litigator_score;
    }

    if let Some(hit) = national_hit {
        flags.insert(RiskFlag::National);
        let points = if litigator { 0 } else { config.national_weight };
        components.push(ScoreComponent {
            factor: RiskFactor::NationalRegistry,
            points,
            notes: weighted_note(
                format!("on national registry since {}", hit.added_on),
                litigator,
            ),
        });
        total_score += points;
    }

    if let (Some(hit), Some(state)) = (state_hit, lead.state.as_ref()) {
        flags.insert(RiskFlag::State(state.clone()));
        let points = if litigator { 0 } else { config.state_weight };
        components.push(ScoreComponent {
            factor: RiskFactor::StateRegistry,
            points,
            notes: weighted_note(
                format!("on {} registry since {}", state.as_str(), hit.added_on),
                litigator,
            ),
        });
        total_score += points;
    }

    let area_code = lead.phone_key.area_code();
    if !scope.covers_area(&area_code) {
        flags.insert(RiskFlag::UnknownCoverage);
        components.push(ScoreComponent {
            factor: RiskFactor::Coverage,
            points: 0,
            notes: format!("area code {area_code} outside authorized coverage"),
        });
    }

    let window = Days::new(config.recency_window_days.max(0).unsigned_abs());
    let window_start = reference.checked_sub_days(window).unwrap_or(NaiveDate::MIN);
    let recent = [litigator_hit, national_hit, state_hit]
        .into_iter()
        .flatten()
        .filter(|hit| hit.added_on >= window_start)
        .map(|hit| hit.added_on)
        .max();
    if let Some(added_on) = recent {
        flags.insert(RiskFlag::RecentlyAdded);
        let points = if litigator { 0 } else { config.recency_weight };
        components.push(ScoreComponent {
            factor: RiskFactor::Recency,
            points,
            notes: weighted_note(
                format!(
                    "listed {added_on}, within {} days of {reference}",
                    config.recency_window_days
                ),
                litigator,
            ),
        });
        total_score += points;
    }

    (components, total_score, flags, ScoreSignals { litigator })
}

fn weighted_note(note: String, superseded: bool) -> String {
    if superseded {
        format!("{note} (superseded by litigator match)")
    } else {
        note
    }
}
