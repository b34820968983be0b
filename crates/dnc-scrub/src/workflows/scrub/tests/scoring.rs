use super::common::*;
use crate::workflows::registry::{RegistryHit, RegistrySource, StateCode};
use crate::workflows::scrub::scoring::{
    Classification, RiskFactor, RiskFlag, RiskScorer, ScoringConfig,
};
use chrono::NaiveDate;
use std::collections::BTreeSet;

fn today() -> NaiveDate {
    date(2025, 10, 1)
}

fn hit(source: RegistrySource, added_on: NaiveDate) -> RegistryHit {
    RegistryHit { source, added_on }
}

fn utah_lead(phone: &str) -> crate::workflows::scrub::domain::LeadRecord {
    let mut record = lead(0, phone);
    record.state = Some(utah());
    record
}

#[test]
fn litigator_match_blocks_and_still_records_other_flags() {
    let record = utah_lead("8015550100");
    let hits = vec![
        hit(RegistrySource::National, date(2019, 3, 1)),
        hit(RegistrySource::Litigator, date(2024, 1, 1)),
        hit(RegistrySource::State(utah()), date(2025, 9, 20)),
    ];

    let assessment = RiskScorer::default().score(&record, &hits, &scope(&["801"]), today());

    assert_eq!(assessment.score, 100);
    assert_eq!(assessment.classification, Classification::Blocked);
    assert_eq!(
        assessment.flags,
        BTreeSet::from([
            RiskFlag::Litigator,
            RiskFlag::National,
            RiskFlag::State(utah()),
            RiskFlag::RecentlyAdded,
        ])
    );
    let superseded: Vec<_> = assessment
        .components
        .iter()
        .filter(|component| component.factor != RiskFactor::Litigator)
        .map(|component| component.points)
        .collect();
    assert_eq!(superseded, vec![0, 0, 0]);
}

#[test]
fn national_listing_alone_is_caution() {
    let record = lead(0, "8015550100");
    let hits = vec![hit(RegistrySource::National, date(2019, 3, 1))];

    let assessment = RiskScorer::default().score(&record, &hits, &scope(&["801"]), today());

    assert_eq!(assessment.score, 40);
    assert_eq!(assessment.classification, Classification::Caution);
    assert_eq!(assessment.flags, BTreeSet::from([RiskFlag::National]));
}

#[test]
fn state_listing_counts_only_for_the_leads_own_state() {
    let colorado = StateCode::parse("CO").expect("valid state");
    let hits = vec![hit(RegistrySource::State(colorado), date(2019, 3, 1))];

    let utah_record = utah_lead("8015550100");
    let assessment = RiskScorer::default().score(&utah_record, &hits, &scope(&["801"]), today());
    assert_eq!(assessment.score, 0);
    assert_eq!(assessment.classification, Classification::Clean);

    let stateless = lead(0, "8015550100");
    let utah_hit = vec![hit(RegistrySource::State(utah()), date(2019, 3, 1))];
    let assessment = RiskScorer::default().score(&stateless, &utah_hit, &scope(&["801"]), today());
    assert!(assessment.flags.is_empty());
}

#[test]
fn recent_listing_adds_weight_relative_to_last_contact() {
    let mut record = utah_lead("8015550100");
    record.last_contact_date = Some(date(2024, 6, 15));
    let hits = vec![
        hit(RegistrySource::National, date(2024, 6, 1)),
        hit(RegistrySource::State(utah()), date(2019, 1, 1)),
    ];

    let assessment = RiskScorer::default().score(&record, &hits, &scope(&["801"]), today());

    assert_eq!(assessment.score, 75);
    assert_eq!(assessment.classification, Classification::Caution);
    assert!(assessment.flags.contains(&RiskFlag::RecentlyAdded));

    record.last_contact_date = None;
    let assessment = RiskScorer::default().score(&record, &hits, &scope(&["801"]), today());
    assert_eq!(assessment.score, 65);
    assert!(!assessment.flags.contains(&RiskFlag::RecentlyAdded));
}

#[test]
fn uncovered_area_code_is_flagged_without_weight() {
    let record = lead(0, "3855550102");

    let assessment = RiskScorer::default().score(&record, &[], &scope(&["801"]), today());

    assert_eq!(assessment.score, 0);
    assert_eq!(assessment.classification, Classification::Clean);
    assert_eq!(assessment.flags, BTreeSet::from([RiskFlag::UnknownCoverage]));
    assert_eq!(assessment.components.len(), 1);
    assert_eq!(assessment.components[0].factor, RiskFactor::Coverage);
}

#[test]
fn thresholds_follow_configuration() {
    let scorer = RiskScorer::new(ScoringConfig {
        blocked_threshold: 60,
        ..ScoringConfig::default()
    });
    let record = utah_lead("8015550100");
    let hits = vec![
        hit(RegistrySource::National, date(2019, 3, 1)),
        hit(RegistrySource::State(utah()), date(2019, 3, 1)),
    ];

    let assessment = scorer.score(&record, &hits, &scope(&["801"]), today());

    assert_eq!(assessment.score, 65);
    assert_eq!(assessment.classification, Classification::Blocked);
}

#[test]
fn flags_serialize_in_precedence_order() {
    let record = utah_lead("3855550102");
    let hits = vec![
        hit(RegistrySource::State(utah()), date(2025, 9, 25)),
        hit(RegistrySource::National, date(2019, 3, 1)),
    ];

    let assessment = RiskScorer::default().score(&record, &hits, &scope(&["801"]), today());
    let payload = serde_json::to_value(&assessment).expect("serialize assessment");

    assert_eq!(
        payload["flags"],
        serde_json::json!(["national", "state:UT", "unknown_coverage", "recently_added"])
    );
    assert_eq!(payload["classification"], "caution");
}

#[test]
fn score_equal_to_blocked_threshold_is_blocked() {
    let scorer = RiskScorer::new(ScoringConfig {
        blocked_threshold: 65,
        ..ScoringConfig::default()
    });
    let record = utah_lead("8015550100");
    let hits = vec![
        hit(RegistrySource::National, date(2019, 3, 1)),
        hit(RegistrySource::State(utah()), date(2019, 3, 1)),
    ];

    let assessment = scorer.score(&record, &hits, &scope(&["801"]), today());

    assert_eq!(assessment.score, 65);
    assert_eq!(assessment.classification, Classification::Blocked);
}

#[test]
fn score_equal_to_caution_threshold_is_caution() {
    let scorer = RiskScorer::new(ScoringConfig {
        national_weight: 30,
        ..ScoringConfig::default()
    });
    let record = lead(0, "8015550100");
    let hits = vec![hit(RegistrySource::National, date(2019, 3, 1))];

    let assessment = scorer.score(&record, &hits, &scope(&["801"]), today());

    assert_eq!(assessment.score, 30);
    assert_eq!(assessment.classification, Classification::Caution);
}

#[test]
fn oversized_recency_window_reaches_back_to_the_earliest_date() {
    let scorer = RiskScorer::new(ScoringConfig {
        recency_window_days: 200_000_000,
        ..ScoringConfig::default()
    });
    let record = lead(0, "8015550100");
    let hits = vec![hit(RegistrySource::National, date(2019, 3, 1))];

    let assessment = scorer.score(&record, &hits, &scope(&["801"]), today());

    assert_eq!(assessment.score, 50);
    assert!(assessment.flags.contains(&RiskFlag::RecentlyAdded));
}
