use serde::{Deserialize, Serialize};

use crate::config::ScrubConfig;

/// Weights and thresholds applied by the risk scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub litigator_score: i16,
    pub national_weight: i16,
    pub state_weight: i16,
    pub recency_weight: i16,
    pub recency_window_days: i64,
    pub blocked_threshold: u8,
    pub caution_threshold: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            litigator_score: 100,
            national_weight: 40,
            state_weight: 25,
            recency_weight: 10,
            recency_window_days: 30,
            blocked_threshold: 80,
            caution_threshold: 30,
        }
    }
}

impl From<&ScrubConfig> for ScoringConfig {
    fn from(config: &ScrubConfig) -> Self {
        Self {
            recency_window_days: config.recency_window_days,
            ..Self::default()
        }
    }
}
