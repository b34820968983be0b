use super::config::ScoringConfig;
use super::rules::ScoreSignals;
use super::Classification;

const MAX_SCORE: i16 = 100;

pub(crate) fn classify(
    total_score: i16,
    signals: &ScoreSignals,
    config: &ScoringConfig,
) -> (u8, Classification) {
    let score = total_score.clamp(0, MAX_SCORE) as u8;

    if signals.litigator || score >= config.blocked_threshold {
        return (score, Classification::Blocked);
    }

    if score >= config.caution_threshold {
        return (score, Classification::Caution);
    }

    (score, Classification::Clean)
}
