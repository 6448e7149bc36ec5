//! Relevance scoring
//!
//! relevance = clamp((native + overlap boost) × time decay, 0, 1)

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::memory::text::shared_token_count;

/// Native score of a cached turn by its position in the recent list.
pub fn cache_recency_score(position: usize) -> f32 {
    match position {
        0..=1 => 1.0,
        2..=4 => 0.9,
        5..=9 => 0.8,
        _ => 0.7,
    }
}

/// Boost for distinct query tokens that also appear in `text`.
pub fn overlap_boost(query_tokens: &HashSet<String>, text: &str, config: &ScoringConfig) -> f32 {
    let shared = shared_token_count(query_tokens, text) as f32;
    (shared * config.overlap_boost_per_token).min(config.overlap_boost_cap)
}

/// Multiplier for a candidate of the given age. No timestamp means oldest.
pub fn time_decay(
    timestamp: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &ScoringConfig,
) -> f32 {
    let Some(timestamp) = timestamp else {
        return config.oldest_multiplier;
    };
    let age_days = (now - timestamp).num_seconds() as f64 / 86_400.0;

    config
        .decay_steps
        .iter()
        .find(|step| age_days < step.max_age_days as f64)
        .map(|step| step.multiplier)
        .unwrap_or(config.oldest_multiplier)
}

/// Combine the factors into a relevance in [0, 1].
pub fn relevance(native: f32, boost: f32, decay: f32) -> f32 {
    let score = (native + boost) * decay;
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}
