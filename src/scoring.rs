//! Relevance scoring. Scores are costs: lower means more relevant.

use crate::types::Memory;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Boost per primary emotion label
const EMOTION_BOOSTS: &[(&str, f64)] = &[
    ("excited", 0.4),
    ("surprised", 0.35),
    ("moved", 0.3),
    ("frustrated", 0.28),
    ("sad", 0.25),
    ("anxious", 0.22),
    ("happy", 0.2),
    ("melancholy", 0.18),
    ("nostalgic", 0.15),
    ("curious", 0.1),
    ("contentment", 0.08),
    ("neutral", 0.0),
];

/// Weight of a secondary emotion in emotion counts
const SECONDARY_EMOTION_WEIGHT: f64 = 0.4;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Weights for combining distance, recency and salience
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub semantic_weight: f64,
    pub decay_weight: f64,
    pub emotion_weight: f64,
    pub importance_weight: f64,
    pub half_life_days: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            semantic_weight: 1.0,
            decay_weight: 0.3,
            emotion_weight: 0.2,
            importance_weight: 0.2,
            half_life_days: 30.0,
        }
    }
}

/// Parse an ISO-8601 timestamp. Naive values are taken as UTC.
pub fn parse_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    let timestamp = timestamp.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(timestamp, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Exponential time decay in [0, 1]; 1.0 is fresh.
///
/// Unparsable and future timestamps count as fresh. A non-positive half-life
/// disables decay.
pub fn time_decay(timestamp: &str, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let Some(memory_time) = parse_timestamp(timestamp) else {
        return 1.0;
    };

    let age_seconds = (now - memory_time).num_milliseconds() as f64 / 1000.0;
    if age_seconds < 0.0 || half_life_days <= 0.0 {
        return 1.0;
    }

    let age_days = age_seconds / SECONDS_PER_DAY;
    2f64.powf(-age_days / half_life_days).clamp(0.0, 1.0)
}

/// Emotion-based boost; unknown labels get none
pub fn emotion_boost(emotion: &str) -> f64 {
    EMOTION_BOOSTS
        .iter()
        .find(|(label, _)| *label == emotion)
        .map(|(_, boost)| *boost)
        .unwrap_or(0.0)
}

/// Importance-based boost. 1 maps to 0.0, 5 to 0.4.
pub fn importance_boost(importance: i64) -> f64 {
    (importance.clamp(1, 5) - 1) as f64 / 10.0
}

/// Combined cost, floored at zero
pub fn final_score(
    distance: f64,
    decay: f64,
    emotion_boost: f64,
    importance_boost: f64,
    weights: &ScoringWeights,
) -> f64 {
    let decay_penalty = (1.0 - decay) * weights.decay_weight;
    let total_boost = emotion_boost * weights.emotion_weight + importance_boost * weights.importance_weight;
    (distance * weights.semantic_weight + decay_penalty - total_boost).max(0.0)
}

/// Score a memory retrieved at `distance`
pub fn score_memory(memory: &Memory, distance: f64, now: DateTime<Utc>, weights: &ScoringWeights) -> f64 {
    final_score(
        distance,
        time_decay(&memory.timestamp, now, weights.half_life_days),
        emotion_boost(memory.emotional_trace.primary.as_str()),
        importance_boost(memory.importance),
        weights,
    )
}

/// Count primary emotions (1.0) and secondary emotions (0.4)
pub fn count_emotions_weighted(memories: &[Memory]) -> BTreeMap<String, f64> {
    let mut counts = BTreeMap::new();
    for memory in memories {
        let trace = &memory.emotional_trace;
        *counts.entry(trace.primary.as_str().to_string()).or_insert(0.0) += 1.0;
        for secondary in &trace.secondary {
            *counts.entry(secondary.as_str().to_string()).or_insert(0.0) += SECONDARY_EMOTION_WEIGHT;
        }
    }
    counts
}
