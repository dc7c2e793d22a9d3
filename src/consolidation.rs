//! Consolidation: replay recent memories in time order to reinforce links
//! between neighbours, then flag near-duplicate pairs.

use crate::error::Result;
use crate::memory::Memories;
use crate::scoring::parse_timestamp;
use crate::search::SearchFilters;
use crate::types::{ConsolidationStats, LinkType, Memory, MergeCandidate};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

/// Confidence added to each replayed pair
const REPLAY_DELTA: f64 = 0.1;

/// Neighbours inspected per memory during merge detection
const MERGE_SEARCH_RESULTS: usize = 3;

const SNIPPET_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationSettings {
    pub window_hours: i64,
    pub max_replay_events: usize,
    pub merge_threshold: f64,
    pub max_merge_candidates: usize,
}

impl Default for ConsolidationSettings {
    fn default() -> Self {
        Self {
            window_hours: 24,
            max_replay_events: 100,
            merge_threshold: 0.10,
            max_merge_candidates: 5,
        }
    }
}

fn snippet(content: &str) -> String {
    content.chars().take(SNIPPET_CHARS).collect()
}

pub struct ConsolidationEngine {
    settings: ConsolidationSettings,
}

impl ConsolidationEngine {
    pub fn new(settings: ConsolidationSettings) -> Self {
        Self { settings }
    }

    pub fn run(&self, memories: &Memories) -> Result<ConsolidationStats> {
        let cutoff = self.cutoff(memories.now());
        let recent = self.collect_recent(memories, cutoff)?;

        let mut stats = ConsolidationStats::default();
        if recent.is_empty() {
            return Ok(stats);
        }

        let mut refreshed: HashSet<&str> = HashSet::new();
        for pair in recent.windows(2) {
            if stats.replay_events >= self.settings.max_replay_events {
                break;
            }
            let (left, right) = (&pair[0], &pair[1]);

            if memories.link(&left.id, &right.id, LinkType::Related)? {
                stats.link_updates += 1;
            }
            if memories.bump_confidence(&left.id, &right.id, REPLAY_DELTA)? {
                stats.coactivation_updates += 1;
            }

            refreshed.insert(&left.id);
            refreshed.insert(&right.id);
            stats.replay_events += 1;
        }
        stats.refreshed_memories = if recent.len() == 1 { 1 } else { refreshed.len() };

        stats.merge_candidates = self.detect_merges(memories, &recent);

        info!(
            "Consolidated {} memories: {} replays, {} new links, {} reinforced, {} merge candidates",
            recent.len(),
            stats.replay_events,
            stats.link_updates,
            stats.coactivation_updates,
            stats.merge_candidates.len()
        );
        Ok(stats)
    }

    /// Start of the replay window. A window reaching past the representable
    /// range covers the whole history.
    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_hours(self.settings.window_hours.max(1))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Memories inside the window, oldest first. Unparsable timestamps are
    /// left out.
    fn collect_recent(&self, memories: &Memories, cutoff: DateTime<Utc>) -> Result<Vec<Memory>> {
        let mut recent: Vec<(DateTime<Utc>, Memory)> = memories
            .list_recent(self.settings.max_replay_events.saturating_mul(2), None)?
            .into_iter()
            .filter_map(|m| parse_timestamp(&m.timestamp).map(|ts| (ts, m)))
            .filter(|(ts, _)| *ts >= cutoff)
            .collect();
        recent.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(recent.into_iter().map(|(_, m)| m).collect())
    }

    /// Pairs closer than `merge_threshold`, each reported once
    fn detect_merges(&self, memories: &Memories, recent: &[Memory]) -> Vec<MergeCandidate> {
        let limit = self.settings.max_merge_candidates;
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut candidates = Vec::new();

        for memory in recent {
            if candidates.len() >= limit {
                break;
            }

            let neighbours = match memories.search(&memory.content, MERGE_SEARCH_RESULTS, &SearchFilters::default()) {
                Ok(neighbours) => neighbours,
                Err(e) => {
                    warn!("Merge search failed for {}: {}", memory.id, e);
                    continue;
                }
            };

            for hit in neighbours {
                if candidates.len() >= limit {
                    break;
                }
                if hit.memory.id == memory.id || hit.distance >= self.settings.merge_threshold {
                    continue;
                }

                let (a, b) = if memory.id <= hit.memory.id {
                    (memory, &hit.memory)
                } else {
                    (&hit.memory, memory)
                };
                if !seen.insert((a.id.clone(), b.id.clone())) {
                    continue;
                }

                candidates.push(MergeCandidate {
                    id_a: a.id.clone(),
                    id_b: b.id.clone(),
                    distance: hit.distance,
                    snippet_a: snippet(&a.content),
                    snippet_b: snippet(&b.content),
                });
            }
        }
        candidates
    }
}
