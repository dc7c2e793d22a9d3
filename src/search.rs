//! Semantic search with local post-filters, and hybrid recall that re-ranks
//! search candidates through a Hopfield network.

use crate::codec::memory_from_record;
use crate::error::Result;
use crate::hopfield::AssociativeMemory;
use crate::index::Where;
use crate::memory::Memories;
use crate::scoring::score_memory;
use crate::types::{Category, Emotion, Memory, MemorySearchResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Overfetch and blending knobs for search and recall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallSettings {
    pub filter_overfetch_factor: usize,
    pub filter_overfetch_floor: usize,
    pub recall_overfetch_factor: usize,
    pub recall_overfetch_floor: usize,
    pub semantic_blend: f64,
    pub hopfield_blend: f64,
    pub hopfield_beta: f32,
    pub hopfield_iters: usize,
}

impl Default for RecallSettings {
    fn default() -> Self {
        Self {
            filter_overfetch_factor: 5,
            filter_overfetch_floor: 20,
            recall_overfetch_factor: 3,
            recall_overfetch_floor: 10,
            semantic_blend: 0.6,
            hopfield_blend: 0.4,
            hopfield_beta: 4.0,
            hopfield_iters: 3,
        }
    }
}

/// Search filters. Emotion and category go to the index; the rest are
/// applied after the query.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub emotion: Option<Emotion>,
    pub category: Option<Category>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub valence_range: Option<(f64, f64)>,
    pub arousal_range: Option<(f64, f64)>,
}

fn in_range(value: f64, range: (f64, f64)) -> bool {
    let (lo, hi) = if range.0 <= range.1 { range } else { (range.1, range.0) };
    value >= lo && value <= hi
}

impl SearchFilters {
    /// True when some filter has to be evaluated locally
    pub fn has_local_filters(&self) -> bool {
        self.date_from.is_some()
            || self.date_to.is_some()
            || self.valence_range.is_some()
            || self.arousal_range.is_some()
    }

    pub fn index_filter(&self) -> Option<Where> {
        let mut clauses = Vec::new();
        if let Some(emotion) = self.emotion {
            clauses.push(Where::eq("emotion", emotion.as_str()));
        }
        if let Some(category) = self.category {
            clauses.push(Where::eq("category", category.as_str()));
        }
        Where::all(clauses)
    }

    /// Local predicate. `date_to` compares against the timestamp prefix of the
    /// same length, so a bare date includes that whole day.
    pub fn accepts(&self, memory: &Memory) -> bool {
        let timestamp = memory.timestamp.as_str();
        if let Some(from) = &self.date_from {
            if timestamp < from.as_str() {
                return false;
            }
        }
        if let Some(to) = &self.date_to {
            let prefix = timestamp.get(..to.len()).unwrap_or(timestamp);
            if prefix > to.as_str() {
                return false;
            }
        }

        let trace = &memory.emotional_trace;
        if let Some(range) = self.valence_range {
            if !in_range(trace.valence, range) {
                return false;
            }
        }
        if let Some(range) = self.arousal_range {
            if !in_range(trace.arousal, range) {
                return false;
            }
        }
        true
    }
}

/// Sort ascending by score (cost)
pub(crate) fn sort_by_score(results: &mut [MemorySearchResult]) {
    results.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
}

impl Memories {
    /// Rank memories by relevance to `query`, most relevant first
    pub fn search(&self, query: &str, n: usize, filters: &SearchFilters) -> Result<Vec<MemorySearchResult>> {
        let total = self.count()?;
        if total == 0 || n == 0 {
            return Ok(Vec::new());
        }

        let recall = &self.settings().recall;
        let fetch = if filters.has_local_filters() {
            n.saturating_mul(recall.filter_overfetch_factor).max(recall.filter_overfetch_floor)
        } else {
            n
        };

        let embedding = self.embed_text(query)?;
        let filter = filters.index_filter();
        let hits = self.index().query(&embedding, fetch.min(total), filter.as_ref())?;

        let now = self.now();
        let weights = &self.settings().scoring;
        let mut results: Vec<MemorySearchResult> = hits
            .into_iter()
            .filter_map(|hit| {
                let memory = memory_from_record(&hit.id, &hit.document, &hit.metadata);
                if !filters.accepts(&memory) {
                    return None;
                }
                let score = score_memory(&memory, hit.distance, now, weights);
                Some(MemorySearchResult {
                    memory,
                    distance: hit.distance,
                    score,
                })
            })
            .collect();

        sort_by_score(&mut results);
        results.truncate(n);
        Ok(results)
    }

    /// Hybrid recall: semantic candidates re-ranked by a Hopfield network.
    ///
    /// Re-ranking is best effort. Any failure there is logged and the plain
    /// semantic ranking is returned instead.
    pub fn recall(&self, context: &str, n: usize, filters: &SearchFilters) -> Result<Vec<MemorySearchResult>> {
        if self.count()? == 0 {
            return Ok(Vec::new());
        }

        let recall = &self.settings().recall;
        let fetch = n.saturating_mul(recall.recall_overfetch_factor).max(recall.recall_overfetch_floor);
        let mut candidates = self.search(context, fetch, filters)?;
        if candidates.is_empty() {
            return Ok(candidates);
        }

        match self.hopfield_rerank(context, &candidates, n) {
            Ok(blended) if !blended.is_empty() => return Ok(blended),
            Ok(_) => debug!("Hopfield produced no overlap with candidates, using semantic ranking"),
            Err(e) => warn!("Hopfield recall fallback to semantic-only: {}", e),
        }

        candidates.truncate(n);
        Ok(candidates)
    }

    fn hopfield_rerank(
        &self,
        context: &str,
        candidates: &[MemorySearchResult],
        n: usize,
    ) -> Result<Vec<MemorySearchResult>> {
        let recall = &self.settings().recall;
        let ids: Vec<String> = candidates.iter().map(|c| c.memory.id.clone()).collect();
        let records = self.index().get(Some(&ids), None, None, true)?;

        let mut embeddings = Vec::with_capacity(records.len());
        let mut stored_ids = Vec::with_capacity(records.len());
        let mut contents = Vec::with_capacity(records.len());
        for record in records {
            if let Some(embedding) = record.embedding {
                embeddings.push(embedding);
                stored_ids.push(record.id);
                contents.push(record.document);
            }
        }

        let mut network = AssociativeMemory::new(recall.hopfield_beta, recall.hopfield_iters);
        network.store(&embeddings, &stored_ids, &contents)?;
        if !network.is_loaded() {
            return Ok(Vec::new());
        }

        let query = self.embed_text(context)?;
        let (_, similarities) = network.retrieve(&query)?;

        let by_id: HashMap<&str, &MemorySearchResult> =
            candidates.iter().map(|c| (c.memory.id.as_str(), c)).collect();

        let mut blended: Vec<MemorySearchResult> = network
            .recall_results(&similarities, n)
            .into_iter()
            .filter_map(|hit| {
                let semantic = by_id.get(hit.memory_id.as_str())?;
                let hopfield_cost = 1.0 - hit.similarity as f64;
                Some(MemorySearchResult {
                    memory: semantic.memory.clone(),
                    distance: semantic.distance,
                    score: semantic.score * recall.semantic_blend + hopfield_cost * recall.hopfield_blend,
                })
            })
            .collect();

        sort_by_score(&mut blended);
        blended.truncate(n);
        Ok(blended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::embeddings::Embedder;
    use crate::testing::{memories_with, memories_with_settings, TableEmbedder};
    use crate::types::NewMemory;
    use std::rc::Rc;

    fn embedder() -> Rc<TableEmbedder> {
        let embedder = Rc::new(TableEmbedder::new(3));
        embedder.set("mountain hike", vec![1.0, 0.0, 0.0]);
        embedder.set("ridge walk", vec![0.7, 0.7, 0.0]);
        embedder.set("rainy office day", vec![0.0, 1.0, 0.0]);
        embedder.set("hiking", vec![1.0, 0.05, 0.0]);
        embedder
    }

    fn new_memory(content: &str, emotion: Emotion, valence: f64) -> NewMemory {
        NewMemory {
            emotion,
            valence,
            ..NewMemory::new(content)
        }
    }

    #[test]
    fn test_search_empty_index() {
        let mem = memories_with(embedder());
        assert!(mem.search("hiking", 5, &SearchFilters::default()).unwrap().is_empty());
        assert!(mem.recall("hiking", 5, &SearchFilters::default()).unwrap().is_empty());
    }

    #[test]
    fn test_search_ranks_by_ascending_score() {
        let mem = memories_with(embedder());
        mem.save(new_memory("rainy office day", Emotion::Neutral, 0.0)).unwrap();
        mem.save(new_memory("mountain hike", Emotion::Neutral, 0.0)).unwrap();
        mem.save(new_memory("ridge walk", Emotion::Neutral, 0.0)).unwrap();

        let results = mem.search("hiking", 3, &SearchFilters::default()).unwrap();
        let contents: Vec<&str> = results.iter().map(|r| r.memory.content.as_str()).collect();
        assert_eq!(contents, vec!["mountain hike", "ridge walk", "rainy office day"]);
        assert!(results.windows(2).all(|w| w[0].score <= w[1].score));

        assert_eq!(mem.search("hiking", 1, &SearchFilters::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_search_index_and_local_filters() {
        let mem = memories_with(embedder());
        mem.save(new_memory("mountain hike", Emotion::Happy, 0.8)).unwrap();
        mem.save(new_memory("ridge walk", Emotion::Sad, -0.4)).unwrap();

        let sad = SearchFilters {
            emotion: Some(Emotion::Sad),
            ..Default::default()
        };
        let results = mem.search("hiking", 5, &sad).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.content, "ridge walk");

        let positive = SearchFilters {
            valence_range: Some((1.0, 0.5)),
            ..Default::default()
        };
        let results = mem.search("hiking", 5, &positive).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.content, "mountain hike");
    }

    #[test]
    fn test_date_filters() {
        let mut memory = Memory::default();
        memory.timestamp = "2025-06-01T12:00:00+00:00".to_string();

        let to_same_day = SearchFilters {
            date_to: Some("2025-06-01".to_string()),
            ..Default::default()
        };
        assert!(to_same_day.accepts(&memory));

        let to_day_before = SearchFilters {
            date_to: Some("2025-05-31".to_string()),
            ..Default::default()
        };
        assert!(!to_day_before.accepts(&memory));

        let from_later = SearchFilters {
            date_from: Some("2025-06-02".to_string()),
            ..Default::default()
        };
        assert!(!from_later.accepts(&memory));
        assert!(from_later.has_local_filters());
        assert!(!SearchFilters::default().has_local_filters());
    }

    #[test]
    fn test_recall_returns_at_most_n() {
        let mem = memories_with(embedder());
        mem.save(NewMemory::new("mountain hike")).unwrap();
        mem.save(NewMemory::new("ridge walk")).unwrap();
        mem.save(NewMemory::new("rainy office day")).unwrap();

        let results = mem.recall("hiking", 2, &SearchFilters::default()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].memory.content, "mountain hike");
        assert!(results[0].score <= results[1].score);
    }

    #[test]
    fn test_recall_falls_back_when_reranking_fails() {
        let embedder = embedder();
        let mem = memories_with(embedder.clone());
        mem.save(NewMemory::new("mountain hike")).unwrap();
        mem.save(NewMemory::new("ridge walk")).unwrap();
        mem.save(NewMemory::new("rainy office day")).unwrap();

        // The index tolerates the size mismatch, the Hopfield step does not
        embedder.set("hiking", vec![1.0, 0.0, 0.0, 0.0]);
        let mut semantic = mem.search("hiking", 10, &SearchFilters::default()).unwrap();
        semantic.truncate(2);
        let recalled = mem.recall("hiking", 2, &SearchFilters::default()).unwrap();

        let semantic_ids: Vec<&str> = semantic.iter().map(|r| r.memory.id.as_str()).collect();
        let recalled_ids: Vec<&str> = recalled.iter().map(|r| r.memory.id.as_str()).collect();
        assert_eq!(recalled_ids, semantic_ids);
        assert_eq!(recalled[0].score, semantic[0].score);
    }

    #[test]
    fn test_huge_limits_do_not_overflow() {
        let mem = memories_with(embedder());
        mem.save(new_memory("mountain hike", Emotion::Happy, 0.8)).unwrap();
        mem.save(new_memory("ridge walk", Emotion::Sad, -0.4)).unwrap();

        let positive = SearchFilters {
            valence_range: Some((0.0, 1.0)),
            ..Default::default()
        };
        assert_eq!(mem.search("hiking", usize::MAX, &positive).unwrap().len(), 1);
        assert_eq!(mem.recall("hiking", usize::MAX, &positive).unwrap().len(), 1);
        assert_eq!(mem.recall("hiking", usize::MAX, &SearchFilters::default()).unwrap().len(), 2);
    }

    /// Two memories the semantic score and the Hopfield network disagree on:
    /// "crowded trailhead" is further from the query but carries the larger
    /// emotion and importance boosts.
    fn blend_embedder() -> Rc<TableEmbedder> {
        let embedder = Rc::new(TableEmbedder::new(3));
        embedder.set("summit sunrise", vec![1.0, 0.0, 0.0]);
        embedder.set("crowded trailhead", vec![0.9, -0.436, 0.0]);
        embedder.set("early climb", vec![1.0, 0.1, 0.0]);
        embedder
    }

    fn save_blend_memories(mem: &Memories) {
        mem.save(NewMemory {
            importance: 1,
            ..NewMemory::new("summit sunrise")
        })
        .unwrap();
        mem.save(NewMemory {
            emotion: Emotion::Excited,
            importance: 5,
            ..NewMemory::new("crowded trailhead")
        })
        .unwrap();
    }

    #[test]
    fn test_recall_blends_semantic_and_hopfield_scores() {
        let embedder = blend_embedder();
        let mem = memories_with(embedder.clone());
        save_blend_memories(&mem);

        let semantic = mem.search("early climb", 10, &SearchFilters::default()).unwrap();
        assert_eq!(semantic.len(), 2);

        let defaults = RecallSettings::default();
        let patterns: Vec<Vec<f32>> = semantic
            .iter()
            .map(|r| embedder.embed(&r.memory.content).unwrap())
            .collect();
        let ids: Vec<String> = semantic.iter().map(|r| r.memory.id.clone()).collect();
        let contents: Vec<String> = semantic.iter().map(|r| r.memory.content.clone()).collect();
        let mut network = AssociativeMemory::new(defaults.hopfield_beta, defaults.hopfield_iters);
        network.store(&patterns, &ids, &contents).unwrap();
        let (_, similarities) = network.retrieve(&embedder.embed("early climb").unwrap()).unwrap();

        let recalled = mem.recall("early climb", 2, &SearchFilters::default()).unwrap();
        assert_eq!(recalled.len(), 2);
        for r in &recalled {
            let i = ids.iter().position(|id| *id == r.memory.id).unwrap();
            let expected = semantic[i].score * 0.6 + (1.0 - similarities[i] as f64) * 0.4;
            assert!(
                (r.score - expected).abs() < 1e-4,
                "{}: got {}, expected {}",
                r.memory.content,
                r.score,
                expected
            );
        }
        assert!(recalled.windows(2).all(|w| w[0].score <= w[1].score));
        assert!(recalled
            .iter()
            .zip(&semantic)
            .any(|(r, s)| r.memory.id != s.memory.id || (r.score - s.score).abs() > 1e-3));
    }

    #[test]
    fn test_blend_weights_change_recall_order() {
        let order = |semantic_blend: f64, hopfield_blend: f64| -> Vec<String> {
            let settings = Settings {
                recall: RecallSettings {
                    semantic_blend,
                    hopfield_blend,
                    hopfield_beta: 50.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let mem = memories_with_settings(blend_embedder(), settings);
            save_blend_memories(&mem);
            mem.recall("early climb", 2, &SearchFilters::default())
                .unwrap()
                .into_iter()
                .map(|r| r.memory.content)
                .collect()
        };

        assert_eq!(order(1.0, 0.0), vec!["crowded trailhead", "summit sunrise"]);
        assert_eq!(order(0.0, 1.0), vec!["summit sunrise", "crowded trailhead"]);
    }
}
