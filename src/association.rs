//! Spreading activation over explicit links and embedding neighbours.

use crate::error::Result;
use crate::memory::Memories;
use crate::search::SearchFilters;
use crate::types::{AssociationResult, LinkSource};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationSettings {
    pub explicit_weight: f64,
    pub implicit_weight: f64,
    pub depth: usize,
    pub top_k: usize,
}

impl Default for AssociationSettings {
    fn default() -> Self {
        Self {
            explicit_weight: 1.0,
            implicit_weight: 0.7,
            depth: 2,
            top_k: 10,
        }
    }
}

/// Breadth-first expansion from seed memories
#[derive(Debug, Clone, Copy)]
pub struct AssociationEngine {
    explicit_weight: f64,
    implicit_weight: f64,
}

impl Default for AssociationEngine {
    fn default() -> Self {
        Self::from_settings(&AssociationSettings::default())
    }
}

impl AssociationEngine {
    pub fn new(explicit_weight: f64, implicit_weight: f64) -> Self {
        Self {
            explicit_weight,
            implicit_weight,
        }
    }

    pub fn from_settings(settings: &AssociationSettings) -> Self {
        Self::new(settings.explicit_weight, settings.implicit_weight)
    }

    /// Memories associated with `seed_ids`, best first.
    ///
    /// Every node is expanded at most once. A candidate reached along several
    /// paths keeps its best score, with the depth and source of that path.
    /// Seeds never appear in the output.
    pub fn spread(
        &self,
        memories: &Memories,
        seed_ids: &[String],
        depth: usize,
        top_k: usize,
    ) -> Result<Vec<AssociationResult>> {
        if seed_ids.is_empty() || depth == 0 || top_k == 0 {
            return Ok(Vec::new());
        }

        let seeds: HashSet<&str> = seed_ids.iter().map(String::as_str).collect();
        let mut visited: HashSet<String> = seed_ids.iter().cloned().collect();
        let mut frontier: VecDeque<(String, usize)> = seed_ids.iter().map(|id| (id.clone(), 0)).collect();
        let mut scored: HashMap<String, AssociationResult> = HashMap::new();

        while let Some((current_id, current_depth)) = frontier.pop_front() {
            if current_depth >= depth {
                continue;
            }
            let Some(current) = memories.get_by_id(&current_id)? else {
                continue;
            };
            let next_depth = current_depth + 1;
            let mut discovered: Vec<(String, f64, LinkSource)> = Vec::new();

            for link in &current.linked_ids {
                let score = self.explicit_weight * link.confidence.clamp(0.0, 1.0);
                if score > 0.0 && !link.target_id.is_empty() {
                    discovered.push((link.target_id.clone(), score, LinkSource::Explicit));
                }
            }

            let fetch = top_k.saturating_add(1).max(5);
            let neighbours = memories.search(&current.content, fetch, &SearchFilters::default())?;
            for hit in neighbours {
                if hit.memory.id == current_id {
                    continue;
                }
                let score = self.implicit_weight * (1.0 - hit.distance).clamp(0.0, 1.0);
                if score > 0.0 {
                    discovered.push((hit.memory.id, score, LinkSource::Implicit));
                }
            }

            for (candidate_id, score, source) in discovered {
                let better = scored.get(&candidate_id).map_or(true, |existing| score > existing.score);
                if better {
                    scored.insert(
                        candidate_id.clone(),
                        AssociationResult {
                            memory_id: candidate_id.clone(),
                            score,
                            depth: next_depth,
                            source,
                        },
                    );
                }
                if visited.insert(candidate_id.clone()) {
                    frontier.push_back((candidate_id, next_depth));
                }
            }
        }

        let mut results: Vec<AssociationResult> = scored
            .into_values()
            .filter(|r| !seeds.contains(r.memory_id.as_str()))
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.depth.cmp(&b.depth))
                .then_with(|| a.memory_id.cmp(&b.memory_id))
        });
        results.truncate(top_k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memories_with, TableEmbedder};
    use crate::types::{LinkType, MemoryLink, NewMemory};
    use std::rc::Rc;

    /// Chain a -> b -> c through explicit links, plus `twin` which is only
    /// close to `a` in embedding space and `far` which is close to nothing.
    struct Fixture {
        mem: Memories,
        a: String,
        b: String,
        c: String,
        twin: String,
    }

    fn fixture() -> Fixture {
        let embedder = Rc::new(TableEmbedder::new(4));
        embedder.set("a", vec![1.0, 0.0, 0.0, 0.0]);
        embedder.set("twin", vec![0.95, 0.0, 0.0, 0.31]);
        embedder.set("b", vec![0.0, 1.0, 0.0, 0.0]);
        embedder.set("c", vec![0.0, 0.0, 1.0, 0.0]);
        embedder.set("far", vec![0.0, -1.0, 0.0, 0.0]);

        let mem = memories_with(embedder);
        let a = mem.save(NewMemory::new("a")).unwrap().id;
        let b = mem.save(NewMemory::new("b")).unwrap().id;
        let c = mem.save(NewMemory::new("c")).unwrap().id;
        let twin = mem.save(NewMemory::new("twin")).unwrap().id;
        mem.save(NewMemory::new("far")).unwrap();

        mem.write_links(&a, &[MemoryLink::new(&b, LinkType::LeadsTo, 0.9)]).unwrap();
        mem.write_links(&b, &[MemoryLink::new(&c, LinkType::LeadsTo, 0.8)]).unwrap();

        Fixture { mem, a, b, c, twin }
    }

    fn ids(results: &[AssociationResult]) -> Vec<&str> {
        results.iter().map(|r| r.memory_id.as_str()).collect()
    }

    #[test]
    fn test_degenerate_inputs() {
        let f = fixture();
        let engine = AssociationEngine::default();
        assert!(engine.spread(&f.mem, &[], 2, 10).unwrap().is_empty());
        assert!(engine.spread(&f.mem, &[f.a.clone()], 0, 10).unwrap().is_empty());
        assert!(engine.spread(&f.mem, &[f.a.clone()], 2, 0).unwrap().is_empty());
        assert!(engine
            .spread(&f.mem, &["mem_ghost".to_string()], 2, 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unbounded_top_k() {
        let f = fixture();
        let results = AssociationEngine::new(1.0, 0.0)
            .spread(&f.mem, &[f.a.clone()], 2, usize::MAX)
            .unwrap();
        assert_eq!(ids(&results), vec![f.b.as_str(), f.c.as_str()]);

        let with_implicit = AssociationEngine::default()
            .spread(&f.mem, &[f.a.clone()], 1, usize::MAX)
            .unwrap();
        assert!(ids(&with_implicit).contains(&f.twin.as_str()));
    }

    #[test]
    fn test_seeds_never_returned() {
        let f = fixture();
        let engine = AssociationEngine::default();
        let seeds = vec![f.a.clone(), f.b.clone()];
        let results = engine.spread(&f.mem, &seeds, 3, 10).unwrap();
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| !seeds.contains(&r.memory_id)));
    }

    #[test]
    fn test_explicit_chain_respects_depth() {
        let f = fixture();
        let engine = AssociationEngine::new(1.0, 0.0);

        let one_hop = engine.spread(&f.mem, &[f.a.clone()], 1, 10).unwrap();
        assert_eq!(ids(&one_hop), vec![f.b.as_str()]);
        assert_eq!(one_hop[0].depth, 1);
        assert_eq!(one_hop[0].source, LinkSource::Explicit);
        assert!((one_hop[0].score - 0.9).abs() < 1e-9);

        let two_hops = engine.spread(&f.mem, &[f.a.clone()], 2, 10).unwrap();
        assert_eq!(ids(&two_hops), vec![f.b.as_str(), f.c.as_str()]);
        assert_eq!(two_hops[1].depth, 2);
    }

    #[test]
    fn test_zero_implicit_weight_excludes_embedding_neighbours() {
        let f = fixture();
        let explicit_only = AssociationEngine::new(1.0, 0.0);
        let results = explicit_only.spread(&f.mem, &[f.a.clone()], 2, 10).unwrap();
        assert!(!ids(&results).contains(&f.twin.as_str()));

        let with_implicit = AssociationEngine::default();
        let results = with_implicit.spread(&f.mem, &[f.a.clone()], 1, 10).unwrap();
        let twin = results.iter().find(|r| r.memory_id == f.twin).unwrap();
        assert_eq!(twin.source, LinkSource::Implicit);
        assert_eq!(twin.depth, 1);
    }

    #[test]
    fn test_best_score_wins() {
        let f = fixture();
        // c is reachable from a at depth 1 with a weak link and at depth 2
        // through b with a strong one
        f.mem
            .write_links(
                &f.a,
                &[
                    MemoryLink::new(&f.b, LinkType::LeadsTo, 1.0),
                    MemoryLink::new(&f.c, LinkType::Related, 0.2),
                ],
            )
            .unwrap();
        f.mem
            .write_links(&f.b, &[MemoryLink::new(&f.c, LinkType::LeadsTo, 0.9)])
            .unwrap();

        let engine = AssociationEngine::new(1.0, 0.0);
        let results = engine.spread(&f.mem, &[f.a.clone()], 2, 10).unwrap();

        let hits: Vec<&AssociationResult> = results.iter().filter(|r| r.memory_id == f.c).collect();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 0.9).abs() < 1e-9);
        assert_eq!(hits[0].depth, 2);
    }

    #[test]
    fn test_ordering_and_top_k() {
        let f = fixture();
        let engine = AssociationEngine::default();
        let results = engine.spread(&f.mem, &[f.a.clone()], 2, 10).unwrap();
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

        let truncated = engine.spread(&f.mem, &[f.a.clone()], 2, 1).unwrap();
        assert_eq!(truncated.len(), 1);
        assert_eq!(truncated[0].memory_id, results[0].memory_id);
    }

    #[test]
    fn test_cycles_terminate() {
        let f = fixture();
        f.mem
            .write_links(&f.c, &[MemoryLink::new(&f.a, LinkType::LeadsTo, 0.7)])
            .unwrap();
        let engine = AssociationEngine::new(1.0, 0.0);
        let results = engine.spread(&f.mem, &[f.a.clone()], 10, 10).unwrap();
        assert_eq!(ids(&results), vec![f.b.as_str(), f.c.as_str()]);
    }
}
