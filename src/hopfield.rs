//! Modern continuous Hopfield network used as a second, non-linear
//! similarity signal during recall.
//!
//! Update rule: `ξ ← normalize(Pᵀ · softmax(β · P · ξ))`, repeated a fixed
//! number of times or until the query stops moving.

use crate::error::{MemoryError, Result};
use tracing::debug;

/// Norms below this are treated as zero
const NORM_EPSILON: f32 = 1e-8;

/// Convergence threshold on the update step
const CONVERGENCE_DELTA: f32 = 1e-5;

/// One pattern ranked by the network
#[derive(Debug, Clone, PartialEq)]
pub struct HopfieldRecallResult {
    pub memory_id: String,
    pub content: String,
    pub similarity: f32,
}

/// Stored patterns with parallel id and content arrays
#[derive(Debug, Clone)]
struct HopfieldState {
    patterns: Vec<Vec<f32>>,
    ids: Vec<String>,
    contents: Vec<String>,
    dim: usize,
}

/// Associative memory over a small working set of embeddings.
///
/// This is per-call scratch state: build one for each recall instead of
/// sharing it between callers.
#[derive(Debug, Clone)]
pub struct AssociativeMemory {
    beta: f32,
    n_iters: usize,
    state: Option<HopfieldState>,
}

impl Default for AssociativeMemory {
    fn default() -> Self {
        Self::new(4.0, 3)
    }
}

fn normalized(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < NORM_EPSILON {
        vector.to_vec()
    } else {
        vector.iter().map(|x| x / norm).collect()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl AssociativeMemory {
    pub fn new(beta: f32, n_iters: usize) -> Self {
        Self {
            beta,
            n_iters,
            state: None,
        }
    }

    /// Load patterns, replacing anything stored before. An empty set unloads.
    pub fn store(&mut self, embeddings: &[Vec<f32>], ids: &[String], contents: &[String]) -> Result<()> {
        let Some(first) = embeddings.first() else {
            debug!("Hopfield: no embeddings provided, nothing stored");
            self.state = None;
            return Ok(());
        };

        let dim = first.len();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dim) {
            self.state = None;
            return Err(MemoryError::Dimension {
                expected: dim,
                found: bad.len(),
            });
        }
        if ids.len() != embeddings.len() || contents.len() != embeddings.len() {
            self.state = None;
            return Err(MemoryError::Dimension {
                expected: embeddings.len(),
                found: ids.len().min(contents.len()),
            });
        }

        self.state = Some(HopfieldState {
            patterns: embeddings.iter().map(|e| normalized(e)).collect(),
            ids: ids.to_vec(),
            contents: contents.to_vec(),
            dim,
        });
        debug!(
            "Hopfield: stored {} patterns, dim={}, beta={:.2}",
            embeddings.len(),
            dim,
            self.beta
        );
        Ok(())
    }

    /// Run the update rule from `query`.
    ///
    /// Returns the converged vector and the similarity of every stored pattern
    /// to it. Without stored patterns the normalized query comes back with no
    /// similarities.
    pub fn retrieve(&self, query: &[f32]) -> Result<(Vec<f32>, Vec<f32>)> {
        let mut xi = normalized(query);
        let Some(state) = &self.state else {
            return Ok((xi, Vec::new()));
        };

        if xi.len() != state.dim {
            return Err(MemoryError::Dimension {
                expected: state.dim,
                found: xi.len(),
            });
        }

        for _ in 0..self.n_iters {
            let scaled: Vec<f32> = state.patterns.iter().map(|p| self.beta * dot(p, &xi)).collect();
            let max = scaled.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            let exps: Vec<f32> = scaled.iter().map(|s| (s - max).exp()).collect();
            let total: f32 = exps.iter().sum::<f32>() + 1e-12;

            let mut next = vec![0.0f32; state.dim];
            for (pattern, weight) in state.patterns.iter().zip(&exps) {
                let w = weight / total;
                for (n, p) in next.iter_mut().zip(pattern) {
                    *n += w * p;
                }
            }
            let next = normalized(&next);

            let delta = next
                .iter()
                .zip(&xi)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt();
            xi = next;
            if delta < CONVERGENCE_DELTA {
                break;
            }
        }

        let similarities = state.patterns.iter().map(|p| dot(p, &xi)).collect();
        Ok((xi, similarities))
    }

    /// Indices of the `k` highest similarities, descending. Ties keep index order.
    pub fn find_top_k(similarities: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut ranked: Vec<(usize, f32)> = similarities.iter().cloned().enumerate().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        ranked
    }

    /// Top-k patterns with their ids and contents
    pub fn recall_results(&self, similarities: &[f32], k: usize) -> Vec<HopfieldRecallResult> {
        let Some(state) = &self.state else {
            return Vec::new();
        };

        Self::find_top_k(similarities, k)
            .into_iter()
            .filter(|(idx, _)| *idx < state.ids.len())
            .map(|(idx, similarity)| HopfieldRecallResult {
                memory_id: state.ids[idx].clone(),
                content: state.contents[idx].clone(),
                similarity,
            })
            .collect()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    #[cfg(test)]
    pub fn n_memories(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.patterns.len())
    }

    #[cfg(test)]
    pub fn dim(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.dim)
    }
}
