//! Bidirectional link maintenance. Links live inside each memory's own
//! record, so every mutation rewrites the `linked_ids` field of the touched
//! memories.

use crate::codec::{links_from_json, links_patch};
use crate::error::Result;
use crate::memory::Memories;
use crate::types::{LinkType, MemoryLink};
use serde_json::Value;
use tracing::{debug, warn};

/// Confidence of a freshly created link
pub const DEFAULT_LINK_CONFIDENCE: f64 = 0.5;

/// Raise the edge to `target_id` by `delta`, creating it if missing.
/// Returns whether the list changed.
fn bump_edge(links: &mut Vec<MemoryLink>, target_id: &str, delta: f64) -> bool {
    match links.iter_mut().find(|l| l.target_id == target_id) {
        Some(link) => {
            let next = (link.confidence + delta).clamp(0.0, 1.0);
            if next == link.confidence {
                return false;
            }
            link.confidence = next;
            true
        }
        None => {
            links.push(MemoryLink::new(
                target_id,
                LinkType::Related,
                DEFAULT_LINK_CONFIDENCE + delta,
            ));
            true
        }
    }
}

impl Memories {
    pub(crate) fn write_links(&self, id: &str, links: &[MemoryLink]) -> Result<()> {
        self.index().update(&[id.to_string()], &[links_patch(links)])
    }

    /// Create a link in both directions. Returns false if `source_id`
    /// already links to `target_id` or either memory is missing. An existing
    /// `target_id -> source_id` edge is kept as it is.
    pub fn link(&self, source_id: &str, target_id: &str, link_type: LinkType) -> Result<bool> {
        if source_id == target_id {
            return Ok(false);
        }

        let (Some(mut source), Some(mut target)) = (self.get_by_id(source_id)?, self.get_by_id(target_id)?)
        else {
            warn!("Cannot link {} -> {}: memory not found", source_id, target_id);
            return Ok(false);
        };

        if source.link_to(target_id).is_some() {
            return Ok(false);
        }

        source
            .linked_ids
            .push(MemoryLink::new(target_id, link_type, DEFAULT_LINK_CONFIDENCE));
        self.write_links(source_id, &source.linked_ids)?;

        if target.link_to(source_id).is_none() {
            target
                .linked_ids
                .push(MemoryLink::new(source_id, link_type, DEFAULT_LINK_CONFIDENCE));
            self.write_links(target_id, &target.linked_ids)?;
        }

        Ok(true)
    }

    /// Strengthen the edge between two memories in both directions.
    ///
    /// `delta` is clamped to [0, 1]. Missing edges are created as `related`
    /// at 0.5 + delta. Only directions that changed are written.
    pub fn bump_confidence(&self, a: &str, b: &str, delta: f64) -> Result<bool> {
        if a == b {
            return Ok(false);
        }
        let delta = delta.clamp(0.0, 1.0);

        let (Some(mut left), Some(mut right)) = (self.get_by_id(a)?, self.get_by_id(b)?) else {
            warn!("Cannot bump {} <-> {}: memory not found", a, b);
            return Ok(false);
        };

        let left_changed = bump_edge(&mut left.linked_ids, b, delta);
        let right_changed = bump_edge(&mut right.linked_ids, a, delta);

        if left_changed {
            self.write_links(a, &left.linked_ids)?;
        }
        if right_changed {
            self.write_links(b, &right.linked_ids)?;
        }
        Ok(left_changed || right_changed)
    }

    /// Remove links pointing at `deleted_id` from every memory. Memories with
    /// no such link are not rewritten.
    pub(crate) fn prune_links_to(&self, deleted_id: &str) -> Result<usize> {
        let mut pruned = 0;

        for record in self.index().get(None, None, None, false)? {
            let mut links = record
                .metadata
                .get("linked_ids")
                .and_then(Value::as_str)
                .map(links_from_json)
                .unwrap_or_default();

            let before = links.len();
            links.retain(|l| l.target_id != deleted_id);
            if links.len() != before {
                self.write_links(&record.id, &links)?;
                pruned += 1;
            }
        }

        if pruned > 0 {
            debug!("Removed links to {} from {} memories", deleted_id, pruned);
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memories_with, TableEmbedder};
    use crate::types::NewMemory;
    use std::rc::Rc;

    fn three() -> (Memories, String, String, String) {
        let embedder = Rc::new(TableEmbedder::new(3));
        embedder.set("a", vec![1.0, 0.0, 0.0]);
        embedder.set("b", vec![0.0, 1.0, 0.0]);
        embedder.set("c", vec![0.0, 0.0, 1.0]);
        let mem = memories_with(embedder);
        let a = mem.save(NewMemory::new("a")).unwrap().id;
        let b = mem.save(NewMemory::new("b")).unwrap().id;
        let c = mem.save(NewMemory::new("c")).unwrap().id;
        (mem, a, b, c)
    }

    fn confidence(mem: &Memories, from: &str, to: &str) -> Option<f64> {
        mem.get_by_id(from).unwrap().unwrap().link_to(to).map(|l| l.confidence)
    }

    #[test]
    fn test_link_is_idempotent() {
        let (mem, a, b, _) = three();
        assert!(mem.link(&a, &b, LinkType::CausedBy).unwrap());
        assert!(!mem.link(&a, &b, LinkType::CausedBy).unwrap());

        let stored_a = mem.get_by_id(&a).unwrap().unwrap();
        assert_eq!(stored_a.linked_ids.len(), 1);
        assert_eq!(stored_a.linked_ids[0].link_type, LinkType::CausedBy);
        assert_eq!(stored_a.linked_ids[0].confidence, DEFAULT_LINK_CONFIDENCE);

        let stored_b = mem.get_by_id(&b).unwrap().unwrap();
        assert_eq!(stored_b.linked_ids.len(), 1);
        assert_eq!(stored_b.linked_ids[0].target_id, a);
    }

    #[test]
    fn test_link_keeps_existing_reverse_edge() {
        let (mem, a, b, _) = three();
        mem.write_links(&b, &[MemoryLink::new(&a, LinkType::LeadsTo, 0.8)]).unwrap();

        assert!(mem.link(&a, &b, LinkType::Similar).unwrap());

        let stored_a = mem.get_by_id(&a).unwrap().unwrap();
        assert_eq!(stored_a.linked_ids.len(), 1);
        assert_eq!(stored_a.linked_ids[0].link_type, LinkType::Similar);
        assert_eq!(stored_a.linked_ids[0].confidence, DEFAULT_LINK_CONFIDENCE);

        let stored_b = mem.get_by_id(&b).unwrap().unwrap();
        assert_eq!(stored_b.linked_ids.len(), 1);
        assert_eq!(stored_b.linked_ids[0].link_type, LinkType::LeadsTo);
        assert_eq!(confidence(&mem, &b, &a), Some(0.8));
    }

    #[test]
    fn test_link_missing_memory() {
        let (mem, a, _, _) = three();
        assert!(!mem.link(&a, "mem_ghost", LinkType::Related).unwrap());
        assert!(!mem.link(&a, &a, LinkType::Related).unwrap());
        assert!(mem.get_by_id(&a).unwrap().unwrap().linked_ids.is_empty());
    }

    #[test]
    fn test_bump_creates_edge() {
        let (mem, a, b, _) = three();
        assert!(mem.bump_confidence(&a, &b, 0.1).unwrap());
        assert!((confidence(&mem, &a, &b).unwrap() - 0.6).abs() < 1e-9);
        assert!((confidence(&mem, &b, &a).unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(
            mem.get_by_id(&a).unwrap().unwrap().linked_ids[0].link_type,
            LinkType::Related
        );
    }

    #[test]
    fn test_bump_saturates() {
        let (mem, a, b, _) = three();
        for _ in 0..10 {
            mem.bump_confidence(&a, &b, 0.1).unwrap();
        }
        assert_eq!(confidence(&mem, &a, &b), Some(1.0));
        assert_eq!(confidence(&mem, &b, &a), Some(1.0));
        assert!(!mem.bump_confidence(&a, &b, 0.1).unwrap());
    }

    #[test]
    fn test_bump_clamps_delta() {
        let (mem, a, b, _) = three();
        assert!(mem.bump_confidence(&a, &b, -3.0).unwrap());
        assert_eq!(confidence(&mem, &a, &b), Some(0.5));
        assert!(!mem.bump_confidence(&a, &b, -3.0).unwrap());

        mem.bump_confidence(&a, &b, 7.0).unwrap();
        assert_eq!(confidence(&mem, &a, &b), Some(1.0));
    }

    #[test]
    fn test_bump_one_sided_edge() {
        let (mem, a, b, _) = three();
        mem.write_links(&a, &[MemoryLink::new(&b, LinkType::LeadsTo, 0.8)]).unwrap();

        assert!(mem.bump_confidence(&a, &b, 0.1).unwrap());
        assert!((confidence(&mem, &a, &b).unwrap() - 0.9).abs() < 1e-9);
        assert!((confidence(&mem, &b, &a).unwrap() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_delete_prunes_reverse_links() {
        let (mem, a, b, c) = three();
        mem.link(&a, &b, LinkType::Related).unwrap();
        mem.link(&c, &b, LinkType::Related).unwrap();
        mem.link(&a, &c, LinkType::Similar).unwrap();

        let deleted = mem.delete(&b).unwrap().unwrap();
        assert_eq!(deleted.id, b);
        assert!(mem.get_by_id(&b).unwrap().is_none());

        let stored_a = mem.get_by_id(&a).unwrap().unwrap();
        assert_eq!(stored_a.linked_ids.len(), 1);
        assert_eq!(stored_a.linked_ids[0].target_id, c);
        assert!(mem.get_by_id(&c).unwrap().unwrap().link_to(&b).is_none());
        assert_eq!(mem.prune_links_to(&b).unwrap(), 0);
    }
}
