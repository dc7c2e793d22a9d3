//! Episodes group memories into one narrative with a searchable summary.
//! They live in their own table beside the memories.

use crate::codec::{episode_from_record, episode_to_metadata};
use crate::error::{MemoryError, Result};
use crate::index::{IndexEntry, SqliteIndex, VectorIndex, EPISODE_TABLE};
use crate::memory::Memories;
use crate::types::{Episode, Memory};
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

/// `ep_` followed by 12 hex characters
fn new_episode_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("ep_{}", &hex[..12])
}

pub struct EpisodeStore<'a> {
    memories: &'a Memories,
    index: Box<dyn VectorIndex>,
}

impl<'a> EpisodeStore<'a> {
    pub fn new(memories: &'a Memories, index: Box<dyn VectorIndex>) -> Self {
        Self { memories, index }
    }

    /// Open the episode table of the store `memories` was opened from
    pub fn open(memories: &'a Memories) -> std::result::Result<Self, String> {
        let store_path = memories
            .store_path()
            .ok_or("Episodes need an on-disk store")?;
        let index = SqliteIndex::open_table(&store_path.join("memory.db"), EPISODE_TABLE)
            .map_err(|e| format!("Failed to open episodes: {}", e))?;
        Ok(Self::new(memories, Box::new(index)))
    }

    /// Group existing memories into an episode. Unknown and repeated ids are
    /// skipped; members are kept oldest first.
    pub fn create(&self, memory_ids: &[String], summary: &str) -> Result<Episode> {
        if memory_ids.is_empty() {
            return Err(MemoryError::InvalidEpisode("memory_ids cannot be empty".to_string()));
        }

        let mut seen = HashSet::new();
        let mut members: Vec<Memory> = Vec::new();
        for id in memory_ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            if let Some(memory) = self.memories.get_by_id(id)? {
                members.push(memory);
            }
        }

        members.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let (Some(first), Some(last)) = (members.first(), members.last()) else {
            return Err(MemoryError::InvalidEpisode(
                "no valid memories found for the given ids".to_string(),
            ));
        };

        let episode = Episode {
            id: new_episode_id(),
            summary: summary.to_string(),
            memory_ids: members.iter().map(|m| m.id.clone()).collect(),
            start_time: first.timestamp.clone(),
            end_time: last.timestamp.clone(),
            importance: members.iter().map(|m| m.importance).max().unwrap_or(3),
        };

        self.index.add(&[IndexEntry {
            id: episode.id.clone(),
            document: episode.summary.clone(),
            metadata: episode_to_metadata(&episode),
            embedding: self.memories.embed_text(summary)?,
        }])?;

        info!("Created episode {} with {} memories", episode.id, episode.memory_ids.len());
        Ok(episode)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<Episode>> {
        Ok(self
            .index
            .get(Some(&[id.to_string()]), None, None, false)?
            .first()
            .map(|r| episode_from_record(&r.id, &r.document, &r.metadata)))
    }

    /// Episodes whose summary is closest to `query`
    pub fn search(&self, query: &str, n: usize) -> Result<Vec<Episode>> {
        if n == 0 || self.index.count()? == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.memories.embed_text(query)?;
        Ok(self
            .index
            .query(&embedding, n, None)?
            .iter()
            .map(|hit| episode_from_record(&hit.id, &hit.document, &hit.metadata))
            .collect())
    }

    /// Up to `limit` episodes, latest start first
    pub fn list(&self, limit: usize) -> Result<Vec<Episode>> {
        let mut episodes: Vec<Episode> = self
            .index
            .get(None, None, None, false)?
            .iter()
            .map(|r| episode_from_record(&r.id, &r.document, &r.metadata))
            .collect();
        episodes.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        episodes.truncate(limit);
        Ok(episodes)
    }

    pub fn count(&self) -> Result<usize> {
        self.index.count()
    }
}
