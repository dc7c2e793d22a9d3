use crate::clock::{Clock, SystemClock};
use crate::codec::{memory_from_record, memory_to_metadata};
use crate::config::{find_store_path, Settings, StoreConfig, STORE_DIR};
use crate::embeddings::{get_embedder, Embedder};
use crate::error::{MemoryError, Result};
use crate::index::{IndexEntry, SqliteIndex, VectorIndex, Where};
use crate::scoring::count_emotions_weighted;
use crate::search::SearchFilters;
use crate::types::{
    Category, EmotionalTrace, LinkType, Memory, MemoryLink, MemorySearchResult, MemoryStats, NewMemory,
    SaveOutcome,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Thresholds for duplicate detection and automatic linking on save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkingSettings {
    pub dedup_threshold: f64,
    pub link_threshold: f64,
    pub max_links: usize,
}

impl Default for LinkingSettings {
    fn default() -> Self {
        Self {
            dedup_threshold: 0.05,
            link_threshold: 0.3,
            max_links: 5,
        }
    }
}

/// `mem_` followed by 12 hex characters
fn new_memory_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("mem_{}", &hex[..12])
}

/// The main memory interface
pub struct Memories {
    store_path: Option<PathBuf>,
    index: Box<dyn VectorIndex>,
    embedder: Box<dyn Embedder>,
    clock: Box<dyn Clock>,
    settings: Settings,
}

impl Memories {
    /// Open the store found from the current directory
    pub fn open() -> std::result::Result<Self, String> {
        let store_path =
            find_store_path().ok_or("No .reverie directory found. Run 'reverie init' first.")?;
        Self::open_at(store_path)
    }

    /// Open a store at a specific path
    pub fn open_at(store_path: PathBuf) -> std::result::Result<Self, String> {
        if !store_path.exists() {
            return Err(format!("Path does not exist: {}", store_path.display()));
        }

        let db_path = store_path.join("memory.db");
        let index = SqliteIndex::open(&db_path).map_err(|e| format!("Failed to open index: {}", e))?;

        let config = StoreConfig::new(store_path.clone());
        let (model_name, model_type) = config.get_resolved_model();
        let embedder = get_embedder(&model_name, &model_type, true);

        Ok(Self {
            store_path: Some(store_path),
            index: Box::new(index),
            embedder,
            clock: Box::new(SystemClock),
            settings: config.settings(),
        })
    }

    /// Create `.reverie` under `path` and open it
    pub fn init(path: &Path) -> std::result::Result<Self, String> {
        let store_path = path.join(STORE_DIR);
        fs::create_dir_all(&store_path).map_err(|e| format!("Failed to create {}: {}", STORE_DIR, e))?;

        Self::open_at(store_path)
    }

    /// Assemble a store from explicit collaborators
    pub fn with_parts(
        index: Box<dyn VectorIndex>,
        embedder: Box<dyn Embedder>,
        clock: Box<dyn Clock>,
        settings: Settings,
    ) -> Self {
        Self {
            store_path: None,
            index,
            embedder,
            clock,
            settings,
        }
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text).map_err(MemoryError::Embedding)
    }

    // =========================================================================
    // Core operations
    // =========================================================================

    /// Persist a new memory with no links
    pub fn save(&self, new: NewMemory) -> Result<Memory> {
        let memory = Memory {
            id: new_memory_id(),
            content: new.content,
            timestamp: self.clock.now().to_rfc3339(),
            emotional_trace: EmotionalTrace {
                primary: new.emotion,
                secondary: new.secondary,
                intensity: new.intensity,
                valence: new.valence,
                arousal: new.arousal,
                body_state: new.body_state,
            },
            importance: new.importance.clamp(1, 5),
            category: new.category,
            tags: new.tags,
            linked_ids: Vec::new(),
            is_private: new.private,
        };

        let embedding = self.embed_text(&memory.content)?;
        self.index.add(&[IndexEntry {
            id: memory.id.clone(),
            document: memory.content.clone(),
            metadata: memory_to_metadata(&memory),
            embedding,
        }])?;

        debug!("Saved memory {}", memory.id);
        Ok(memory)
    }

    /// Save unless a near-identical memory exists, then link the new memory
    /// to similar ones.
    pub fn save_with_auto_link(&self, new: NewMemory) -> Result<SaveOutcome> {
        let linking = self.settings.linking.clone();

        if self.count()? > 0 {
            let nearest = self.search(&new.content, 1, &SearchFilters::default())?;
            if let Some(best) = nearest.into_iter().next() {
                if best.distance < linking.dedup_threshold {
                    info!(
                        "Not saving duplicate of {} (distance {:.3})",
                        best.memory.id, best.distance
                    );
                    return Ok(SaveOutcome {
                        duplicate_of: Some(best),
                        ..Default::default()
                    });
                }
            }
        }

        let mut memory = self.save(new)?;
        let linked = match self.auto_link(&memory, &linking) {
            Ok((links, linked)) => {
                memory.linked_ids = links;
                linked
            }
            Err(e) => {
                warn!("Auto-link failed for {}: {}", memory.id, e);
                Vec::new()
            }
        };

        Ok(SaveOutcome {
            memory: Some(memory),
            links_created: linked.len(),
            linked,
            duplicate_of: None,
        })
    }

    /// Link `memory` to similar memories in both directions. Each target is
    /// written as it is linked; the new memory's own links are written last.
    fn auto_link(
        &self,
        memory: &Memory,
        linking: &LinkingSettings,
    ) -> Result<(Vec<MemoryLink>, Vec<MemorySearchResult>)> {
        let similar = self.search(&memory.content, linking.max_links + 1, &SearchFilters::default())?;

        let mut links = memory.linked_ids.clone();
        let mut linked = Vec::new();
        for result in similar {
            if linked.len() >= linking.max_links {
                break;
            }
            if result.memory.id == memory.id || result.distance >= linking.link_threshold {
                continue;
            }

            let confidence = 1.0 - result.distance;
            links.push(MemoryLink::new(&result.memory.id, LinkType::Similar, confidence));

            let mut reverse = result.memory.linked_ids.clone();
            reverse.push(MemoryLink::new(&memory.id, LinkType::Similar, confidence));
            self.write_links(&result.memory.id, &reverse)?;

            linked.push(result);
        }

        if !linked.is_empty() {
            self.write_links(&memory.id, &links)?;
        }
        Ok((links, linked))
    }

    /// Get a specific memory
    pub fn get_by_id(&self, id: &str) -> Result<Option<Memory>> {
        let ids = [id.to_string()];
        let record = self.index.get(Some(&ids), None, Some(1), false)?.into_iter().next();
        Ok(record.map(|r| memory_from_record(&r.id, &r.document, &r.metadata)))
    }

    /// Most recent memories first
    pub fn list_recent(&self, n: usize, category: Option<Category>) -> Result<Vec<Memory>> {
        let filter = category.map(|c| Where::eq("category", c.as_str()));
        let mut memories = self.all_memories(filter.as_ref())?;
        memories.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        memories.truncate(n);
        Ok(memories)
    }

    /// Delete a memory and drop every link pointing at it
    pub fn delete(&self, id: &str) -> Result<Option<Memory>> {
        let Some(memory) = self.get_by_id(id)? else {
            return Ok(None);
        };

        self.index.delete(&[id.to_string()])?;
        self.prune_links_to(id)?;
        Ok(Some(memory))
    }

    pub fn count(&self) -> Result<usize> {
        self.index.count()
    }

    fn all_memories(&self, filter: Option<&Where>) -> Result<Vec<Memory>> {
        Ok(self
            .index
            .get(None, filter, None, false)?
            .iter()
            .map(|r| memory_from_record(&r.id, &r.document, &r.metadata))
            .collect())
    }

    // =========================================================================
    // Stats
    // =========================================================================

    pub fn stats(&self) -> Result<MemoryStats> {
        let memories = self.all_memories(None)?;

        let mut by_category: HashMap<String, usize> = HashMap::new();
        for memory in &memories {
            *by_category.entry(memory.category.as_str().to_string()).or_insert(0) += 1;
        }

        let avg_importance = if memories.is_empty() {
            0.0
        } else {
            memories.iter().map(|m| m.importance as f64).sum::<f64>() / memories.len() as f64
        };

        Ok(MemoryStats {
            total_memories: memories.len(),
            total_links: memories.iter().map(|m| m.linked_ids.len()).sum(),
            by_category,
            emotions: count_emotions_weighted(&memories),
            avg_importance,
        })
    }
}
