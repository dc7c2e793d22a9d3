use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Declares a closed label enum with snake_case labels and a fallback variant
macro_rules! labeled_enum {
    ($(#[$meta:meta])* $name:ident, default = $default:ident, { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Parse a label, falling back to the default for unknown values
            pub fn parse_lossy(label: &str) -> Self {
                label.parse().unwrap_or($name::$default)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => {
                        let expected: Vec<&str> = $name::ALL.iter().map(|v| v.as_str()).collect();
                        Err(format!(
                            "unknown {} '{}' (expected one of: {})",
                            stringify!($name).to_lowercase(),
                            other,
                            expected.join(", ")
                        ))
                    }
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

labeled_enum!(
    /// Primary emotion of a memory
    Emotion, default = Neutral, {
        Happy => "happy",
        Sad => "sad",
        Surprised => "surprised",
        Moved => "moved",
        Excited => "excited",
        Nostalgic => "nostalgic",
        Curious => "curious",
        Neutral => "neutral",
        Melancholy => "melancholy",
        Anxious => "anxious",
        Contentment => "contentment",
        Frustrated => "frustrated",
    }
);

labeled_enum!(
    /// Memory category
    Category, default = Daily, {
        Daily => "daily",
        Philosophical => "philosophical",
        Technical => "technical",
        Memory => "memory",
        Observation => "observation",
        Feeling => "feeling",
        Conversation => "conversation",
        Introspection => "introspection",
        Relationship => "relationship",
        SelfDiscovery => "self_discovery",
        Dream => "dream",
        Lesson => "lesson",
    }
);

labeled_enum!(
    /// Kind of edge between two memories
    LinkType, default = Related, {
        Similar => "similar",
        CausedBy => "caused_by",
        LeadsTo => "leads_to",
        Related => "related",
    }
);

/// Interoceptive snapshot taken when a memory was saved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub time_phase: String,
    pub system_load: String,
    pub uptime_hours: f64,
}

impl Default for BodyState {
    fn default() -> Self {
        Self {
            time_phase: "unknown".to_string(),
            system_load: "unknown".to_string(),
            uptime_hours: 0.0,
        }
    }
}

/// Affective context of a memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalTrace {
    pub primary: Emotion,
    pub secondary: Vec<Emotion>,
    pub intensity: f64,
    pub valence: f64,
    pub arousal: f64,
    pub body_state: Option<BodyState>,
}

impl Default for EmotionalTrace {
    fn default() -> Self {
        Self {
            primary: Emotion::Neutral,
            secondary: Vec::new(),
            intensity: 0.5,
            valence: 0.0,
            arousal: 0.5,
            body_state: None,
        }
    }
}

/// A directed, confidence-weighted edge stored on the source memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryLink {
    pub target_id: String,
    pub link_type: LinkType,
    pub confidence: f64,
    pub note: String,
}

impl MemoryLink {
    pub fn new(target_id: &str, link_type: LinkType, confidence: f64) -> Self {
        Self {
            target_id: target_id.to_string(),
            link_type,
            confidence: confidence.clamp(0.0, 1.0),
            note: String::new(),
        }
    }
}

/// A memory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub timestamp: String,
    pub emotional_trace: EmotionalTrace,
    pub importance: i64,
    pub category: Category,
    pub tags: Vec<String>,
    pub linked_ids: Vec<MemoryLink>,
    pub is_private: bool,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            id: String::new(),
            content: String::new(),
            timestamp: String::new(),
            emotional_trace: EmotionalTrace::default(),
            importance: 3,
            category: Category::Daily,
            tags: Vec::new(),
            linked_ids: Vec::new(),
            is_private: false,
        }
    }
}

impl Memory {
    /// The outgoing link to `target_id`, if any
    pub fn link_to(&self, target_id: &str) -> Option<&MemoryLink> {
        self.linked_ids.iter().find(|l| l.target_id == target_id)
    }
}

/// Input for saving a new memory
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: String,
    pub emotion: Emotion,
    pub secondary: Vec<Emotion>,
    pub intensity: f64,
    pub importance: i64,
    pub category: Category,
    pub valence: f64,
    pub arousal: f64,
    pub body_state: Option<BodyState>,
    pub tags: Vec<String>,
    pub private: bool,
}

impl NewMemory {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Default::default()
        }
    }
}

impl Default for NewMemory {
    fn default() -> Self {
        Self {
            content: String::new(),
            emotion: Emotion::Neutral,
            secondary: Vec::new(),
            intensity: 0.5,
            importance: 3,
            category: Category::Daily,
            valence: 0.0,
            arousal: 0.5,
            body_state: None,
            tags: Vec::new(),
            private: false,
        }
    }
}

/// Search result. `score` is a cost: lower is more relevant.
#[derive(Debug, Clone, Serialize)]
pub struct MemorySearchResult {
    pub memory: Memory,
    pub distance: f64,
    pub score: f64,
}

/// Result of `save_with_auto_link`
#[derive(Debug, Clone, Default)]
pub struct SaveOutcome {
    pub memory: Option<Memory>,
    pub links_created: usize,
    pub linked: Vec<MemorySearchResult>,
    pub duplicate_of: Option<MemorySearchResult>,
}

/// How an associated memory was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSource {
    Explicit,
    Implicit,
}

impl LinkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkSource::Explicit => "explicit",
            LinkSource::Implicit => "implicit",
        }
    }
}

/// Candidate produced by spreading activation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssociationResult {
    pub memory_id: String,
    pub score: f64,
    pub depth: usize,
    pub source: LinkSource,
}

/// Near-duplicate pair flagged for review. `id_a` sorts before `id_b`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeCandidate {
    pub id_a: String,
    pub id_b: String,
    pub distance: f64,
    pub snippet_a: String,
    pub snippet_b: String,
}

/// Summary of one consolidation run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsolidationStats {
    pub replay_events: usize,
    pub coactivation_updates: usize,
    pub link_updates: usize,
    pub refreshed_memories: usize,
    pub merge_candidates: Vec<MergeCandidate>,
}

/// Statistics about the memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    pub total_memories: usize,
    pub total_links: usize,
    pub by_category: HashMap<String, usize>,
    pub emotions: BTreeMap<String, f64>,
    pub avg_importance: f64,
}

/// A named, time-ordered group of memories
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Episode {
    pub id: String,
    pub summary: String,
    pub memory_ids: Vec<String>,
    pub start_time: String,
    pub end_time: String,
    pub importance: i64,
}
