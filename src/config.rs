use crate::association::AssociationSettings;
use crate::consolidation::ConsolidationSettings;
use crate::memory::LinkingSettings;
use crate::scoring::ScoringWeights;
use crate::search::RecallSettings;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// Name of the store directory
pub const STORE_DIR: &str = ".reverie";

/// Environment variable pointing at a store directory
pub const STORE_ENV: &str = "REVERIE_PATH";

/// Model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub alias: &'static str,
    pub name: &'static str,
    pub model_type: &'static str,
    pub size: &'static str,
    pub description: &'static str,
}

/// Suggested embedding models
pub static SUGGESTED_MODELS: &[ModelInfo] = &[
    ModelInfo {
        alias: "lite",
        name: "lite",
        model_type: "lite",
        size: "0MB",
        description: "Default. Feature hashing, no server needed",
    },
    ModelInfo {
        alias: "minilm",
        name: "sentence-transformers/all-MiniLM-L6-v2",
        model_type: "server",
        size: "~90MB",
        description: "Fast general-purpose embeddings",
    },
    ModelInfo {
        alias: "bge-small",
        name: "BAAI/bge-small-en-v1.5",
        model_type: "server",
        size: "~130MB",
        description: "Small BGE model, good quality",
    },
    ModelInfo {
        alias: "bge-base",
        name: "BAAI/bge-base-en-v1.5",
        model_type: "server",
        size: "~400MB",
        description: "Good balance of quality and speed",
    },
    ModelInfo {
        alias: "multilingual-e5",
        name: "intfloat/multilingual-e5-base",
        model_type: "server",
        size: "~1.1GB",
        description: "Multilingual memories",
    },
];

pub const DEFAULT_MODEL: &str = "lite";

/// Resolve a model alias or name to (model_name, model_type)
pub fn resolve_model(model_input: &str) -> (String, String) {
    if let Some(info) = SUGGESTED_MODELS
        .iter()
        .find(|m| m.alias == model_input || m.name == model_input)
    {
        return (info.name.to_string(), info.model_type.to_string());
    }

    // Anything else is served by the embedding server
    (model_input.to_string(), "server".to_string())
}

/// Typed tuning sections of `_config.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scoring: ScoringWeights,
    pub recall: RecallSettings,
    pub linking: LinkingSettings,
    pub association: AssociationSettings,
    pub consolidation: ConsolidationSettings,
}

// -----------------------------------------------------------------------------
// Per-store config
// -----------------------------------------------------------------------------

/// Configuration manager for a store directory
pub struct StoreConfig {
    store_path: PathBuf,
    config_file: PathBuf,
    config: Mapping,
}

impl StoreConfig {
    pub fn new(store_path: PathBuf) -> Self {
        let config_file = store_path.join("_config.yaml");
        let mut instance = Self {
            store_path,
            config_file,
            config: Mapping::new(),
        };
        instance.load();
        instance
    }

    fn load(&mut self) {
        if !self.config_file.exists() {
            return;
        }
        match fs::read_to_string(&self.config_file).map(|c| serde_yaml::from_str::<Mapping>(&c)) {
            Ok(Ok(config)) => self.config = config,
            Ok(Err(e)) => warn!("Ignoring malformed {}: {}", self.config_file.display(), e),
            Err(e) => warn!("Could not read {}: {}", self.config_file.display(), e),
        }
    }

    fn save(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.store_path)?;
        let content = serde_yaml::to_string(&self.config)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&self.config_file, content)
    }

    /// Look up a dotted key such as `recall.semantic_blend`
    pub fn get(&self, key: &str) -> Option<String> {
        let mut current = &self.config;
        let mut parts = key.split('.').peekable();

        while let Some(part) = parts.next() {
            let value = current.get(part)?;
            if parts.peek().is_none() {
                return match value {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                };
            }
            current = value.as_mapping()?;
        }
        None
    }

    /// Set a dotted key. The value is read as a YAML scalar so numbers stay numbers.
    pub fn set(&mut self, key: &str, value: &str) -> std::io::Result<()> {
        let parsed = serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()));
        let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty key"));
        }
        set_path(&mut self.config, &parts, parsed);
        self.save()
    }

    pub fn embedding_model(&self) -> String {
        self.get("embedding_model")
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn set_embedding_model(&mut self, value: &str) -> std::io::Result<()> {
        self.set("embedding_model", value)
    }

    pub fn get_resolved_model(&self) -> (String, String) {
        resolve_model(&self.embedding_model())
    }

    /// Typed settings; malformed sections fall back to defaults
    pub fn settings(&self) -> Settings {
        match serde_yaml::from_value(Value::Mapping(self.config.clone())) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Invalid settings in {}: {}", self.config_file.display(), e);
                Settings::default()
            }
        }
    }
}

fn set_path(map: &mut Mapping, parts: &[&str], value: Value) {
    match parts {
        [] => {}
        [last] => {
            map.insert(Value::String(last.to_string()), value);
        }
        [head, rest @ ..] => {
            let key = Value::String(head.to_string());
            let mut child = match map.remove(&key) {
                Some(Value::Mapping(m)) => m,
                _ => Mapping::new(),
            };
            set_path(&mut child, rest, value);
            map.insert(key, Value::Mapping(child));
        }
    }
}

/// Find the store directory: search upward from the current directory, then
/// the environment override, then the home directory
pub fn find_store_path() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let store = current.join(STORE_DIR);
        if store.is_dir() {
            return Some(store);
        }

        if !current.pop() {
            break;
        }
    }

    if let Ok(path) = std::env::var(STORE_ENV) {
        let store = PathBuf::from(path);
        if store.is_dir() {
            return Some(store);
        }
    }

    dirs::home_dir()
        .map(|home| home.join(STORE_DIR))
        .filter(|store| store.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("reverie-config-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_resolve_model() {
        assert_eq!(resolve_model("lite"), ("lite".to_string(), "lite".to_string()));
        assert_eq!(resolve_model("bge-base").0, "BAAI/bge-base-en-v1.5");
        assert_eq!(resolve_model("custom/model").1, "server");
    }

    #[test]
    fn test_defaults_without_file() {
        let config = StoreConfig::new(scratch_dir("defaults"));
        assert_eq!(config.embedding_model(), DEFAULT_MODEL);
        assert_eq!(config.settings(), Settings::default());
    }

    #[test]
    fn test_dotted_set_round_trips_through_disk() {
        let dir = scratch_dir("dotted");
        let mut config = StoreConfig::new(dir.clone());
        config.set("recall.semantic_blend", "0.5").unwrap();
        config.set("consolidation.window_hours", "48").unwrap();
        config.set_embedding_model("bge-small").unwrap();

        let reloaded = StoreConfig::new(dir.clone());
        assert_eq!(reloaded.get("recall.semantic_blend").as_deref(), Some("0.5"));
        assert_eq!(reloaded.embedding_model(), "bge-small");

        let settings = reloaded.settings();
        assert_eq!(settings.recall.semantic_blend, 0.5);
        assert_eq!(settings.recall.hopfield_blend, 0.4);
        assert_eq!(settings.consolidation.window_hours, 48);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_malformed_section_falls_back() {
        let dir = scratch_dir("malformed");
        let mut config = StoreConfig::new(dir.clone());
        config.set("recall", "not-a-section").unwrap();
        assert_eq!(config.settings(), Settings::default());
        fs::remove_dir_all(dir).ok();
    }
}
