//! Mapping between flat index metadata and `Memory` or `Episode`.
//!
//! Decoding never fails: malformed fields fall back to their defaults so one
//! corrupt record cannot break a batch read.

use crate::index::Metadata;
use crate::types::{BodyState, Category, Emotion, EmotionalTrace, Episode, LinkType, Memory, MemoryLink};
use serde_json::{json, Value};

fn get_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(Value::as_str)
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

fn get_f64(metadata: &Metadata, key: &str, default: f64) -> f64 {
    metadata.get(key).and_then(value_as_f64).unwrap_or(default)
}

fn get_i64(metadata: &Metadata, key: &str, default: i64) -> i64 {
    match metadata.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

fn value_to_string(value: Option<&Value>, default: &str) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Split a comma-joined list, dropping empty entries
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_private(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => matches!(s.as_str(), "1" | "true" | "True"),
        _ => false,
    }
}

fn parse_body_state(raw: &str) -> Option<BodyState> {
    if raw.is_empty() {
        return None;
    }
    let payload: Value = serde_json::from_str(raw).ok()?;
    let object = payload.as_object()?;
    Some(BodyState {
        time_phase: value_to_string(object.get("time_phase"), "unknown"),
        system_load: value_to_string(object.get("system_load"), "unknown"),
        uptime_hours: match object.get("uptime_hours") {
            Some(value) => value_as_f64(value)?,
            None => 0.0,
        },
    })
}

fn parse_link(entry: &Value) -> Option<MemoryLink> {
    let object = entry.as_object()?;
    let target_id = object.get("target_id").and_then(Value::as_str)?;
    if target_id.is_empty() {
        return None;
    }

    let link_type = object
        .get("link_type")
        .and_then(Value::as_str)
        .map(LinkType::parse_lossy)
        .unwrap_or_default();
    let confidence = object.get("confidence").and_then(value_as_f64).unwrap_or(0.5);

    Some(MemoryLink {
        target_id: target_id.to_string(),
        link_type,
        confidence: confidence.clamp(0.0, 1.0),
        note: value_to_string(object.get("note"), ""),
    })
}

/// Decode a JSON-encoded link list; malformed input yields no links
pub fn links_from_json(raw: &str) -> Vec<MemoryLink> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) => entries.iter().filter_map(parse_link).collect(),
        _ => Vec::new(),
    }
}

/// Encode links for the `linked_ids` metadata field
pub fn links_to_json(links: &[MemoryLink]) -> String {
    Value::Array(
        links
            .iter()
            .map(|link| {
                json!({
                    "target_id": link.target_id,
                    "link_type": link.link_type.as_str(),
                    "confidence": link.confidence,
                    "note": link.note,
                })
            })
            .collect(),
    )
    .to_string()
}

/// Metadata patch replacing a memory's link list
pub fn links_patch(links: &[MemoryLink]) -> Metadata {
    let mut patch = Metadata::new();
    patch.insert("linked_ids".to_string(), Value::String(links_to_json(links)));
    patch
}

/// Rebuild a memory from its stored record
pub fn memory_from_record(id: &str, content: &str, metadata: &Metadata) -> Memory {
    let primary = get_str(metadata, "emotion")
        .map(Emotion::parse_lossy)
        .unwrap_or_default();
    let category = get_str(metadata, "category")
        .map(Category::parse_lossy)
        .unwrap_or_default();

    let secondary: Vec<Emotion> = get_str(metadata, "secondary")
        .map(|raw| {
            split_list(raw)
                .iter()
                .filter_map(|s| s.parse::<Emotion>().ok())
                .collect()
        })
        .unwrap_or_default();

    Memory {
        id: id.to_string(),
        content: content.to_string(),
        timestamp: get_str(metadata, "timestamp").unwrap_or_default().to_string(),
        emotional_trace: EmotionalTrace {
            primary,
            secondary,
            intensity: get_f64(metadata, "intensity", 0.5),
            valence: get_f64(metadata, "valence", 0.0),
            arousal: get_f64(metadata, "arousal", 0.5),
            body_state: get_str(metadata, "body_state").and_then(parse_body_state),
        },
        importance: get_i64(metadata, "importance", 3),
        category,
        tags: get_str(metadata, "tags").map(split_list).unwrap_or_default(),
        linked_ids: get_str(metadata, "linked_ids").map(links_from_json).unwrap_or_default(),
        is_private: parse_private(metadata.get("is_private")),
    }
}

/// Flatten a memory into index metadata
pub fn memory_to_metadata(memory: &Memory) -> Metadata {
    let trace = &memory.emotional_trace;
    let secondary: Vec<&str> = trace.secondary.iter().map(Emotion::as_str).collect();
    let body_state = match &trace.body_state {
        Some(state) => json!({
            "time_phase": state.time_phase,
            "system_load": state.system_load,
            "uptime_hours": state.uptime_hours,
        })
        .to_string(),
        None => String::new(),
    };

    let mut metadata = Metadata::new();
    metadata.insert("emotion".into(), json!(trace.primary.as_str()));
    metadata.insert("secondary".into(), json!(secondary.join(",")));
    metadata.insert("intensity".into(), json!(trace.intensity));
    metadata.insert("importance".into(), json!(memory.importance));
    metadata.insert("category".into(), json!(memory.category.as_str()));
    metadata.insert("timestamp".into(), json!(memory.timestamp));
    metadata.insert("valence".into(), json!(trace.valence));
    metadata.insert("arousal".into(), json!(trace.arousal));
    metadata.insert("body_state".into(), json!(body_state));
    metadata.insert("tags".into(), json!(memory.tags.join(",")));
    metadata.insert("linked_ids".into(), json!(links_to_json(&memory.linked_ids)));
    metadata.insert("is_private".into(), json!(memory.is_private));
    metadata
}

/// Rebuild an episode. `memory_ids` may be a JSON-encoded string or an array.
pub fn episode_from_record(id: &str, summary: &str, metadata: &Metadata) -> Episode {
    let memory_ids = match metadata.get("memory_ids") {
        Some(Value::String(raw)) => serde_json::from_str::<Vec<String>>(raw).unwrap_or_default(),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    };

    Episode {
        id: id.to_string(),
        summary: summary.to_string(),
        memory_ids,
        start_time: get_str(metadata, "start_time").unwrap_or_default().to_string(),
        end_time: get_str(metadata, "end_time").unwrap_or_default().to_string(),
        importance: get_i64(metadata, "importance", 3),
    }
}

pub fn episode_to_metadata(episode: &Episode) -> Metadata {
    let ids = json!(episode.memory_ids).to_string();
    let mut metadata = Metadata::new();
    metadata.insert("memory_ids".to_string(), json!(ids));
    metadata.insert("start_time".to_string(), json!(episode.start_time));
    metadata.insert("end_time".to_string(), json!(episode.end_time));
    metadata.insert("importance".to_string(), json!(episode.importance));
    metadata
}
