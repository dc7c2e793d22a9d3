use crate::embeddings::cosine_distance;
use crate::error::{MemoryError, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;

/// Flat metadata document stored beside each record
pub type Metadata = Map<String, Value>;

/// Table holding memories
pub const MEMORY_TABLE: &str = "records";

/// Table holding episodes
pub const EPISODE_TABLE: &str = "episodes";

fn schema(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    document TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{{}}',
    embedding BLOB
);
"#
    )
}

/// Equality predicate over metadata fields, optionally conjoined
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    Eq(String, String),
    And(Vec<Where>),
}

impl Where {
    pub fn eq(field: &str, value: &str) -> Self {
        Where::Eq(field.to_string(), value.to_string())
    }

    /// Combine clauses; a single clause is returned as-is
    pub fn all(mut clauses: Vec<Where>) -> Option<Self> {
        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(Where::And(clauses)),
        }
    }

    fn to_sql(&self, args: &mut Vec<String>) -> Result<String> {
        match self {
            Where::Eq(field, value) => {
                if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(MemoryError::InvalidFilter(field.clone()));
                }
                args.push(value.clone());
                Ok(format!("json_extract(metadata, '$.{}') = ?", field))
            }
            Where::And(clauses) => {
                if clauses.is_empty() {
                    return Ok("1 = 1".to_string());
                }
                let parts = clauses
                    .iter()
                    .map(|c| c.to_sql(args))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("({})", parts.join(" AND ")))
            }
        }
    }
}

/// A record to insert
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// A stored record
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub embedding: Option<Vec<f32>>,
}

/// A nearest-neighbour hit
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub distance: f64,
}

/// Durable vector index with metadata filtering
pub trait VectorIndex {
    fn add(&self, entries: &[IndexEntry]) -> Result<()>;

    fn get(
        &self,
        ids: Option<&[String]>,
        filter: Option<&Where>,
        limit: Option<usize>,
        include_embeddings: bool,
    ) -> Result<Vec<IndexRecord>>;

    /// Nearest records to `embedding`, ascending by distance
    fn query(&self, embedding: &[f32], n_results: usize, filter: Option<&Where>) -> Result<Vec<QueryHit>>;

    /// Merge the given keys into each record's metadata
    fn update(&self, ids: &[String], metadatas: &[Metadata]) -> Result<()>;

    fn delete(&self, ids: &[String]) -> Result<()>;

    fn count(&self) -> Result<usize>;
}

/// Vector index backed by one SQLite table, scanned exhaustively with
/// cosine distance
pub struct SqliteIndex {
    conn: Connection,
    table: &'static str,
}

impl SqliteIndex {
    /// Open or create the memory index
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::open_table(db_path, MEMORY_TABLE)
    }

    /// Open or create an index over `table` in the same database file
    pub fn open_table(db_path: &Path, table: &'static str) -> Result<Self> {
        Self::with_connection(Connection::open(db_path)?, table)
    }

    fn with_connection(conn: Connection, table: &'static str) -> Result<Self> {
        conn.execute_batch(&schema(table))?;
        Ok(Self { conn, table })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Self::in_memory_table(MEMORY_TABLE)
    }

    #[cfg(test)]
    pub fn in_memory_table(table: &'static str) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    // -------------------------------------------------------------------------
    // Embedding serialization
    // -------------------------------------------------------------------------

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(data: &[u8]) -> Vec<f32> {
        data.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn parse_metadata(raw: &str) -> Metadata {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            _ => Metadata::new(),
        }
    }

    fn read_record(row: &rusqlite::Row<'_>, include_embeddings: bool) -> rusqlite::Result<IndexRecord> {
        let raw: String = row.get(2)?;
        let embedding = if include_embeddings {
            row.get::<_, Option<Vec<u8>>>(3)?
                .map(|bytes| Self::deserialize_embedding(&bytes))
        } else {
            None
        };

        Ok(IndexRecord {
            id: row.get(0)?,
            document: row.get(1)?,
            metadata: Self::parse_metadata(&raw),
            embedding,
        })
    }

    fn scan(&self, filter: Option<&Where>, include_embeddings: bool) -> Result<Vec<IndexRecord>> {
        let mut args = Vec::new();
        let clause = match filter {
            Some(w) => format!("WHERE {}", w.to_sql(&mut args)?),
            None => String::new(),
        };
        let sql = format!(
            "SELECT id, document, metadata, embedding FROM {} {} ORDER BY seq",
            self.table, clause
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args.iter()))?;
        let mut results = Vec::new();

        while let Some(row) = rows.next()? {
            results.push(Self::read_record(row, include_embeddings)?);
        }

        Ok(results)
    }

    fn get_one(&self, id: &str, filter: Option<&Where>, include_embeddings: bool) -> Result<Option<IndexRecord>> {
        let mut args = vec![id.to_string()];
        let extra = match filter {
            Some(w) => format!(" AND {}", w.to_sql(&mut args)?),
            None => String::new(),
        };
        let sql = format!(
            "SELECT id, document, metadata, embedding FROM {} WHERE id = ?{}",
            self.table, extra
        );

        let record = self
            .conn
            .query_row(&sql, params_from_iter(args.iter()), |row| {
                Self::read_record(row, include_embeddings)
            })
            .optional()?;

        Ok(record)
    }
}

impl VectorIndex for SqliteIndex {
    fn add(&self, entries: &[IndexEntry]) -> Result<()> {
        for entry in entries {
            let metadata = serde_json::to_string(&entry.metadata)?;
            self.conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO {} (id, document, metadata, embedding) VALUES (?1, ?2, ?3, ?4)",
                    self.table
                ),
                params![
                    entry.id,
                    entry.document,
                    metadata,
                    Self::serialize_embedding(&entry.embedding)
                ],
            )?;
        }
        Ok(())
    }

    fn get(
        &self,
        ids: Option<&[String]>,
        filter: Option<&Where>,
        limit: Option<usize>,
        include_embeddings: bool,
    ) -> Result<Vec<IndexRecord>> {
        let mut results = match ids {
            Some(ids) => {
                let mut found = Vec::new();
                for id in ids {
                    if let Some(record) = self.get_one(id, filter, include_embeddings)? {
                        found.push(record);
                    }
                }
                found
            }
            None => self.scan(filter, include_embeddings)?,
        };

        if let Some(limit) = limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    fn query(&self, embedding: &[f32], n_results: usize, filter: Option<&Where>) -> Result<Vec<QueryHit>> {
        let mut hits: Vec<QueryHit> = self
            .scan(filter, true)?
            .into_iter()
            .map(|record| {
                let distance = record
                    .embedding
                    .as_deref()
                    .map(|e| cosine_distance(embedding, e))
                    .unwrap_or(1.0);
                QueryHit {
                    id: record.id,
                    document: record.document,
                    metadata: record.metadata,
                    distance,
                }
            })
            .collect();

        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(n_results);
        Ok(hits)
    }

    fn update(&self, ids: &[String], metadatas: &[Metadata]) -> Result<()> {
        for (id, patch) in ids.iter().zip(metadatas) {
            let raw: Option<String> = self
                .conn
                .query_row(
                    &format!("SELECT metadata FROM {} WHERE id = ?1", self.table),
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(raw) = raw else {
                continue;
            };

            let mut metadata = Self::parse_metadata(&raw);
            for (key, value) in patch {
                metadata.insert(key.clone(), value.clone());
            }

            self.conn.execute(
                &format!("UPDATE {} SET metadata = ?1 WHERE id = ?2", self.table),
                params![serde_json::to_string(&metadata)?, id],
            )?;
        }
        Ok(())
    }

    fn delete(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            self.conn
                .execute(&format!("DELETE FROM {} WHERE id = ?1", self.table), params![id])?;
        }
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str, emotion: &str, category: &str, embedding: Vec<f32>) -> IndexEntry {
        let mut metadata = Metadata::new();
        metadata.insert("emotion".to_string(), json!(emotion));
        metadata.insert("category".to_string(), json!(category));
        IndexEntry {
            id: id.to_string(),
            document: format!("document {}", id),
            metadata,
            embedding,
        }
    }

    fn seeded() -> SqliteIndex {
        let index = SqliteIndex::in_memory().unwrap();
        index
            .add(&[
                entry("a", "happy", "daily", vec![1.0, 0.0, 0.0]),
                entry("b", "sad", "daily", vec![0.0, 1.0, 0.0]),
                entry("c", "happy", "technical", vec![0.7, 0.7, 0.0]),
            ])
            .unwrap();
        index
    }

    #[test]
    fn test_add_and_get() {
        let index = seeded();
        assert_eq!(index.count().unwrap(), 3);

        let ids = vec!["c".to_string(), "missing".to_string(), "a".to_string()];
        let records = index.get(Some(&ids), None, None, true).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "c");
        assert_eq!(records[1].id, "a");
        assert_eq!(records[1].embedding.as_deref(), Some(&[1.0, 0.0, 0.0][..]));
    }

    #[test]
    fn test_query_orders_by_distance() {
        let index = seeded();
        let hits = index.query(&[1.0, 0.0, 0.0], 3, None).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!(hits[0].distance.abs() < 1e-6);
        assert!((hits[2].distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_where_filters() {
        let index = seeded();

        let happy = Where::eq("emotion", "happy");
        assert_eq!(index.get(None, Some(&happy), None, false).unwrap().len(), 2);

        let both = Where::all(vec![Where::eq("emotion", "happy"), Where::eq("category", "daily")]).unwrap();
        let hits = index.query(&[0.0, 1.0, 0.0], 10, Some(&both)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");

        let bad = Where::eq("emotion'; DROP TABLE records; --", "x");
        assert!(index.get(None, Some(&bad), None, false).is_err());
    }

    #[test]
    fn test_update_merges_metadata() {
        let index = seeded();
        let mut patch = Metadata::new();
        patch.insert("linked_ids".to_string(), json!("[]"));
        index.update(&["a".to_string()], &[patch]).unwrap();

        let record = index.get(Some(&["a".to_string()]), None, None, false).unwrap().remove(0);
        assert_eq!(record.metadata["emotion"], json!("happy"));
        assert_eq!(record.metadata["linked_ids"], json!("[]"));
    }

    #[test]
    fn test_delete() {
        let index = seeded();
        index.delete(&["b".to_string()]).unwrap();
        assert_eq!(index.count().unwrap(), 2);
        assert!(index.get(Some(&["b".to_string()]), None, None, false).unwrap().is_empty());
    }

    #[test]
    fn test_tables_share_a_file_but_not_rows() {
        let dir = std::env::temp_dir().join(format!("reverie-index-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let db = dir.join("memory.db");

        let memories = SqliteIndex::open(&db).unwrap();
        let episodes = SqliteIndex::open_table(&db, EPISODE_TABLE).unwrap();
        memories.add(&[entry("a", "happy", "daily", vec![1.0, 0.0])]).unwrap();

        assert_eq!(memories.count().unwrap(), 1);
        assert_eq!(episodes.count().unwrap(), 0);
        assert!(episodes.query(&[1.0, 0.0], 5, None).unwrap().is_empty());

        drop(memories);
        drop(episodes);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
