//! Vector Store (layer 1).
//!
//! Embeds arbitrary text with an [`Embedder`], keeps the resulting vectors in
//! a pluggable [`VectorIndex`], and retrieves records by semantic similarity
//! or by id. The store knows nothing about the domain objects stored above
//! it; a record is just text plus free-form [`Metadata`].
//!
//! # Persistence layout
//!
//! [`VectorStore::save`] writes a single SQLite file with two tables:
//!
//! | table            | columns                                              |
//! |------------------|------------------------------------------------------|
//! | `store_meta`     | `key TEXT PRIMARY KEY`, `value TEXT`                 |
//! | `memory_records` | `seq INTEGER`, `id TEXT`, `text TEXT`, `metadata TEXT` (JSON), `embedding BLOB` (little-endian f32, 4 × N bytes) |
//!
//! `store_meta` carries `format_version`, `dimension`, `metric`,
//! `embedding_model`, `saved_at` and `next_seq`. The file is written next to
//! the target and renamed into place, so a crash never leaves a half-written
//! store behind.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use arena_memory::embedder::HashEmbedder;
//! use arena_memory::store::{VectorStore, VectorStoreConfig};
//! use arena_types::Metadata;
//!
//! let mut store = VectorStore::new(Arc::new(HashEmbedder::new(64)), VectorStoreConfig::default());
//! let id = store.store("found berries near the forest edge", Metadata::new()).unwrap();
//!
//! let hits = store.query("where are the berries?", 3, None).unwrap();
//! assert_eq!(hits[0].id, id);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arena_types::{MemoryError, MemoryResult, Metadata};
use chrono::Utc;
use rusqlite::{Connection, OpenFlags, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embedder::Embedder;
use crate::index::{DistanceMetric, IndexKind, VectorIndex};

/// Version written to `store_meta.format_version`.
pub const FORMAT_VERSION: u32 = 1;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS store_meta (
        key   TEXT NOT NULL PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS memory_records (
        seq       INTEGER NOT NULL PRIMARY KEY,
        id        TEXT NOT NULL UNIQUE,
        text      TEXT NOT NULL,
        metadata  TEXT NOT NULL,
        embedding BLOB NOT NULL
    );";

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// A stored record, as returned by [`VectorStore::recall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub text: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

/// One ranked result of [`VectorStore::query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub id: Uuid,
    pub text: String,
    pub metadata: Metadata,
    /// Similarity to the query; higher is better.
    pub score: f32,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    seq: u64,
    text: String,
    metadata: Metadata,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables of a [`VectorStore`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default)]
    pub index: IndexKind,
    /// Hard ceiling on the number of records. `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding serialisation helpers
// ─────────────────────────────────────────────────────────────────────────────

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn storage(e: impl fmt::Display) -> MemoryError {
    MemoryError::Storage(e.to_string())
}

fn corrupt(e: impl fmt::Display) -> MemoryError {
    MemoryError::CorruptState(e.to_string())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// ─────────────────────────────────────────────────────────────────────────────
// VectorStore
// ─────────────────────────────────────────────────────────────────────────────

/// Text + metadata store with semantic retrieval.
///
/// Mutating operations take `&mut self`, so a store cannot be saved while a
/// `store`/`delete` is in flight on the same instance. Share one across
/// threads behind a `Mutex` if needed.
pub struct VectorStore {
    embedder: Arc<dyn Embedder>,
    config: VectorStoreConfig,
    index: Box<dyn VectorIndex>,
    records: HashMap<Uuid, StoredRecord>,
    next_seq: u64,
}

impl fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorStore")
            .field("model", &self.embedder.model_name())
            .field("dimension", &self.embedder.dimension())
            .field("config", &self.config)
            .field("len", &self.records.len())
            .finish()
    }
}

impl VectorStore {
    /// Create an empty store whose dimension is fixed by `embedder`.
    pub fn new(embedder: Arc<dyn Embedder>, config: VectorStoreConfig) -> Self {
        let index = config.index.build(config.metric);
        debug!(
            model = embedder.model_name(),
            dimension = embedder.dimension(),
            metric = %config.metric,
            "created vector store"
        );
        Self {
            embedder,
            config,
            index,
            records: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn metric(&self) -> DistanceMetric {
        self.config.metric
    }

    pub fn config(&self) -> &VectorStoreConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn embed_checked(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let vector = self.embedder.embed(text)?;
        if vector.len() != self.dimension() {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension(),
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Embed `text` and store it with `metadata`, returning a fresh id.
    ///
    /// Ids are random v4 UUIDs and are never handed out twice.
    ///
    /// # Errors
    ///
    /// [`MemoryError::CapacityExceeded`] when a capacity is configured and
    /// reached; [`MemoryError::Embedding`] or
    /// [`MemoryError::DimensionMismatch`] when the embedder fails. Nothing is
    /// stored on error.
    pub fn store(&mut self, text: &str, metadata: Metadata) -> MemoryResult<Uuid> {
        if let Some(capacity) = self.config.capacity
            && self.records.len() >= capacity
        {
            return Err(MemoryError::CapacityExceeded { capacity });
        }
        let vector = self.embed_checked(text)?;
        let id = Uuid::new_v4();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(id, vector);
        self.records.insert(
            id,
            StoredRecord {
                seq,
                text: text.to_string(),
                metadata,
            },
        );
        debug!(%id, seq, "stored memory record");
        Ok(id)
    }

    /// Return up to `k` records most similar to `text`.
    ///
    /// When `threshold` is given, records scoring below it are dropped before
    /// the result is cut to `k`. An empty store yields an empty list.
    pub fn query(&self, text: &str, k: usize, threshold: Option<f32>) -> MemoryResult<Vec<QueryHit>> {
        if k == 0 || self.records.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embed_checked(text)?;
        let limit = if threshold.is_some() { self.index.len() } else { k };
        let hits: Vec<QueryHit> = self
            .index
            .search(&query, limit)
            .into_iter()
            .filter(|(_, score)| threshold.is_none_or(|t| *score >= t))
            .filter_map(|(id, score)| {
                self.records.get(&id).map(|r| QueryHit {
                    id,
                    text: r.text.clone(),
                    metadata: r.metadata.clone(),
                    score,
                })
            })
            .take(k)
            .collect();
        debug!(k, returned = hits.len(), "vector store query");
        Ok(hits)
    }

    /// Fetch a record by id.
    pub fn recall(&self, id: &Uuid) -> MemoryResult<MemoryRecord> {
        let record = self
            .records
            .get(id)
            .ok_or_else(|| MemoryError::NotFound(format!("memory record {id}")))?;
        let vector = self.index.vector(id).map(<[f32]>::to_vec).unwrap_or_default();
        Ok(MemoryRecord {
            id: *id,
            text: record.text.clone(),
            metadata: record.metadata.clone(),
            vector,
        })
    }

    /// Remove a record.
    pub fn delete(&mut self, id: &Uuid) -> MemoryResult<()> {
        if self.records.remove(id).is_none() {
            return Err(MemoryError::NotFound(format!("memory record {id}")));
        }
        self.index.remove(id);
        debug!(%id, "deleted memory record");
        Ok(())
    }

    /// Every record in insertion order.
    pub fn all_records(&self) -> Vec<MemoryRecord> {
        let mut ordered: Vec<(&Uuid, &StoredRecord)> = self.records.iter().collect();
        ordered.sort_by_key(|(_, r)| r.seq);
        ordered
            .into_iter()
            .map(|(id, r)| MemoryRecord {
                id: *id,
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                vector: self.index.vector(id).map(<[f32]>::to_vec).unwrap_or_default(),
            })
            .collect()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
        info!("cleared vector store");
    }

    // ── persistence ──────────────────────────────────────────────────────────

    /// Persist the full store to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> MemoryResult<()> {
        let path = path.as_ref();
        let tmp = temp_path(path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(storage)?;
        }
        if tmp.exists() {
            fs::remove_file(&tmp).map_err(storage)?;
        }

        {
            let mut conn = Connection::open(&tmp).map_err(storage)?;
            conn.execute_batch(SCHEMA).map_err(storage)?;
            let tx = conn.transaction().map_err(storage)?;
            {
                let mut meta = tx
                    .prepare("INSERT INTO store_meta (key, value) VALUES (?1, ?2)")
                    .map_err(storage)?;
                let entries = [
                    ("format_version", FORMAT_VERSION.to_string()),
                    ("dimension", self.dimension().to_string()),
                    ("metric", self.config.metric.as_str().to_string()),
                    ("embedding_model", self.embedder.model_name().to_string()),
                    ("saved_at", Utc::now().to_rfc3339()),
                    ("next_seq", self.next_seq.to_string()),
                ];
                for (key, value) in entries {
                    meta.execute(params![key, value]).map_err(storage)?;
                }

                let mut insert = tx
                    .prepare(
                        "INSERT INTO memory_records (seq, id, text, metadata, embedding)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )
                    .map_err(storage)?;
                let mut ordered: Vec<(&Uuid, &StoredRecord)> = self.records.iter().collect();
                ordered.sort_by_key(|(_, r)| r.seq);
                for (id, record) in ordered {
                    let metadata = serde_json::to_string(&record.metadata).map_err(storage)?;
                    let blob = embedding_to_bytes(self.index.vector(id).unwrap_or_default());
                    insert
                        .execute(params![
                            record.seq as i64,
                            id.to_string(),
                            record.text,
                            metadata,
                            blob,
                        ])
                        .map_err(storage)?;
                }
            }
            tx.commit().map_err(storage)?;
        }

        fs::rename(&tmp, path).map_err(storage)?;
        info!(path = %path.display(), records = self.records.len(), "saved vector store");
        Ok(())
    }

    /// Replace the in-memory state with the store persisted at `path`.
    ///
    /// The file is read and validated completely before anything is swapped
    /// in; on error the current state is left untouched.
    ///
    /// # Errors
    ///
    /// [`MemoryError::NotFound`] when `path` does not exist;
    /// [`MemoryError::CorruptState`] when the file is unreadable, has an
    /// unknown format version, or disagrees with this store's embedding
    /// dimension or distance metric.
    pub fn load(&mut self, path: impl AsRef<Path>) -> MemoryResult<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MemoryError::NotFound(format!("persisted store {}", path.display())));
        }
        let conn =
            Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(corrupt)?;

        let meta = read_meta(&conn)?;
        let field = |key: &str| {
            meta.get(key)
                .ok_or_else(|| MemoryError::CorruptState(format!("missing store_meta.{key}")))
        };

        let version: u32 = field("format_version")?.parse().map_err(corrupt)?;
        if version != FORMAT_VERSION {
            return Err(MemoryError::CorruptState(format!(
                "unsupported format version {version} (expected {FORMAT_VERSION})"
            )));
        }
        let dimension: usize = field("dimension")?.parse().map_err(corrupt)?;
        if dimension != self.dimension() {
            return Err(MemoryError::CorruptState(format!(
                "embedding dimension mismatch: file has {dimension}, embedder produces {}",
                self.dimension()
            )));
        }
        let metric: DistanceMetric = field("metric")?.parse().map_err(corrupt)?;
        if metric != self.config.metric {
            return Err(MemoryError::CorruptState(format!(
                "distance metric mismatch: file uses {metric}, store uses {}",
                self.config.metric
            )));
        }
        let model = field("embedding_model")?;
        if model != self.embedder.model_name() {
            warn!(
                file_model = %model,
                embedder_model = self.embedder.model_name(),
                "loaded store was embedded with a different model"
            );
        }
        let mut next_seq: u64 = field("next_seq")?.parse().map_err(corrupt)?;

        let mut index = self.config.index.build(self.config.metric);
        let mut records = HashMap::new();
        let mut stmt = conn
            .prepare(
                "SELECT seq, id, text, metadata, embedding
                 FROM memory_records
                 ORDER BY seq ASC",
            )
            .map_err(corrupt)?;
        let rows = stmt
            .query_map([], |row| {
                let seq: i64 = row.get(0)?;
                let id: String = row.get(1)?;
                let text: String = row.get(2)?;
                let metadata: String = row.get(3)?;
                let blob: Vec<u8> = row.get(4)?;
                Ok((seq, id, text, metadata, blob))
            })
            .map_err(corrupt)?;

        for row in rows {
            let (seq, id, text, metadata, blob) = row.map_err(corrupt)?;
            let seq = u64::try_from(seq).map_err(corrupt)?;
            let id = Uuid::parse_str(&id).map_err(corrupt)?;
            let metadata: Metadata = serde_json::from_str(&metadata).map_err(corrupt)?;
            if blob.len() != dimension * 4 {
                return Err(MemoryError::CorruptState(format!(
                    "record {id} has a {}-byte embedding, expected {}",
                    blob.len(),
                    dimension * 4
                )));
            }
            index.insert(id, bytes_to_embedding(&blob));
            if records.insert(id, StoredRecord { seq, text, metadata }).is_some() {
                return Err(MemoryError::CorruptState(format!("duplicate record id {id}")));
            }
            next_seq = next_seq.max(seq + 1);
        }

        self.index = index;
        self.records = records;
        self.next_seq = next_seq;
        info!(path = %path.display(), records = self.records.len(), "loaded vector store");
        Ok(())
    }
}

fn read_meta(conn: &Connection) -> MemoryResult<HashMap<String, String>> {
    let mut stmt = conn
        .prepare("SELECT key, value FROM store_meta")
        .map_err(corrupt)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(corrupt)?;
    let mut meta = HashMap::new();
    for row in rows {
        let (key, value) = row.map_err(corrupt)?;
        meta.insert(key, value);
    }
    Ok(meta)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
