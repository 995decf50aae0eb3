//! Object Memory (layer 2).
//!
//! [`ObjectMemory`] stores typed domain objects through a [`VectorStore`] it
//! owns exclusively. The store never sees the domain type: a [`Converter`]
//! maps each object to the text that gets embedded and to the metadata that
//! is enough to rebuild it.
//!
//! A converter must be a pure mapping. The memory may call it lazily, more
//! than once, or in a different order than objects were stored.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use arena_memory::embedder::HashEmbedder;
//! use arena_memory::object_memory::{FnConverter, ObjectMemory};
//! use arena_memory::store::VectorStoreConfig;
//! use arena_types::{MemoryError, Metadata};
//! use serde_json::json;
//!
//! let converter = FnConverter::new(
//!     |note: &String| note.clone(),
//!     |note: &String| {
//!         let mut m = Metadata::new();
//!         m.insert("note".into(), json!(note));
//!         m
//!     },
//!     |m: &Metadata| {
//!         m.get("note")
//!             .and_then(|v| v.as_str())
//!             .map(str::to_string)
//!             .ok_or_else(|| MemoryError::Converter("missing note".into()))
//!     },
//! );
//!
//! let mut notes = ObjectMemory::new(converter, Arc::new(HashEmbedder::new(64)), VectorStoreConfig::default());
//! notes.store(&"the lake is north of spawn".to_string()).unwrap();
//! let found = notes.query("where is the lake", 1).unwrap();
//! assert_eq!(found, vec!["the lake is north of spawn".to_string()]);
//! ```

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use arena_types::{MemoryError, MemoryResult, Metadata};
use tracing::warn;
use uuid::Uuid;

use crate::embedder::Embedder;
use crate::store::{MemoryRecord, QueryHit, VectorStore, VectorStoreConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Converter
// ─────────────────────────────────────────────────────────────────────────────

/// Maps a domain object to and from the text + metadata form of a
/// [`VectorStore`] record.
///
/// `from_dict(to_metadata(obj))` must rebuild a value equal to `obj` on
/// every field the converter considers significant.
pub trait Converter: Send + Sync {
    type Object;

    /// Text that is embedded for similarity search.
    fn to_text(&self, obj: &Self::Object) -> MemoryResult<String>;

    /// Metadata sufficient to rebuild the object.
    fn to_metadata(&self, obj: &Self::Object) -> MemoryResult<Metadata>;

    /// Rebuild an object from stored metadata.
    fn from_dict(&self, metadata: &Metadata) -> MemoryResult<Self::Object>;
}

impl<C: Converter + ?Sized> Converter for Arc<C> {
    type Object = C::Object;

    fn to_text(&self, obj: &Self::Object) -> MemoryResult<String> {
        (**self).to_text(obj)
    }

    fn to_metadata(&self, obj: &Self::Object) -> MemoryResult<Metadata> {
        (**self).to_metadata(obj)
    }

    fn from_dict(&self, metadata: &Metadata) -> MemoryResult<Self::Object> {
        (**self).from_dict(metadata)
    }
}

/// A [`Converter`] assembled from three closures.
pub struct FnConverter<T, FT, FM, FD> {
    to_text: FT,
    to_metadata: FM,
    from_dict: FD,
    _object: PhantomData<fn() -> T>,
}

impl<T, FT, FM, FD> FnConverter<T, FT, FM, FD>
where
    FT: Fn(&T) -> String + Send + Sync,
    FM: Fn(&T) -> Metadata + Send + Sync,
    FD: Fn(&Metadata) -> MemoryResult<T> + Send + Sync,
{
    pub fn new(to_text: FT, to_metadata: FM, from_dict: FD) -> Self {
        Self {
            to_text,
            to_metadata,
            from_dict,
            _object: PhantomData,
        }
    }
}

impl<T, FT, FM, FD> Converter for FnConverter<T, FT, FM, FD>
where
    FT: Fn(&T) -> String + Send + Sync,
    FM: Fn(&T) -> Metadata + Send + Sync,
    FD: Fn(&Metadata) -> MemoryResult<T> + Send + Sync,
{
    type Object = T;

    fn to_text(&self, obj: &T) -> MemoryResult<String> {
        Ok((self.to_text)(obj))
    }

    fn to_metadata(&self, obj: &T) -> MemoryResult<Metadata> {
        Ok((self.to_metadata)(obj))
    }

    fn from_dict(&self, metadata: &Metadata) -> MemoryResult<T> {
        (self.from_dict)(metadata)
    }
}

fn converter_error(err: MemoryError) -> MemoryError {
    match err {
        MemoryError::Converter(_) => err,
        other => MemoryError::Converter(other.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ObjectMemory
// ─────────────────────────────────────────────────────────────────────────────

/// Typed semantic memory over a private [`VectorStore`].
#[derive(Debug)]
pub struct ObjectMemory<C: Converter> {
    converter: C,
    store: VectorStore,
}

impl<C: Converter> ObjectMemory<C> {
    pub fn new(converter: C, embedder: Arc<dyn Embedder>, config: VectorStoreConfig) -> Self {
        Self::from_store(converter, VectorStore::new(embedder, config))
    }

    /// Wrap an existing store. The memory takes exclusive ownership of it.
    pub fn from_store(converter: C, store: VectorStore) -> Self {
        Self { converter, store }
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// Read-only access to the underlying store.
    pub fn vector_store(&self) -> &VectorStore {
        &self.store
    }

    /// Store `obj` and return its record id.
    ///
    /// Both conversions run before anything is written, so a converter
    /// failure leaves the memory untouched.
    pub fn store(&mut self, obj: &C::Object) -> MemoryResult<Uuid> {
        self.store_with(obj, Metadata::new())
    }

    /// Store `obj` with additional metadata merged in.
    ///
    /// Keys produced by the converter take precedence over `extra`.
    pub fn store_with(&mut self, obj: &C::Object, extra: Metadata) -> MemoryResult<Uuid> {
        let text = self.converter.to_text(obj).map_err(converter_error)?;
        let mut metadata = self.converter.to_metadata(obj).map_err(converter_error)?;
        for (key, value) in extra {
            metadata.entry(key).or_insert(value);
        }
        self.store.store(&text, metadata)
    }

    /// Up to `k` objects most similar to `text`, best first.
    pub fn query(&self, text: &str, k: usize) -> MemoryResult<Vec<C::Object>> {
        self.query_with_threshold(text, k, None)
    }

    /// Like [`query`](Self::query), dropping hits that score below
    /// `threshold`.
    ///
    /// Records whose metadata the converter cannot rebuild are skipped with a
    /// warning.
    pub fn query_with_threshold(
        &self,
        text: &str,
        k: usize,
        threshold: Option<f32>,
    ) -> MemoryResult<Vec<C::Object>> {
        let hits = self.store.query(text, k, threshold)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| self.rebuild(&hit.id, &hit.metadata))
            .collect())
    }

    /// The underlying records of a query, without conversion.
    pub fn query_raw(&self, text: &str, k: usize) -> MemoryResult<Vec<QueryHit>> {
        self.store.query(text, k, None)
    }

    /// Rebuild the object stored under `id`.
    pub fn recall(&self, id: &Uuid) -> MemoryResult<C::Object> {
        let record = self.store.recall(id)?;
        self.converter
            .from_dict(&record.metadata)
            .map_err(converter_error)
    }

    pub fn recall_raw(&self, id: &Uuid) -> MemoryResult<MemoryRecord> {
        self.store.recall(id)
    }

    pub fn delete(&mut self, id: &Uuid) -> MemoryResult<()> {
        self.store.delete(id)
    }

    /// Every rebuildable object in insertion order.
    pub fn all(&self) -> Vec<C::Object> {
        self.store
            .all_records()
            .into_iter()
            .filter_map(|r| self.rebuild(&r.id, &r.metadata))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn clear(&mut self) {
        self.store.clear();
    }

    pub fn save(&self, path: impl AsRef<Path>) -> MemoryResult<()> {
        self.store.save(path)
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> MemoryResult<()> {
        self.store.load(path)
    }

    fn rebuild(&self, id: &Uuid, metadata: &Metadata) -> Option<C::Object> {
        match self.converter.from_dict(metadata) {
            Ok(obj) => Some(obj),
            Err(e) => {
                warn!(%id, error = %e, "skipping record the converter cannot rebuild");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct LogLine {
        level: String,
        message: String,
        tick: u64,
    }

    fn line(level: &str, message: &str, tick: u64) -> LogLine {
        LogLine {
            level: level.into(),
            message: message.into(),
            tick,
        }
    }

    struct LogConverter;

    impl Converter for LogConverter {
        type Object = LogLine;

        fn to_text(&self, obj: &LogLine) -> MemoryResult<String> {
            if obj.message.is_empty() {
                return Err(MemoryError::Converter("empty log message".into()));
            }
            Ok(format!("[{}] {}", obj.level, obj.message))
        }

        fn to_metadata(&self, obj: &LogLine) -> MemoryResult<Metadata> {
            let mut m = Metadata::new();
            m.insert("level".into(), json!(obj.level));
            m.insert("message".into(), json!(obj.message));
            m.insert("tick".into(), json!(obj.tick));
            Ok(m)
        }

        fn from_dict(&self, m: &Metadata) -> MemoryResult<LogLine> {
            let field = |k: &str| {
                m.get(k)
                    .ok_or_else(|| MemoryError::Converter(format!("missing field {k}")))
            };
            Ok(LogLine {
                level: field("level")?.as_str().unwrap_or_default().to_string(),
                message: field("message")?.as_str().unwrap_or_default().to_string(),
                tick: field("tick")?
                    .as_u64()
                    .ok_or_else(|| MemoryError::Converter("tick is not an integer".into()))?,
            })
        }
    }

    fn memory() -> ObjectMemory<LogConverter> {
        ObjectMemory::new(
            LogConverter,
            Arc::new(HashEmbedder::new(128)),
            VectorStoreConfig::default(),
        )
    }

    // ── store / recall ───────────────────────────────────────────────────────

    #[test]
    fn recall_round_trips_object() {
        let mut mem = memory();
        let original = line("warn", "energy low near the lake", 12);
        let id = mem.store(&original).unwrap();
        assert_eq!(mem.recall(&id).unwrap(), original);
    }

    #[test]
    fn query_returns_typed_objects() {
        let mut mem = memory();
        mem.store(&line("info", "picked up wood", 1)).unwrap();
        mem.store(&line("error", "fell into lava", 2)).unwrap();
        let found = mem.query("lava", 1).unwrap();
        assert_eq!(found, vec![line("error", "fell into lava", 2)]);
    }

    #[test]
    fn query_raw_exposes_text() {
        let mut mem = memory();
        mem.store(&line("info", "picked up wood", 1)).unwrap();
        let raw = mem.query_raw("wood", 1).unwrap();
        assert_eq!(raw[0].text, "[info] picked up wood");
        assert_eq!(raw[0].metadata["tick"], json!(1));
    }

    #[test]
    fn converter_failure_stores_nothing() {
        let mut mem = memory();
        let err = mem.store(&line("info", "", 1)).unwrap_err();
        assert!(matches!(err, MemoryError::Converter(_)));
        assert!(mem.is_empty());
    }

    #[test]
    fn store_with_keeps_converter_keys() {
        let mut mem = memory();
        let mut extra = Metadata::new();
        extra.insert("tick".into(), json!(999));
        extra.insert("source".into(), json!("sensor"));
        let id = mem.store_with(&line("info", "saw a fox", 5), extra).unwrap();
        let raw = mem.recall_raw(&id).unwrap();
        assert_eq!(raw.metadata["tick"], json!(5));
        assert_eq!(raw.metadata["source"], json!("sensor"));
        assert_eq!(mem.recall(&id).unwrap().tick, 5);
    }

    // ── unconvertible records ────────────────────────────────────────────────

    #[test]
    fn unconvertible_records_are_skipped_on_query() {
        let mut store = VectorStore::new(Arc::new(HashEmbedder::new(128)), VectorStoreConfig::default());
        store.store("[info] fox den", Metadata::new()).unwrap();
        let mut mem = ObjectMemory::from_store(LogConverter, store);
        mem.store(&line("info", "fox den", 3)).unwrap();

        let found = mem.query("fox den", 5).unwrap();
        assert_eq!(found, vec![line("info", "fox den", 3)]);
        assert_eq!(mem.all().len(), 1);
        assert_eq!(mem.len(), 2);
    }

    #[test]
    fn recall_of_unconvertible_record_is_converter_error() {
        let mut store = VectorStore::new(Arc::new(HashEmbedder::new(32)), VectorStoreConfig::default());
        let id = store.store("raw", Metadata::new()).unwrap();
        let mem = ObjectMemory::from_store(LogConverter, store);
        assert!(matches!(mem.recall(&id), Err(MemoryError::Converter(_))));
    }

    #[test]
    fn recall_unknown_id_is_not_found() {
        let mem = memory();
        assert!(matches!(mem.recall(&Uuid::new_v4()), Err(MemoryError::NotFound(_))));
    }

    // ── sharing / closures ───────────────────────────────────────────────────

    #[test]
    fn arc_converter_is_shared() {
        let shared = Arc::new(LogConverter);
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let mut a = ObjectMemory::new(Arc::clone(&shared), Arc::clone(&embedder), VectorStoreConfig::default());
        let mut b = ObjectMemory::new(Arc::clone(&shared), embedder, VectorStoreConfig::default());
        a.store(&line("info", "a", 1)).unwrap();
        b.store(&line("info", "b", 2)).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.all(), vec![line("info", "b", 2)]);
        assert_eq!(Arc::strong_count(&shared), 3);
    }

    #[test]
    fn fn_converter_round_trip() {
        let converter = FnConverter::new(
            |n: &u64| format!("number {n}"),
            |n: &u64| {
                let mut m = Metadata::new();
                m.insert("n".into(), json!(n));
                m
            },
            |m: &Metadata| {
                m.get("n")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| MemoryError::Converter("missing n".into()))
            },
        );
        let mut mem = ObjectMemory::new(converter, Arc::new(HashEmbedder::new(32)), VectorStoreConfig::default());
        let id = mem.store(&42).unwrap();
        assert_eq!(mem.recall(&id).unwrap(), 42);
    }

    #[test]
    fn delete_and_clear() {
        let mut mem = memory();
        let id = mem.store(&line("info", "x", 1)).unwrap();
        mem.store(&line("info", "y", 2)).unwrap();
        mem.delete(&id).unwrap();
        assert_eq!(mem.len(), 1);
        mem.clear();
        assert!(mem.is_empty());
    }
}
