//! Cross-layer behaviour: typed objects over the vector store.

use std::sync::Arc;

use arena_memory::embedder::HashEmbedder;
use arena_memory::object_memory::{Converter, ObjectMemory};
use arena_memory::store::{VectorStore, VectorStoreConfig};
use arena_types::{MemoryError, MemoryResult, Metadata};
use serde::{Deserialize, Serialize};

/// A metric sample, stored with its full value in metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Metric {
    name: String,
    value: f64,
    tick: u64,
}

struct MetricConverter;

impl Converter for MetricConverter {
    type Object = Metric;

    fn to_text(&self, m: &Metric) -> MemoryResult<String> {
        Ok(format!("{} measured {} at tick {}", m.name, m.value, m.tick))
    }

    fn to_metadata(&self, m: &Metric) -> MemoryResult<Metadata> {
        match serde_json::to_value(m) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            _ => Err(MemoryError::Converter("metric is not an object".into())),
        }
    }

    fn from_dict(&self, metadata: &Metadata) -> MemoryResult<Metric> {
        serde_json::from_value(serde_json::Value::Object(metadata.clone()))
            .map_err(|e| MemoryError::Converter(e.to_string()))
    }
}

fn sample(name: &str, value: f64, tick: u64) -> Metric {
    Metric {
        name: name.into(),
        value,
        tick,
    }
}

#[test]
fn every_stored_object_round_trips() {
    let mut mem = ObjectMemory::new(
        MetricConverter,
        Arc::new(HashEmbedder::new(64)),
        VectorStoreConfig::default(),
    );
    let samples = vec![
        sample("health", 88.0, 1),
        sample("energy", 12.5, 2),
        sample("distance travelled", 140.25, 3),
    ];
    let ids: Vec<_> = samples.iter().map(|s| mem.store(s).unwrap()).collect();

    for (id, original) in ids.iter().zip(&samples) {
        assert_eq!(&mem.recall(id).unwrap(), original);
    }
    assert_eq!(mem.all(), samples);
}

#[test]
fn empty_vector_store_query_is_empty_list() {
    let store = VectorStore::new(Arc::new(HashEmbedder::default()), VectorStoreConfig::default());
    let hits = store.query("anything", 5, None).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn object_memory_query_matches_raw_ranking() {
    let mut mem = ObjectMemory::new(
        MetricConverter,
        Arc::new(HashEmbedder::new(128)),
        VectorStoreConfig::default(),
    );
    mem.store(&sample("health", 50.0, 1)).unwrap();
    mem.store(&sample("energy", 75.0, 2)).unwrap();
    mem.store(&sample("health", 40.0, 3)).unwrap();

    let typed = mem.query("health", 3).unwrap();
    let raw = mem.query_raw("health", 3).unwrap();
    assert_eq!(typed.len(), raw.len());
    for (obj, hit) in typed.iter().zip(&raw) {
        assert_eq!(&MetricConverter.from_dict(&hit.metadata).unwrap(), obj);
    }
    assert_eq!(typed[0].name, "health");
}
