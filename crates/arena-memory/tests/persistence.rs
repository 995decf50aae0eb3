//! Save/load behaviour of the vector store and the layers built on it.

use std::sync::Arc;

use arena_memory::embedder::{EMBEDDING_DIM_384, EMBEDDING_DIM_768, HashEmbedder};
use arena_memory::episodic::{EpisodicConfig, EpisodicMemory};
use arena_memory::index::{DistanceMetric, IndexKind};
use arena_memory::store::{VectorStore, VectorStoreConfig};
use arena_types::{MemoryError, Metadata, ObjectKind, Observation, Vec3};
use serde_json::json;
use uuid::Uuid;

const TEXTS: [&str; 6] = [
    "ripe berries at the edge of the forest",
    "a campfire burning near the river bank",
    "charging station next to the north wall",
    "another agent wandering by the lake",
    "stone pile blocking the eastern path",
    "berries growing on a bush by the river",
];

fn populated(dim: usize, config: VectorStoreConfig) -> (VectorStore, Vec<Uuid>) {
    let mut store = VectorStore::new(Arc::new(HashEmbedder::new(dim)), config);
    let ids = TEXTS
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let mut meta = Metadata::new();
            meta.insert("tick".into(), json!(i));
            meta.insert("tags".into(), json!(["scenery", i % 2 == 0]));
            store.store(text, meta).unwrap()
        })
        .collect();
    (store, ids)
}

#[test]
fn round_trip_preserves_records_and_ranking() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("memory.db");
    let (store, ids) = populated(EMBEDDING_DIM_384, VectorStoreConfig::default());
    let before = store.query("berries by the river", 4, None).unwrap();
    store.save(&path).unwrap();

    let mut fresh = VectorStore::new(
        Arc::new(HashEmbedder::new(EMBEDDING_DIM_384)),
        VectorStoreConfig::default(),
    );
    fresh.load(&path).unwrap();

    assert_eq!(fresh.len(), ids.len());
    for id in &ids {
        let original = store.recall(id).unwrap();
        let loaded = fresh.recall(id).unwrap();
        assert_eq!(loaded.text, original.text);
        assert_eq!(loaded.metadata, original.metadata);
        assert_eq!(loaded.vector, original.vector);
    }

    let after = fresh.query("berries by the river", 4, None).unwrap();
    let ids_before: Vec<Uuid> = before.iter().map(|h| h.id).collect();
    let ids_after: Vec<Uuid> = after.iter().map(|h| h.id).collect();
    assert_eq!(ids_before, ids_after);
}

#[test]
fn loaded_store_keeps_issuing_fresh_ids() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("memory.db");
    let (store, ids) = populated(64, VectorStoreConfig::default());
    store.save(&path).unwrap();

    let mut fresh = VectorStore::new(Arc::new(HashEmbedder::new(64)), VectorStoreConfig::default());
    fresh.load(&path).unwrap();
    let new_id = fresh.store("a brand new memory", Metadata::new()).unwrap();
    assert!(!ids.contains(&new_id));

    let order: Vec<Uuid> = fresh.all_records().iter().map(|r| r.id).collect();
    assert_eq!(&order[..ids.len()], &ids[..]);
    assert_eq!(order.last(), Some(&new_id));
}

#[test]
fn dimension_mismatch_is_corrupt_and_keeps_state() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("small.db");
    let (small, _) = populated(EMBEDDING_DIM_384, VectorStoreConfig::default());
    small.save(&path).unwrap();

    let mut large = VectorStore::new(
        Arc::new(HashEmbedder::new(EMBEDDING_DIM_768)),
        VectorStoreConfig::default(),
    );
    let kept = large.store("memory that must survive", Metadata::new()).unwrap();

    let err = large.load(&path).unwrap_err();
    assert!(matches!(err, MemoryError::CorruptState(_)), "got {err:?}");
    assert_eq!(large.len(), 1);
    assert_eq!(large.recall(&kept).unwrap().text, "memory that must survive");
    assert_eq!(large.query("memory", 5, None).unwrap()[0].id, kept);
}

#[test]
fn ivf_store_loads_into_same_ranking() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("ivf.db");
    let config = VectorStoreConfig {
        metric: DistanceMetric::Cosine,
        index: IndexKind::Ivf { nlist: 2, nprobe: 2 },
        capacity: None,
    };
    let (store, _) = populated(128, config);
    let before: Vec<Uuid> = store
        .query("campfire", 3, None)
        .unwrap()
        .iter()
        .map(|h| h.id)
        .collect();
    store.save(&path).unwrap();

    let mut fresh = VectorStore::new(Arc::new(HashEmbedder::new(128)), config);
    fresh.load(&path).unwrap();
    let after: Vec<Uuid> = fresh
        .query("campfire", 3, None)
        .unwrap()
        .iter()
        .map(|h| h.id)
        .collect();
    assert_eq!(before, after);
}

#[test]
fn episodic_memory_survives_restart() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("episodes.db");
    let embedder = Arc::new(HashEmbedder::new(128));

    let mut first = EpisodicMemory::new(embedder.clone(), VectorStoreConfig::default(), EpisodicConfig::default());
    let obs = Observation::new("forager", 7, Vec3::new(3.0, 0.0, 4.0))
        .with_visible("Berry1", ObjectKind::Resource, Vec3::new(3.0, 0.0, 1.0));
    first.store(&obs).unwrap();
    first.save(&path).unwrap();

    let mut second = EpisodicMemory::new(embedder, VectorStoreConfig::default(), EpisodicConfig::default());
    second.load(&path).unwrap();
    assert_eq!(second.query("Berry1", 1), vec![obs]);
}
