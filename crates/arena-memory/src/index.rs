//! Vector indexes.
//!
//! A [`VectorIndex`] owns the embedding vectors of a vector store, keyed by
//! record id, and answers nearest-neighbour queries. Two strategies share the
//! trait so the store can swap them without touching call sites:
//!
//! | Strategy | Search | Recall |
//! |----------|--------|--------|
//! | [`FlatIndex`] | exact linear scan | exact |
//! | [`IvfIndex`]  | inverted lists around k-means centroids, `nprobe` lists scanned | approximate once trained |
//!
//! Every index ranks by descending score and breaks ties by insertion order.
//! Scores are "higher is more similar" for every [`DistanceMetric`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use arena_types::MemoryError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lloyd iterations used when an [`IvfIndex`] trains its centroids.
const KMEANS_ITERATIONS: usize = 8;

// ─────────────────────────────────────────────────────────────────────────────
// Similarity
// ─────────────────────────────────────────────────────────────────────────────

/// Compute the cosine similarity between two equal-length vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` if either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// How two embeddings are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    DotProduct,
    /// L2 distance mapped to `1 / (1 + d)`.
    Euclidean,
}

impl DistanceMetric {
    /// Similarity score of `a` and `b`; higher means more similar.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => cosine_similarity(a, b),
            DistanceMetric::DotProduct => dot_product(a, b),
            DistanceMetric::Euclidean => 1.0 / (1.0 + euclidean_distance(a, b)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::DotProduct => "dot_product",
            DistanceMetric::Euclidean => "euclidean",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(DistanceMetric::Cosine),
            "dot_product" => Ok(DistanceMetric::DotProduct),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            other => Err(MemoryError::InvalidConfig(format!("unknown distance metric: {other}"))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Index strategy
// ─────────────────────────────────────────────────────────────────────────────

/// Which [`VectorIndex`] implementation backs a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexKind {
    #[default]
    Flat,
    Ivf {
        /// Number of inverted lists (k-means centroids).
        nlist: usize,
        /// Lists scanned per query.
        nprobe: usize,
    },
}

impl IndexKind {
    /// Build an empty index of this kind.
    pub fn build(&self, metric: DistanceMetric) -> Box<dyn VectorIndex> {
        match *self {
            IndexKind::Flat => Box::new(FlatIndex::new(metric)),
            IndexKind::Ivf { nlist, nprobe } => Box::new(IvfIndex::new(metric, nlist, nprobe)),
        }
    }
}

/// Storage and nearest-neighbour search over embedding vectors.
pub trait VectorIndex: Send + Sync {
    /// Add a vector. Re-inserting an existing id replaces its vector and moves
    /// it to the end of the insertion order.
    fn insert(&mut self, id: Uuid, vector: Vec<f32>);

    /// Remove a vector, returning `true` if it was present.
    fn remove(&mut self, id: &Uuid) -> bool;

    /// Up to `limit` `(id, score)` pairs ranked by descending score, ties in
    /// insertion order.
    fn search(&self, query: &[f32], limit: usize) -> Vec<(Uuid, f32)>;

    /// The stored vector for `id`.
    fn vector(&self, id: &Uuid) -> Option<&[f32]>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every vector (and any trained structure).
    fn clear(&mut self);

    fn kind(&self) -> IndexKind;

    fn metric(&self) -> DistanceMetric;
}

#[derive(Debug, Clone)]
struct Entry {
    id: Uuid,
    vector: Vec<f32>,
}

/// Sort `(seq, id, score)` candidates by descending score then ascending
/// sequence, and keep the first `limit`.
fn rank(mut candidates: Vec<(u64, Uuid, f32)>, limit: usize) -> Vec<(Uuid, f32)> {
    candidates.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)));
    candidates.truncate(limit);
    candidates.into_iter().map(|(_, id, score)| (id, score)).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// FlatIndex
// ─────────────────────────────────────────────────────────────────────────────

/// Exact index: every query scores every stored vector.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    metric: DistanceMetric,
    entries: BTreeMap<u64, Entry>,
    by_id: HashMap<Uuid, u64>,
    next_seq: u64,
}

impl FlatIndex {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            entries: BTreeMap::new(),
            by_id: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&mut self, id: Uuid, vector: Vec<f32>) {
        self.remove(&id);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(seq, Entry { id, vector });
        self.by_id.insert(id, seq);
    }

    fn remove(&mut self, id: &Uuid) -> bool {
        match self.by_id.remove(id) {
            Some(seq) => {
                self.entries.remove(&seq);
                true
            }
            None => false,
        }
    }

    fn search(&self, query: &[f32], limit: usize) -> Vec<(Uuid, f32)> {
        let scored = self
            .entries
            .iter()
            .map(|(&seq, e)| (seq, e.id, self.metric.score(&e.vector, query)))
            .collect();
        rank(scored, limit)
    }

    fn vector(&self, id: &Uuid) -> Option<&[f32]> {
        let seq = self.by_id.get(id)?;
        self.entries.get(seq).map(|e| e.vector.as_slice())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.by_id.clear();
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IvfIndex
// ─────────────────────────────────────────────────────────────────────────────

/// Inverted-file index.
///
/// Until `nlist` vectors have been inserted the index behaves exactly like a
/// [`FlatIndex`]. At that point it trains `nlist` centroids with a few rounds
/// of k-means (seeded with the first `nlist` vectors in insertion order, so
/// training is deterministic) and assigns every vector to its closest
/// centroid. Queries then only scan the `nprobe` lists whose centroids score
/// highest against the query. Vectors inserted after training join the list
/// of their closest centroid; centroids are not retrained.
#[derive(Debug, Clone)]
pub struct IvfIndex {
    metric: DistanceMetric,
    nlist: usize,
    nprobe: usize,
    entries: BTreeMap<u64, Entry>,
    by_id: HashMap<Uuid, u64>,
    next_seq: u64,
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<u64>>,
    assignment: HashMap<u64, usize>,
}

impl IvfIndex {
    /// `nlist` and `nprobe` are raised to at least 1; `nprobe` is capped at `nlist`.
    pub fn new(metric: DistanceMetric, nlist: usize, nprobe: usize) -> Self {
        let nlist = nlist.max(1);
        Self {
            metric,
            nlist,
            nprobe: nprobe.clamp(1, nlist),
            entries: BTreeMap::new(),
            by_id: HashMap::new(),
            next_seq: 0,
            centroids: Vec::new(),
            lists: Vec::new(),
            assignment: HashMap::new(),
        }
    }

    /// True once the centroids have been trained.
    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    fn closest_centroid(&self, vector: &[f32]) -> usize {
        let mut best = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (i, c) in self.centroids.iter().enumerate() {
            let s = self.metric.score(c, vector);
            if s > best_score {
                best = i;
                best_score = s;
            }
        }
        best
    }

    fn train(&mut self) {
        let mut centroids: Vec<Vec<f32>> = self
            .entries
            .values()
            .take(self.nlist)
            .map(|e| e.vector.clone())
            .collect();
        let dim = centroids.first().map(Vec::len).unwrap_or(0);

        for _ in 0..KMEANS_ITERATIONS {
            let mut sums = vec![vec![0.0f32; dim]; centroids.len()];
            let mut counts = vec![0usize; centroids.len()];
            for e in self.entries.values() {
                let mut best = 0;
                let mut best_score = f32::NEG_INFINITY;
                for (i, c) in centroids.iter().enumerate() {
                    let s = self.metric.score(c, &e.vector);
                    if s > best_score {
                        best = i;
                        best_score = s;
                    }
                }
                for (acc, v) in sums[best].iter_mut().zip(&e.vector) {
                    *acc += v;
                }
                counts[best] += 1;
            }
            for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
                // Empty clusters keep their previous centroid.
                if count > 0 {
                    *centroid = sum.into_iter().map(|s| s / count as f32).collect();
                }
            }
        }

        self.centroids = centroids;
        self.lists = vec![Vec::new(); self.centroids.len()];
        self.assignment.clear();
        let seqs: Vec<(u64, usize)> = self
            .entries
            .iter()
            .map(|(&seq, e)| (seq, self.closest_centroid(&e.vector)))
            .collect();
        for (seq, list) in seqs {
            self.lists[list].push(seq);
            self.assignment.insert(seq, list);
        }
        tracing::debug!(nlist = self.nlist, vectors = self.entries.len(), "trained IVF centroids");
    }
}

impl VectorIndex for IvfIndex {
    fn insert(&mut self, id: Uuid, vector: Vec<f32>) {
        self.remove(&id);
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.is_trained() {
            let list = self.closest_centroid(&vector);
            self.lists[list].push(seq);
            self.assignment.insert(seq, list);
        }
        self.entries.insert(seq, Entry { id, vector });
        self.by_id.insert(id, seq);
        if !self.is_trained() && self.entries.len() >= self.nlist {
            self.train();
        }
    }

    fn remove(&mut self, id: &Uuid) -> bool {
        let Some(seq) = self.by_id.remove(id) else {
            return false;
        };
        self.entries.remove(&seq);
        if let Some(list) = self.assignment.remove(&seq) {
            self.lists[list].retain(|s| *s != seq);
        }
        true
    }

    fn search(&self, query: &[f32], limit: usize) -> Vec<(Uuid, f32)> {
        if !self.is_trained() {
            let scored = self
                .entries
                .iter()
                .map(|(&seq, e)| (seq, e.id, self.metric.score(&e.vector, query)))
                .collect();
            return rank(scored, limit);
        }

        let mut probes: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.metric.score(c, query)))
            .collect();
        probes.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let scored = probes
            .into_iter()
            .take(self.nprobe)
            .flat_map(|(list, _)| self.lists[list].iter())
            .filter_map(|seq| {
                self.entries
                    .get(seq)
                    .map(|e| (*seq, e.id, self.metric.score(&e.vector, query)))
            })
            .collect();
        rank(scored, limit)
    }

    fn vector(&self, id: &Uuid) -> Option<&[f32]> {
        let seq = self.by_id.get(id)?;
        self.entries.get(seq).map(|e| e.vector.as_slice())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.by_id.clear();
        self.centroids.clear();
        self.lists.clear();
        self.assignment.clear();
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Ivf {
            nlist: self.nlist,
            nprobe: self.nprobe,
        }
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
