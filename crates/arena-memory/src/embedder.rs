//! Text embedding.
//!
//! The [`Embedder`] trait is the seam to the external model-serving
//! collaborator. Implementations must be stateless from the caller's point of
//! view: one embedder is shared read-only by every agent in the process, so
//! `embed` takes `&self` and the trait requires `Send + Sync`.
//!
//! [`HashEmbedder`] is a deterministic, dependency-free embedder based on
//! feature hashing of lowercase word tokens. Texts that share words land close
//! together, which is enough for tests and offline runs.
//!
//! With the `local-embeddings` feature, [`FastEmbedder`] runs a sentence
//! embedding model in-process through `fastembed`.
//!
//! # Example
//!
//! ```rust
//! use arena_memory::embedder::{Embedder, HashEmbedder};
//!
//! let embedder = HashEmbedder::new(64);
//! let v = embedder.embed("berries near the river").unwrap();
//! assert_eq!(v.len(), 64);
//! ```

#[cfg(feature = "local-embeddings")]
use arena_types::MemoryError;
use arena_types::MemoryResult;

/// Dimension of `all-MiniLM-L6-v2` style models.
pub const EMBEDDING_DIM_384: usize = 384;
/// Dimension of `all-mpnet-base-v2` style models.
pub const EMBEDDING_DIM_768: usize = 768;

/// Converts text into a fixed-length vector.
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    fn embed(&self, text: &str) -> MemoryResult<Vec<f32>>;

    /// Embed several texts. The default embeds them one by one.
    fn embed_batch(&self, texts: &[&str]) -> MemoryResult<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Identifier of the underlying model, recorded in persisted stores.
    fn model_name(&self) -> &str;
}

// ─────────────────────────────────────────────────────────────────────────────
// HashEmbedder
// ─────────────────────────────────────────────────────────────────────────────

/// Feature-hashing bag-of-words embedder.
///
/// Each lowercase alphanumeric token is hashed with 64-bit FNV-1a; the hash
/// selects a bucket and a sign. The resulting vector is L2-normalised, so the
/// output is identical on every machine and across process restarts.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashEmbedder {
    /// Create an embedder producing `dimension`-length vectors.
    ///
    /// A zero dimension is bumped to 1.
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_name: format!("hash-bow-{dimension}"),
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM_384)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokens(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FastEmbedder
// ─────────────────────────────────────────────────────────────────────────────

/// Models [`FastEmbedder`] can load, with the dimension each one produces.
pub const LOCAL_MODELS: &[(&str, usize)] = &[
    ("all-MiniLM-L6-v2", EMBEDDING_DIM_384),
    ("BAAI/bge-small-en-v1.5", EMBEDDING_DIM_384),
    ("BAAI/bge-base-en-v1.5", EMBEDDING_DIM_768),
    ("nomic-embed-text", EMBEDDING_DIM_768),
];

/// Output dimension of a model in [`LOCAL_MODELS`].
pub fn local_model_dimension(model: &str) -> Option<usize> {
    LOCAL_MODELS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, dim)| *dim)
}

/// Sentence embeddings computed in-process with an ONNX model.
///
/// The model is downloaded on first use and cached by `fastembed`.
/// Requires the `local-embeddings` feature.
#[cfg(feature = "local-embeddings")]
pub struct FastEmbedder {
    model: std::sync::Mutex<fastembed::TextEmbedding>,
    model_name: String,
    dimension: usize,
}

#[cfg(feature = "local-embeddings")]
impl std::fmt::Debug for FastEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedder")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

#[cfg(feature = "local-embeddings")]
impl FastEmbedder {
    /// Load `model`, one of the names in [`LOCAL_MODELS`].
    ///
    /// # Errors
    ///
    /// [`MemoryError::Embedding`] for an unknown model name or when the model
    /// cannot be loaded.
    pub fn new(model: &str) -> MemoryResult<Self> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let (variant, dimension) = match model {
            "all-MiniLM-L6-v2" => (EmbeddingModel::AllMiniLML6V2, EMBEDDING_DIM_384),
            "BAAI/bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, EMBEDDING_DIM_384),
            "BAAI/bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, EMBEDDING_DIM_768),
            "nomic-embed-text" => (EmbeddingModel::NomicEmbedTextV15, EMBEDDING_DIM_768),
            other => {
                let known: Vec<&str> = LOCAL_MODELS.iter().map(|(n, _)| *n).collect();
                return Err(MemoryError::Embedding(format!(
                    "unsupported local model {other:?} (supported: {})",
                    known.join(", ")
                )));
            }
        };

        let text_model = TextEmbedding::try_new(InitOptions::new(variant).with_show_download_progress(false))
            .map_err(|e| MemoryError::Embedding(format!("failed to load {model}: {e}")))?;
        tracing::info!(model, dimension, "loaded local embedding model");

        Ok(Self {
            model: std::sync::Mutex::new(text_model),
            model_name: model.to_string(),
            dimension,
        })
    }
}

#[cfg(feature = "local-embeddings")]
impl Embedder for FastEmbedder {
    fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::Embedding("no embedding returned".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> MemoryResult<Vec<Vec<f32>>> {
        let mut model = self
            .model
            .lock()
            .map_err(|e| MemoryError::Embedding(format!("embedding model lock poisoned: {e}")))?;
        let vectors = model
            .embed(texts.to_vec(), None)
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: v.len(),
            });
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[test]
    fn embedding_has_configured_dimension() {
        let e = HashEmbedder::new(32);
        assert_eq!(e.embed("hello world").unwrap().len(), 32);
        assert_eq!(e.dimension(), 32);
    }

    #[test]
    fn embedding_is_deterministic() {
        let a = HashEmbedder::new(64).embed("Berry at the forest edge").unwrap();
        let b = HashEmbedder::new(64).embed("Berry at the forest edge").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn embedding_is_unit_length() {
        let v = HashEmbedder::new(64).embed("fire hazard nearby").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let v = HashEmbedder::new(16).embed("  ...  ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn shared_words_are_more_similar() {
        let e = HashEmbedder::new(256);
        let q = e.embed("berry bush").unwrap();
        let near = e.embed("a berry bush by the river").unwrap();
        let far = e.embed("lava pit with smoke").unwrap();
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn case_and_punctuation_are_ignored() {
        let e = HashEmbedder::new(64);
        assert_eq!(e.embed("Berry, Bush!").unwrap(), e.embed("berry bush").unwrap());
    }

    #[test]
    fn batch_matches_single() {
        let e = HashEmbedder::new(16);
        let batch = e.embed_batch(&["a b", "c"]).unwrap();
        assert_eq!(batch[0], e.embed("a b").unwrap());
        assert_eq!(batch[1], e.embed("c").unwrap());
    }

    #[test]
    fn zero_dimension_is_bumped() {
        assert_eq!(HashEmbedder::new(0).dimension(), 1);
    }

    // ── local models ──

    #[test]
    fn local_model_table_knows_dimensions() {
        assert_eq!(local_model_dimension("all-MiniLM-L6-v2"), Some(EMBEDDING_DIM_384));
        assert_eq!(local_model_dimension("nomic-embed-text"), Some(EMBEDDING_DIM_768));
        assert_eq!(local_model_dimension("text-embedding-3-small"), None);
    }

    #[cfg(feature = "local-embeddings")]
    #[test]
    fn unknown_local_model_is_rejected() {
        let err = FastEmbedder::new("not-a-model").unwrap_err();
        assert!(matches!(err, MemoryError::Embedding(ref m) if m.contains("not-a-model")));
    }

    #[cfg(feature = "local-embeddings")]
    #[test]
    #[ignore = "downloads the model"]
    fn local_model_ranks_paraphrase_above_unrelated() {
        let e = FastEmbedder::new("all-MiniLM-L6-v2").unwrap();
        let q = e.embed("The cat sat on the mat").unwrap();
        assert_eq!(q.len(), EMBEDDING_DIM_384);
        let near = e.embed("A cat is sitting on a mat").unwrap();
        let far = e.embed("Quantum physics is complex").unwrap();
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }
}
