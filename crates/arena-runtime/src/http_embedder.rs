//! Embeddings from an Ollama server.
//!
//! [`OllamaEmbedder`] posts each text to `{base_url}/api/embeddings` and
//! checks the returned vector against the configured dimension before the
//! vector store ever sees it. [`embedder_from_config`] also builds the
//! in-process providers.

use std::sync::Arc;
use std::time::Duration;

use arena_memory::embedder::{Embedder, HashEmbedder, local_model_dimension};
use arena_types::{MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{EmbedderConfig, EmbedderProvider};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response from embedding server: {0}")]
    BadResponse(String),
    #[error("model returned {actual}-dimensional vectors, expected {expected}")]
    Dimension { expected: usize, actual: usize },
    #[error("unsupported local embedding model {0:?}")]
    UnsupportedModel(String),
    #[error("local embeddings require the `local-embeddings` feature")]
    Unavailable,
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl From<EmbedderError> for MemoryError {
    fn from(e: EmbedderError) -> Self {
        match e {
            EmbedderError::Dimension { expected, actual } => {
                MemoryError::DimensionMismatch { expected, actual }
            }
            EmbedderError::Memory(e) => e,
            other => MemoryError::Embedding(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// OllamaEmbedder
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    dimension: usize,
    client: reqwest::blocking::Client,
}

impl OllamaEmbedder {
    /// Build an embedder with its own HTTP client.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbedderError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, model, dimension, client))
    }

    /// Build an embedder around an existing client.
    pub fn with_client(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        client: reqwest::blocking::Client,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            dimension,
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let url = format!("{}/api/embeddings", self.base_url.trim_end_matches('/'));
        let body = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };
        let resp: EmbeddingResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;

        if resp.embedding.is_empty() {
            return Err(EmbedderError::BadResponse("empty embedding".into()));
        }
        if resp.embedding.len() != self.dimension {
            return Err(EmbedderError::Dimension {
                expected: self.dimension,
                actual: resp.embedding.len(),
            });
        }
        debug!(model = %self.model, chars = text.len(), "embedded text");
        Ok(resp.embedding)
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        self.request(text).map_err(MemoryError::from)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// The embedder selected by `cfg.provider`.
pub fn embedder_from_config(cfg: &EmbedderConfig) -> Result<Arc<dyn Embedder>, EmbedderError> {
    let embedder: Arc<dyn Embedder> = match cfg.provider {
        EmbedderProvider::Hash => Arc::new(HashEmbedder::new(cfg.dimension)),
        EmbedderProvider::Ollama => Arc::new(OllamaEmbedder::new(
            cfg.url.clone(),
            cfg.model.clone(),
            cfg.dimension,
            Duration::from_secs(cfg.timeout_secs),
        )?),
        EmbedderProvider::Local => local_embedder(cfg)?,
    };
    Ok(embedder)
}

fn local_embedder(cfg: &EmbedderConfig) -> Result<Arc<dyn Embedder>, EmbedderError> {
    let Some(dimension) = local_model_dimension(&cfg.model) else {
        return Err(EmbedderError::UnsupportedModel(cfg.model.clone()));
    };
    if dimension != cfg.dimension {
        return Err(EmbedderError::Dimension {
            expected: cfg.dimension,
            actual: dimension,
        });
    }
    #[cfg(feature = "local-embeddings")]
    let embedder: Result<Arc<dyn Embedder>, EmbedderError> =
        Ok(Arc::new(arena_memory::embedder::FastEmbedder::new(&cfg.model)?));
    #[cfg(not(feature = "local-embeddings"))]
    let embedder: Result<Arc<dyn Embedder>, EmbedderError> = Err(EmbedderError::Unavailable);
    embedder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::local_client;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn embedder(server: &Server, dimension: usize) -> OllamaEmbedder {
        OllamaEmbedder::with_client(server.url(), "nomic-embed-text", dimension, local_client())
    }

    // ── happy path ──

    #[test]
    fn posts_model_and_prompt_and_returns_vector() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/api/embeddings")
            .match_body(Matcher::Json(json!({
                "model": "nomic-embed-text",
                "prompt": "berries near the river",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"embedding":[0.5,-0.25,1.0]}"#)
            .create();

        let v = embedder(&server, 3).embed("berries near the river").unwrap();
        assert_eq!(v, vec![0.5, -0.25, 1.0]);
        mock.assert();
    }

    #[test]
    fn trailing_slash_in_base_url_is_ignored() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/api/embeddings")
            .with_body(r#"{"embedding":[1.0]}"#)
            .create();
        let e = OllamaEmbedder::with_client(format!("{}/", server.url()), "m", 1, local_client());
        e.embed("x").unwrap();
        mock.assert();
    }

    // ── failures ──

    #[test]
    fn wrong_dimension_is_dimension_mismatch() {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/api/embeddings")
            .with_body(r#"{"embedding":[1.0,2.0]}"#)
            .create();
        let err = embedder(&server, 4).embed("x").unwrap_err();
        assert_eq!(err, MemoryError::DimensionMismatch { expected: 4, actual: 2 });
    }

    #[test]
    fn server_error_is_embedding_error() {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/api/embeddings")
            .with_status(500)
            .with_body(r#"{"error":"model not loaded"}"#)
            .create();
        let err = embedder(&server, 3).embed("x").unwrap_err();
        assert!(matches!(err, MemoryError::Embedding(ref m) if m.contains("500")), "got {err:?}");
    }

    #[test]
    fn empty_or_malformed_body_is_embedding_error() {
        let mut server = Server::new();
        let _empty = server
            .mock("POST", "/api/embeddings")
            .match_body(Matcher::PartialJson(json!({ "prompt": "a" })))
            .with_body(r#"{"embedding":[]}"#)
            .create();
        let _malformed = server
            .mock("POST", "/api/embeddings")
            .match_body(Matcher::PartialJson(json!({ "prompt": "b" })))
            .with_body(r#"{"vectors":[1.0]}"#)
            .create();
        let e = embedder(&server, 3);
        assert!(matches!(e.embed("a"), Err(MemoryError::Embedding(_))));
        assert!(matches!(e.embed("b"), Err(MemoryError::Embedding(_))));
    }

    // ── construction ──

    #[test]
    fn hash_provider_needs_no_server() {
        let cfg = EmbedderConfig {
            dimension: 32,
            ..EmbedderConfig::default()
        };
        let e = embedder_from_config(&cfg).unwrap();
        assert_eq!(e.dimension(), 32);
        assert_eq!(e.embed("anything").unwrap().len(), 32);
    }

    #[test]
    fn local_provider_checks_model_and_dimension_before_loading() {
        let unknown = EmbedderConfig {
            provider: EmbedderProvider::Local,
            model: "text-embedding-3-small".into(),
            ..EmbedderConfig::default()
        };
        let err = embedder_from_config(&unknown).err().expect("unknown model must be rejected");
        assert!(matches!(err, EmbedderError::UnsupportedModel(ref m) if m == "text-embedding-3-small"));

        let mismatched = EmbedderConfig {
            provider: EmbedderProvider::Local,
            model: "nomic-embed-text".into(),
            dimension: 384,
            ..EmbedderConfig::default()
        };
        let err = MemoryError::from(embedder_from_config(&mismatched).err().expect("dimension mismatch must be rejected"));
        assert_eq!(err, MemoryError::DimensionMismatch { expected: 384, actual: 768 });
    }

    #[cfg(not(feature = "local-embeddings"))]
    #[test]
    fn local_provider_without_feature_is_unavailable() {
        let cfg = EmbedderConfig {
            provider: EmbedderProvider::Local,
            model: "all-MiniLM-L6-v2".into(),
            ..EmbedderConfig::default()
        };
        assert!(matches!(embedder_from_config(&cfg), Err(EmbedderError::Unavailable)));
    }

    #[test]
    fn ollama_provider_reports_configured_model() {
        let cfg = EmbedderConfig {
            provider: EmbedderProvider::Ollama,
            model: "all-minilm".into(),
            ..EmbedderConfig::default()
        };
        let e = embedder_from_config(&cfg).unwrap();
        assert_eq!(e.model_name(), "all-minilm");
        assert_eq!(e.dimension(), cfg.dimension);
    }
}
