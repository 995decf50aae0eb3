//! `arena-runtime` – wiring the memory layers into a running agent process.
//!
//! The layers in `arena-memory` and `arena-spatial` only see the
//! [`Embedder`][arena_memory::Embedder] and
//! [`Summarizer`][arena_memory::Summarizer] traits. This crate supplies the
//! HTTP-backed implementations, the configuration file, the tracing
//! pipeline, and the per-agent bundle that merges every layer into one
//! decision context.
//!
//! # Modules
//!
//! - [`config`] – [`Config`][config::Config]: `~/.arena/config.toml` with
//!   one section per layer and `ARENA_*` environment overrides.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with an optional OTLP span exporter. Set
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` to export spans to any OTLP collector.
//! - [`http_embedder`] – [`OllamaEmbedder`][http_embedder::OllamaEmbedder]:
//!   embeddings from an Ollama server (`/api/embeddings`).
//! - [`llm_summarizer`] – [`LlmSummarizer`][llm_summarizer::LlmSummarizer]:
//!   history compaction through an OpenAI-compatible
//!   `/v1/chat/completions` endpoint.
//! - [`context`] – [`AgentMemory`][context::AgentMemory] and
//!   [`DecisionContext`][context::DecisionContext].

pub mod config;
pub mod context;
pub mod http_embedder;
pub mod llm_summarizer;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use config::{Config, EmbedderProvider};
pub use context::{AgentMemory, DecisionContext, ObserveReport};
pub use http_embedder::{EmbedderError, OllamaEmbedder, embedder_from_config};
pub use llm_summarizer::{LlmError, LlmSummarizer, summarizer_from_config};
pub use telemetry::{TracerProviderGuard, init_tracing};
