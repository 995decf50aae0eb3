//! `arena-memory` – semantic memory for arena agents.
//!
//! Everything that is retrieved by *meaning* lives here. Structured "what is
//! where" knowledge lives in `arena-spatial` and never touches these types.
//!
//! # Modules
//!
//! - [`embedder`] – [`Embedder`][embedder::Embedder] trait and the
//!   deterministic [`HashEmbedder`][embedder::HashEmbedder]; `FastEmbedder`
//!   behind the `local-embeddings` feature.
//! - [`index`] – exact ([`FlatIndex`][index::FlatIndex]) and approximate
//!   ([`IvfIndex`][index::IvfIndex]) nearest-neighbour indexes behind the
//!   [`VectorIndex`][index::VectorIndex] trait.
//! - [`store`] – [`VectorStore`][store::VectorStore]: text + metadata records
//!   with similarity search and SQLite persistence (layer 1).
//! - [`object_memory`] – [`ObjectMemory`][object_memory::ObjectMemory]: typed
//!   objects stored through a [`Converter`][object_memory::Converter]
//!   (layer 2).
//! - [`episodic`] – [`EpisodicMemory`][episodic::EpisodicMemory]: past
//!   observations recalled by similarity (layer 3b).
//! - [`history`] – [`BoundedHistory`][history::BoundedHistory]: fixed-size
//!   FIFO of recent entries.
//! - [`compacting`] – [`CompactingHistory`][compacting::CompactingHistory]:
//!   a FIFO that folds overflow into an LLM-written summary.

pub mod compacting;
pub mod embedder;
pub mod episodic;
pub mod history;
pub mod index;
pub mod object_memory;
pub mod store;

pub use compacting::{CompactingConfig, CompactingHistory, CompactionOutcome, Summarizer};
pub use embedder::{Embedder, HashEmbedder};
#[cfg(feature = "local-embeddings")]
pub use embedder::FastEmbedder;
pub use episodic::{EpisodicConfig, EpisodicMemory, ObservationConverter};
pub use history::{BoundedHistory, Narrate};
pub use index::{DistanceMetric, IndexKind, VectorIndex};
pub use object_memory::{Converter, FnConverter, ObjectMemory};
pub use store::{MemoryRecord, QueryHit, VectorStore, VectorStoreConfig};
