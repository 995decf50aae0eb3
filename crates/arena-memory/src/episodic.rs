//! Episodic Memory (layer 3b).
//!
//! An [`ObjectMemory`] over [`Observation`] snapshots. Each observation is
//! embedded as one narrated line (position, health, what was in view) so the
//! agent can ask "have I been somewhere like this before?".
//!
//! The full observation is kept in the record metadata, so recalled
//! observations are exactly the ones stored.

use std::path::Path;
use std::sync::Arc;

use arena_types::{MemoryError, MemoryResult, Metadata, Observation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::embedder::Embedder;
use crate::history::Narrate;
use crate::object_memory::{Converter, ObjectMemory};
use crate::store::VectorStoreConfig;

/// [`Converter`] for [`Observation`] records.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObservationConverter;

impl Converter for ObservationConverter {
    type Object = Observation;

    fn to_text(&self, obs: &Observation) -> MemoryResult<String> {
        Ok(obs.narrate())
    }

    fn to_metadata(&self, obs: &Observation) -> MemoryResult<Metadata> {
        match serde_json::to_value(obs) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(MemoryError::Converter(format!(
                "observation serialized to non-object {other}"
            ))),
            Err(e) => Err(MemoryError::Converter(e.to_string())),
        }
    }

    fn from_dict(&self, metadata: &Metadata) -> MemoryResult<Observation> {
        serde_json::from_value(Value::Object(metadata.clone()))
            .map_err(|e| MemoryError::Converter(format!("not an observation: {e}")))
    }
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodicConfig {
    /// Results returned by [`EpisodicMemory::query_default`].
    #[serde(default = "default_k")]
    pub default_k: usize,
    /// Minimum similarity for a past episode to count as relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f32>,
}

impl Default for EpisodicConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            similarity_threshold: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EpisodicMemory
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct EpisodicMemory {
    memory: ObjectMemory<ObservationConverter>,
    config: EpisodicConfig,
}

impl EpisodicMemory {
    pub fn new(embedder: Arc<dyn Embedder>, store: VectorStoreConfig, config: EpisodicConfig) -> Self {
        Self {
            memory: ObjectMemory::new(ObservationConverter, embedder, store),
            config,
        }
    }

    pub fn config(&self) -> &EpisodicConfig {
        &self.config
    }

    /// Append one observation.
    pub fn store(&mut self, obs: &Observation) -> MemoryResult<Uuid> {
        let id = self.memory.store(obs)?;
        debug!(agent = %obs.agent_id, tick = obs.tick, "stored episode");
        Ok(id)
    }

    /// Up to `k` past observations similar to `text`.
    ///
    /// Never fails: an embedding or storage error is logged and reported as
    /// "no relevant memories".
    pub fn query(&self, text: &str, k: usize) -> Vec<Observation> {
        self.try_query(text, k).unwrap_or_else(|e| {
            warn!(error = %e, "episodic query failed, continuing without memories");
            Vec::new()
        })
    }

    /// [`query`](Self::query) with the configured `default_k`.
    pub fn query_default(&self, text: &str) -> Vec<Observation> {
        self.query(text, self.config.default_k)
    }

    /// Fallible form of [`query`](Self::query).
    pub fn try_query(&self, text: &str, k: usize) -> MemoryResult<Vec<Observation>> {
        self.memory
            .query_with_threshold(text, k, self.config.similarity_threshold)
    }

    /// The `limit` most recent observations by tick, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Observation> {
        let mut all = self.memory.all();
        // Stable sort keeps later insertions ahead on equal ticks after reversing.
        all.sort_by_key(|o| o.tick);
        all.into_iter().rev().take(limit).collect()
    }

    /// The `limit` most recent episodes rendered for an LLM context.
    pub fn summarize(&self, limit: usize) -> String {
        let recent = self.recent(limit);
        if recent.is_empty() {
            return "No episodes in memory.".to_string();
        }
        let mut lines = vec![format!(
            "Episodic memory ({} of {} episodes):",
            recent.len(),
            self.len()
        )];
        lines.extend(recent.iter().map(|o| format!("- {}", o.narrate())));
        lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    pub fn clear(&mut self) {
        self.memory.clear();
    }

    pub fn save(&self, path: impl AsRef<Path>) -> MemoryResult<()> {
        self.memory.save(path)
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> MemoryResult<()> {
        self.memory.load(path)
    }
}
