//! Per-agent memory bundle and decision-context assembly.
//!
//! [`AgentMemory`] owns one agent's world map, episodic memory and
//! short-term history. It is the only place where spatial and semantic
//! memory meet: each layer is queried on its own and the results are merged
//! into a [`DecisionContext`] that renders as a prompt-ready text block.
//!
//! Agents never share an `AgentMemory`. Run one per agent (one per thread is
//! fine); only the embedder and summarizer behind `Arc`s are shared.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use arena_memory::embedder::HashEmbedder;
//! use arena_runtime::config::Config;
//! use arena_runtime::context::AgentMemory;
//! use arena_types::{ObjectKind, Observation, Vec3};
//!
//! let mut memory = AgentMemory::from_config("forager", &Config::default(), Arc::new(HashEmbedder::new(64)), None).unwrap();
//! memory.observe(&Observation::new("forager", 1, Vec3::default())
//!     .with_visible("Berry1", ObjectKind::Resource, Vec3::new(2.0, 0.0, 0.0)));
//!
//! let ctx = memory.build_context("where is food?");
//! assert_eq!(ctx.nearby[0].object.name, "Berry1");
//! println!("{}", ctx.render());
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arena_memory::compacting::{CompactingHistory, CompactionOutcome, Summarizer};
use arena_memory::embedder::Embedder;
use arena_memory::episodic::EpisodicMemory;
use arena_memory::history::{BoundedHistory, Narrate};
use arena_spatial::world_map::{NearQuery, SpatialHit, UpdateReport, WorldMap};
use arena_types::{ExperienceEvent, MemoryResult, Observation, Vec3};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, ContextSection};

// ─────────────────────────────────────────────────────────────────────────────
// Reports
// ─────────────────────────────────────────────────────────────────────────────

/// What one [`AgentMemory::observe`] call did to each layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ObserveReport {
    pub map: UpdateReport,
    /// Id of the stored episode; `None` when episodic storage failed.
    pub episode: Option<Uuid>,
    /// Set only when a compacting history is attached.
    pub compaction: Option<CompactionOutcome>,
}

/// Everything an agent's decision step gets to see, merged from every layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionContext {
    pub agent_id: String,
    /// Tick and position of the latest observation, if any.
    pub tick: Option<u64>,
    pub position: Option<Vec3>,
    pub world_summary: String,
    /// Active objects within the configured radius, nearest first.
    pub nearby: Vec<SpatialHit>,
    /// Past observations semantically similar to the query, excluding the
    /// current tick.
    pub similar_episodes: Vec<Observation>,
    /// Oldest first.
    pub recent_experiences: Vec<ExperienceEvent>,
    pub history: String,
}

impl DecisionContext {
    /// Prompt-ready text block.
    pub fn render(&self) -> String {
        let mut out = String::new();
        match (self.tick, self.position) {
            (Some(tick), Some(pos)) => {
                out.push_str(&format!("## Agent {} at tick {tick}, position {pos}\n", self.agent_id))
            }
            _ => out.push_str(&format!("## Agent {} (no observations yet)\n", self.agent_id)),
        }

        out.push_str("\n## World map\n");
        out.push_str(&self.world_summary);
        out.push('\n');

        out.push_str("\n## Nearby\n");
        if self.nearby.is_empty() {
            out.push_str("- nothing nearby\n");
        }
        for hit in &self.nearby {
            out.push_str(&format!(
                "- {} ({}) {:.1} away",
                hit.object.name, hit.object.kind, hit.distance
            ));
            if hit.staleness > 0 {
                out.push_str(&format!(", seen {} ticks ago", hit.staleness));
            }
            out.push('\n');
        }

        out.push_str("\n## Similar past episodes\n");
        if self.similar_episodes.is_empty() {
            out.push_str("- none\n");
        }
        for ep in &self.similar_episodes {
            out.push_str(&format!("- {}\n", ep.narrate()));
        }

        out.push_str("\n## Recent experiences\n");
        if self.recent_experiences.is_empty() {
            out.push_str("- none\n");
        }
        for ev in &self.recent_experiences {
            out.push_str(&format!("- Tick {} {}: {}\n", ev.tick, ev.kind, ev.description));
        }

        out.push_str("\n## Recent history\n");
        out.push_str(&self.history);
        out.push('\n');
        out
    }
}

impl fmt::Display for DecisionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AgentMemory
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct AgentMemory {
    agent_id: String,
    world_map: WorldMap,
    episodic: EpisodicMemory,
    history: BoundedHistory<Observation>,
    compacting: Option<CompactingHistory<Observation>>,
    settings: ContextSection,
    persist_path: Option<PathBuf>,
}

impl AgentMemory {
    /// Assemble from already-built layers, with default context settings, no
    /// compaction and no persistence.
    pub fn new(
        agent_id: impl Into<String>,
        world_map: WorldMap,
        episodic: EpisodicMemory,
        history: BoundedHistory<Observation>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            world_map,
            episodic,
            history,
            compacting: None,
            settings: ContextSection::default(),
            persist_path: None,
        }
    }

    /// Build every layer from `cfg`.
    ///
    /// When `cfg.episodic.persist_path` names an existing file, past
    /// episodes are loaded from it. A compacting history is attached only
    /// when a `summarizer` is given.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidConfig`](arena_types::MemoryError::InvalidConfig)
    /// for unusable tunables, and any load error of the persisted episodes
    /// (for instance a store written with a different embedding dimension).
    pub fn from_config(
        agent_id: impl Into<String>,
        cfg: &Config,
        embedder: Arc<dyn Embedder>,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> MemoryResult<Self> {
        let agent_id = agent_id.into();
        let world_map = WorldMap::new(cfg.world_map)?;
        let mut episodic = EpisodicMemory::new(embedder, cfg.vector_store, cfg.episodic.memory);
        if let Some(path) = &cfg.episodic.persist_path
            && path.exists()
        {
            episodic.load(path)?;
            info!(agent = %agent_id, episodes = episodic.len(), path = %path.display(), "restored episodic memory");
        }
        let history = BoundedHistory::new(cfg.history.window)?;
        let compacting = summarizer
            .map(|s| CompactingHistory::new(s, cfg.history.compaction))
            .transpose()?;

        Ok(Self {
            agent_id,
            world_map,
            episodic,
            history,
            compacting,
            settings: cfg.context.clone(),
            persist_path: cfg.episodic.persist_path.clone(),
        })
    }

    pub fn with_compaction(mut self, compacting: CompactingHistory<Observation>) -> Self {
        self.compacting = Some(compacting);
        self
    }

    pub fn with_settings(mut self, settings: ContextSection) -> Self {
        self.settings = settings;
        self
    }

    /// Where [`end_episode`](Self::end_episode) saves episodic memory.
    pub fn with_persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn world_map(&self) -> &WorldMap {
        &self.world_map
    }

    /// Mutable map access for lifecycle events (`mark_collected`, ...).
    pub fn world_map_mut(&mut self) -> &mut WorldMap {
        &mut self.world_map
    }

    pub fn episodic(&self) -> &EpisodicMemory {
        &self.episodic
    }

    pub fn history(&self) -> &BoundedHistory<Observation> {
        &self.history
    }

    pub fn compacting(&self) -> Option<&CompactingHistory<Observation>> {
        self.compacting.as_ref()
    }

    pub fn persist_path(&self) -> Option<&Path> {
        self.persist_path.as_deref()
    }

    // ── ingestion ────────────────────────────────────────────────────────────

    /// Feed one observation to every layer.
    ///
    /// The world map and histories always update. A failing embedder only
    /// costs this tick's episode.
    pub fn observe(&mut self, obs: &Observation) -> ObserveReport {
        if obs.agent_id != self.agent_id {
            warn!(agent = %self.agent_id, from = %obs.agent_id, "observation addressed to another agent");
        }
        let map = self.world_map.update_from_observation(obs);
        let episode = match self.episodic.store(obs) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(agent = %self.agent_id, tick = obs.tick, error = %e, "episode not stored");
                None
            }
        };
        self.history.push(obs.clone());
        let compaction = self.compacting.as_mut().map(|c| c.push(obs.clone()));
        debug!(
            agent = %self.agent_id,
            tick = obs.tick,
            created = map.created.len(),
            updated = map.updated.len(),
            "observed"
        );
        ObserveReport {
            map,
            episode,
            compaction,
        }
    }

    /// Log a significant event on the world map.
    pub fn record_experience(&mut self, event: ExperienceEvent) {
        self.world_map.record_experience(event);
    }

    // ── context ──────────────────────────────────────────────────────────────

    /// Query each layer independently and merge the results.
    ///
    /// `query` drives the episodic recall; the spatial part is centred on
    /// the latest observed position.
    pub fn build_context(&self, query: &str) -> DecisionContext {
        let latest = self.history.latest();
        let tick = latest.map(|o| o.tick);
        let position = latest.map(|o| o.position);

        let nearby = match position {
            Some(pos) => self
                .world_map
                .query_near_position_with(&NearQuery::new(pos, self.settings.nearby_radius)),
            None => Vec::new(),
        };

        let k = self.episodic.config().default_k;
        let similar_episodes: Vec<Observation> = self
            .episodic
            .query(query, k + 1)
            .into_iter()
            .filter(|ep| Some(ep.tick) != tick)
            .take(k)
            .collect();

        let recent_experiences = self
            .world_map
            .recent_experiences(self.settings.experiences)
            .into_iter()
            .cloned()
            .collect();

        let history = match &self.compacting {
            Some(c) => c.summarize(),
            None => self.history.summarize(self.settings.history),
        };

        DecisionContext {
            agent_id: self.agent_id.clone(),
            tick,
            position,
            world_summary: self.world_map.summarize(),
            nearby,
            similar_episodes,
            recent_experiences,
            history,
        }
    }

    // ── lifecycle ────────────────────────────────────────────────────────────

    /// Close an episode: persist episodic memory if a path is set, then
    /// forget the map, experiences and short-term history.
    ///
    /// Episodic memory itself is kept; it spans episodes.
    ///
    /// # Errors
    ///
    /// The save error, in which case nothing is cleared.
    pub fn end_episode(&mut self) -> MemoryResult<()> {
        if let Some(path) = &self.persist_path {
            self.episodic.save(path)?;
            info!(agent = %self.agent_id, episodes = self.episodic.len(), path = %path.display(), "saved episodic memory");
        }
        self.world_map.clear();
        self.history.clear();
        if let Some(c) = self.compacting.as_mut() {
            c.clear();
        }
        Ok(())
    }
}
