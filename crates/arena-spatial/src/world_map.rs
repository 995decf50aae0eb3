//! Spatial World Map (layer 3a).
//!
//! A structured registry of named world objects. Unlike the vector store,
//! every query here has exactly one correct answer for the current state: an
//! object *is* at its last reported position until an observation says
//! otherwise.
//!
//! The object table and the [`SpatialGrid`] are private and only change
//! together inside `WorldMap` methods, so every known object sits in the
//! cell matching its current position.
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`WorldMap`]         | Object table + grid index + experience log.        |
//! | [`NearQuery`]        | Proximity query with kind, status and staleness filters. |
//! | [`SpatialHit`]       | One proximity result with distance and staleness.  |
//! | [`WorldMapSnapshot`] | Serializable dump for inspection.                  |
//!
//! # Example
//!
//! ```rust
//! use arena_spatial::world_map::{WorldMap, WorldMapConfig};
//! use arena_types::{ObjectKind, Observation, Vec3};
//!
//! let mut map = WorldMap::new(WorldMapConfig::default()).unwrap();
//! let obs = Observation::new("forager", 1, Vec3::new(0.0, 0.0, 0.0))
//!     .with_visible("Berry1", ObjectKind::Resource, Vec3::new(1.0, 0.0, 1.0));
//! map.update_from_observation(&obs);
//!
//! let near = map.query_near_position(Vec3::new(0.0, 0.0, 0.0), 5.0, None);
//! assert_eq!(near[0].name, "Berry1");
//!
//! map.mark_collected("Berry1");
//! assert!(map.query_by_kind(ObjectKind::Resource).is_empty());
//! ```

use std::collections::{HashMap, VecDeque};

use arena_types::{
    ExperienceEvent, ExperienceKind, MemoryError, MemoryResult, Metadata, ObjectKind, ObjectStatus,
    Observation, Vec3, WorldObject,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::grid::SpatialGrid;

/// Attribute naming an object's subtype, e.g. `"collision"` for obstacles
/// registered by collisions.
pub const SUBTYPE_KEY: &str = "subtype";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

fn default_cell_size() -> f64 {
    10.0
}

fn default_stale_threshold() -> u64 {
    100
}

fn default_max_experiences() -> usize {
    50
}

fn default_summary_per_kind_limit() -> usize {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldMapConfig {
    /// Side length of one grid cell in world units.
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,
    /// Ticks unseen after which an object counts as stale.
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold: u64,
    /// Experiences kept before the oldest is dropped.
    #[serde(default = "default_max_experiences")]
    pub max_experiences: usize,
    /// Objects listed per kind in [`WorldMap::summarize`].
    #[serde(default = "default_summary_per_kind_limit")]
    pub summary_per_kind_limit: usize,
}

impl Default for WorldMapConfig {
    fn default() -> Self {
        Self {
            cell_size: default_cell_size(),
            stale_threshold: default_stale_threshold(),
            max_experiences: default_max_experiences(),
            summary_per_kind_limit: default_summary_per_kind_limit(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Query types
// ─────────────────────────────────────────────────────────────────────────────

/// Which lifecycle states a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    ActiveOnly,
    /// Active and collected; destroyed objects stay hidden.
    IncludeCollected,
    All,
}

impl StatusFilter {
    pub fn accepts(&self, status: ObjectStatus) -> bool {
        match self {
            StatusFilter::ActiveOnly => status == ObjectStatus::Active,
            StatusFilter::IncludeCollected => status != ObjectStatus::Destroyed,
            StatusFilter::All => true,
        }
    }
}

/// Parameters of [`WorldMap::query_near_position_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearQuery {
    pub position: Vec3,
    pub radius: f64,
    pub kind: Option<ObjectKind>,
    pub status: StatusFilter,
    /// Drop objects unseen for more than this many ticks.
    pub max_staleness: Option<u64>,
}

impl NearQuery {
    pub fn new(position: Vec3, radius: f64) -> Self {
        Self {
            position,
            radius,
            kind: None,
            status: StatusFilter::default(),
            max_staleness: None,
        }
    }

    pub fn kind(mut self, kind: ObjectKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn max_staleness(mut self, ticks: u64) -> Self {
        self.max_staleness = Some(ticks);
        self
    }
}

/// One result of a proximity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialHit {
    pub object: WorldObject,
    pub distance: f64,
    /// Ticks since the object was last observed.
    pub staleness: u64,
}

/// What one [`WorldMap::update_from_observation`] call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub tick: u64,
    /// Names seen for the first time.
    pub created: Vec<String>,
    /// Names already known and refreshed.
    pub updated: Vec<String>,
    /// Refreshed objects that crossed into another grid cell.
    pub relocated: usize,
    /// Sightings older than what the map already knew; dropped.
    pub ignored_out_of_order: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub total_objects: usize,
    pub active_objects: usize,
    pub collected_objects: usize,
    pub destroyed_objects: usize,
    pub stale_objects: usize,
    pub experience_count: usize,
    pub occupied_cells: usize,
    pub current_tick: u64,
}

/// Full map state for inspection and debugging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldMapSnapshot {
    pub stats: SnapshotStats,
    pub cell_size: f64,
    /// Every known object, sorted by name.
    pub objects: Vec<WorldObject>,
    /// Experience log, oldest first.
    pub experiences: Vec<ExperienceEvent>,
}

fn kind_heading(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Resource => "Resources",
        ObjectKind::Hazard => "Hazards",
        ObjectKind::Station => "Stations",
        ObjectKind::Agent => "Agents",
        ObjectKind::Other => "Other",
    }
}

fn by_distance_then_name(a: &SpatialHit, b: &SpatialHit) -> std::cmp::Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.object.name.cmp(&b.object.name))
}

// ─────────────────────────────────────────────────────────────────────────────
// WorldMap
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WorldMap {
    config: WorldMapConfig,
    objects: HashMap<String, WorldObject>,
    grid: SpatialGrid,
    experiences: VecDeque<ExperienceEvent>,
    current_tick: u64,
}

impl WorldMap {
    /// # Errors
    ///
    /// [`MemoryError::InvalidConfig`] for a non-positive cell size.
    pub fn new(config: WorldMapConfig) -> MemoryResult<Self> {
        let grid = SpatialGrid::new(config.cell_size)?;
        info!(
            cell_size = config.cell_size,
            stale_threshold = config.stale_threshold,
            "initialised world map"
        );
        Ok(Self {
            config,
            objects: HashMap::new(),
            grid,
            experiences: VecDeque::new(),
            current_tick: 0,
        })
    }

    pub fn config(&self) -> &WorldMapConfig {
        &self.config
    }

    /// Read-only view of the grid index.
    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// Highest tick seen in an observation or experience.
    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Number of known objects, terminal ones included.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    // ── mutation ─────────────────────────────────────────────────────────────

    /// Upsert every object visible in `obs`.
    pub fn update_from_observation(&mut self, obs: &Observation) -> UpdateReport {
        self.current_tick = self.current_tick.max(obs.tick);
        let mut report = UpdateReport {
            tick: obs.tick,
            ..UpdateReport::default()
        };
        for visible in &obs.visible {
            self.upsert(WorldObject::from_visible(visible, obs.tick), &mut report);
        }
        debug!(
            tick = obs.tick,
            created = report.created.len(),
            updated = report.updated.len(),
            total = self.objects.len(),
            "updated world map"
        );
        report
    }

    fn upsert(&mut self, incoming: WorldObject, report: &mut UpdateReport) {
        let Some(existing) = self.objects.get_mut(&incoming.name) else {
            self.grid.insert(&incoming.name, incoming.position);
            report.created.push(incoming.name.clone());
            self.objects.insert(incoming.name.clone(), incoming);
            return;
        };

        if incoming.last_seen_tick < existing.last_seen_tick {
            report.ignored_out_of_order += 1;
            return;
        }

        let from = self.grid.key_for(existing.position);
        let to = self.grid.key_for(incoming.position);
        existing.kind = incoming.kind;
        existing.position = incoming.position;
        existing.last_seen_tick = incoming.last_seen_tick;
        existing.attributes = incoming.attributes;
        if from != to {
            self.grid.relocate(&existing.name, from, to);
            report.relocated += 1;
        }
        report.updated.push(existing.name.clone());
    }

    fn transition(&mut self, name: &str, status: ObjectStatus) -> bool {
        match self.objects.get_mut(name) {
            Some(obj) if obj.status == ObjectStatus::Active => {
                obj.status = status;
                debug!(object = name, %status, "object status changed");
                true
            }
            _ => false,
        }
    }

    /// Mark an object as collected.
    ///
    /// Returns `true` only for the first transition; unknown names and
    /// objects already collected or destroyed are left untouched.
    pub fn mark_collected(&mut self, name: &str) -> bool {
        self.transition(name, ObjectStatus::Collected)
    }

    /// Mark an object as destroyed. Same rules as
    /// [`mark_collected`](Self::mark_collected).
    pub fn mark_destroyed(&mut self, name: &str) -> bool {
        self.transition(name, ObjectStatus::Destroyed)
    }

    /// Forget all objects and experiences.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.grid.clear();
        self.experiences.clear();
        self.current_tick = 0;
        info!("cleared world map");
    }

    // ── queries ──────────────────────────────────────────────────────────────

    pub fn get(&self, name: &str) -> MemoryResult<&WorldObject> {
        self.objects
            .get(name)
            .ok_or_else(|| MemoryError::NotFound(format!("world object {name}")))
    }

    /// Active objects within `radius` of `position`, nearest first.
    pub fn query_near_position(
        &self,
        position: Vec3,
        radius: f64,
        kind: Option<ObjectKind>,
    ) -> Vec<WorldObject> {
        let mut query = NearQuery::new(position, radius);
        query.kind = kind;
        self.query_near_position_with(&query)
            .into_iter()
            .map(|hit| hit.object)
            .collect()
    }

    /// Proximity query with explicit filters.
    ///
    /// Results are ordered by ascending distance, then by name.
    pub fn query_near_position_with(&self, query: &NearQuery) -> Vec<SpatialHit> {
        let mut hits: Vec<SpatialHit> = self
            .grid
            .candidates(query.position, query.radius)
            .into_iter()
            .filter_map(|name| self.objects.get(name))
            .filter(|obj| query.status.accepts(obj.status))
            .filter(|obj| query.kind.is_none_or(|k| obj.kind == k))
            .filter_map(|obj| {
                let staleness = obj.staleness(self.current_tick);
                if query.max_staleness.is_some_and(|max| staleness > max) {
                    return None;
                }
                let distance = obj.distance_to(query.position);
                (distance <= query.radius).then(|| SpatialHit {
                    object: obj.clone(),
                    distance,
                    staleness,
                })
            })
            .collect();
        hits.sort_by(by_distance_then_name);
        hits
    }

    /// Active objects of `kind`, sorted by name.
    pub fn query_by_kind(&self, kind: ObjectKind) -> Vec<WorldObject> {
        self.query_by_kind_with(kind, StatusFilter::ActiveOnly)
    }

    pub fn query_by_kind_with(&self, kind: ObjectKind, status: StatusFilter) -> Vec<WorldObject> {
        self.query_by_subtype(kind, None, status)
    }

    /// Objects of `kind` whose `subtype` attribute equals `subtype`, sorted
    /// by name. `None` matches any subtype.
    pub fn query_by_subtype(
        &self,
        kind: ObjectKind,
        subtype: Option<&str>,
        status: StatusFilter,
    ) -> Vec<WorldObject> {
        let mut found: Vec<WorldObject> = self
            .objects
            .values()
            .filter(|o| o.kind == kind && status.accepts(o.status))
            .filter(|o| {
                subtype.is_none_or(|want| {
                    o.attributes.get(SUBTYPE_KEY).and_then(|v| v.as_str()) == Some(want)
                })
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// Every known object, sorted by name.
    pub fn all_objects(&self) -> Vec<&WorldObject> {
        let mut all: Vec<&WorldObject> = self.objects.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Objects unseen for more than the configured stale threshold, sorted
    /// by name.
    pub fn stale_objects(&self) -> Vec<&WorldObject> {
        let mut stale: Vec<&WorldObject> = self
            .objects
            .values()
            .filter(|o| o.staleness(self.current_tick) > self.config.stale_threshold)
            .collect();
        stale.sort_by(|a, b| a.name.cmp(&b.name));
        stale
    }

    /// Compact, deterministic rendering of the active objects grouped by
    /// kind.
    pub fn summarize(&self) -> String {
        let active = self.objects.values().filter(|o| o.is_active()).count();
        let mut lines = vec![format!(
            "World map at tick {}: {} objects known, {} active",
            self.current_tick,
            self.objects.len(),
            active
        )];

        let limit = self.config.summary_per_kind_limit;
        for kind in ObjectKind::ALL {
            let objects = self.query_by_kind(kind);
            if objects.is_empty() {
                continue;
            }
            let listed: Vec<String> = objects
                .iter()
                .take(limit)
                .map(|o| {
                    let staleness = o.staleness(self.current_tick);
                    if staleness == 0 {
                        format!("{} at {}", o.name, o.position)
                    } else {
                        format!("{} at {} (seen {} ticks ago)", o.name, o.position, staleness)
                    }
                })
                .collect();
            let more = if objects.len() > limit {
                format!(" (+{} more)", objects.len() - limit)
            } else {
                String::new()
            };
            lines.push(format!("{}: {}{}", kind_heading(kind), listed.join(", "), more));
        }

        let stale = self.stale_objects().len();
        if stale > 0 {
            lines.push(format!(
                "Stale objects (not seen in >{} ticks): {}",
                self.config.stale_threshold, stale
            ));
        }
        lines.join("\n")
    }

    // ── experiences ──────────────────────────────────────────────────────────

    /// Append a significant event to the experience log.
    ///
    /// A collision naming an object also registers that object as an
    /// obstacle at the event position.
    pub fn record_experience(&mut self, event: ExperienceEvent) {
        self.current_tick = self.current_tick.max(event.tick);
        if event.kind == ExperienceKind::Collision
            && let Some(name) = &event.object_name
        {
            let mut attributes = Metadata::new();
            attributes.insert(SUBTYPE_KEY.into(), json!("collision"));
            let obstacle = WorldObject {
                name: name.clone(),
                kind: ObjectKind::Other,
                position: event.position,
                status: ObjectStatus::Active,
                last_seen_tick: event.tick,
                attributes,
            };
            self.upsert(obstacle, &mut UpdateReport::default());
        }

        self.experiences.push_back(event);
        while self.experiences.len() > self.config.max_experiences {
            self.experiences.pop_front();
        }
        debug!(total = self.experiences.len(), "recorded experience");
    }

    /// Up to `limit` most recent experiences, oldest of them first.
    pub fn recent_experiences(&self, limit: usize) -> Vec<&ExperienceEvent> {
        let skip = self.experiences.len().saturating_sub(limit);
        self.experiences.iter().skip(skip).collect()
    }

    pub fn clear_experiences(&mut self) {
        self.experiences.clear();
        debug!("cleared experience log");
    }

    // ── inspection ───────────────────────────────────────────────────────────

    pub fn dump(&self) -> WorldMapSnapshot {
        let count = |status: ObjectStatus| self.objects.values().filter(|o| o.status == status).count();
        WorldMapSnapshot {
            stats: SnapshotStats {
                total_objects: self.objects.len(),
                active_objects: count(ObjectStatus::Active),
                collected_objects: count(ObjectStatus::Collected),
                destroyed_objects: count(ObjectStatus::Destroyed),
                stale_objects: self.stale_objects().len(),
                experience_count: self.experiences.len(),
                occupied_cells: self.grid.occupied_cells(),
                current_tick: self.current_tick,
            },
            cell_size: self.grid.cell_size(),
            objects: self.all_objects().into_iter().cloned().collect(),
            experiences: self.experiences.iter().cloned().collect(),
        }
    }

    /// Check that the grid and the object table agree.
    ///
    /// # Errors
    ///
    /// [`MemoryError::CorruptState`] naming the first inconsistency found.
    pub fn verify_index(&self) -> MemoryResult<()> {
        for obj in self.objects.values() {
            let key = self.grid.key_for(obj.position);
            let present = self
                .grid
                .names_in(key)
                .is_some_and(|names| names.contains(&obj.name));
            if !present {
                return Err(MemoryError::CorruptState(format!(
                    "{} missing from grid cell {key:?}",
                    obj.name
                )));
            }
        }
        for (key, name) in self.grid.entries() {
            match self.objects.get(name) {
                None => {
                    return Err(MemoryError::CorruptState(format!(
                        "orphaned grid entry {name} in cell {key:?}"
                    )));
                }
                Some(obj) if self.grid.key_for(obj.position) != key => {
                    return Err(MemoryError::CorruptState(format!(
                        "{name} listed in cell {key:?} but positioned elsewhere"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
