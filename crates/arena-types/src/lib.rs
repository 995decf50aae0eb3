//! `arena-types` – shared vocabulary of the Arena memory engine.
//!
//! Holds the observation records produced by the simulation once per tick,
//! the [`WorldObject`] records tracked by the spatial world map, and the
//! [`MemoryError`] taxonomy shared by every memory layer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Free-form key/value attributes attached to records and world objects.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Result alias used throughout the memory layers.
pub type MemoryResult<T> = Result<T, MemoryError>;

// ─────────────────────────────────────────────────────────────────────────────
// Vec3
// ─────────────────────────────────────────────────────────────────────────────

/// A position in world space. `y` is the vertical axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl From<(f64, f64, f64)> for Vec3 {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Self::new(x, y, z)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Object classification
// ─────────────────────────────────────────────────────────────────────────────

/// Broad category of a world object.
///
/// Unknown kinds reported by the simulation deserialize as [`ObjectKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Resource,
    Hazard,
    Station,
    Agent,
    #[serde(other)]
    Other,
}

impl ObjectKind {
    /// Every kind, in rendering order.
    pub const ALL: [ObjectKind; 5] = [
        ObjectKind::Resource,
        ObjectKind::Hazard,
        ObjectKind::Station,
        ObjectKind::Agent,
        ObjectKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Resource => "resource",
            ObjectKind::Hazard => "hazard",
            ObjectKind::Station => "station",
            ObjectKind::Agent => "agent",
            ObjectKind::Other => "other",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resource" => Ok(ObjectKind::Resource),
            "hazard" => Ok(ObjectKind::Hazard),
            "station" => Ok(ObjectKind::Station),
            "agent" => Ok(ObjectKind::Agent),
            "other" => Ok(ObjectKind::Other),
            other => Err(MemoryError::InvalidConfig(format!("unknown object kind: {other}"))),
        }
    }
}

/// Lifecycle status of a world object.
///
/// `Collected` and `Destroyed` are terminal: the record is retained but
/// excluded from default queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStatus {
    #[default]
    Active,
    Collected,
    Destroyed,
}

impl ObjectStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ObjectStatus::Active)
    }
}

impl fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectStatus::Active => "active",
            ObjectStatus::Collected => "collected",
            ObjectStatus::Destroyed => "destroyed",
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Observation
// ─────────────────────────────────────────────────────────────────────────────

/// An object inside the agent's sensor range during one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VisibleObject {
    /// Unique name of the object within the world (e.g. `"Berry1"`).
    pub name: String,
    pub kind: ObjectKind,
    pub position: Vec3,
    /// Distance from the agent when observed.
    pub distance: f64,
    #[serde(default)]
    pub attributes: Metadata,
}

/// An item held by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InventoryItem {
    pub name: String,
    pub quantity: u32,
}

/// What the agent receives from the simulation each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Observation {
    pub agent_id: String,
    pub tick: u64,
    pub position: Vec3,
    pub health: f64,
    pub energy: f64,
    /// Objects currently inside sensor range.
    #[serde(default)]
    pub visible: Vec<VisibleObject>,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
}

impl Observation {
    /// An observation with full health and energy and nothing in view.
    pub fn new(agent_id: impl Into<String>, tick: u64, position: Vec3) -> Self {
        Self {
            agent_id: agent_id.into(),
            tick,
            position,
            health: 100.0,
            energy: 100.0,
            visible: Vec::new(),
            inventory: Vec::new(),
        }
    }

    /// Builder-style helper appending a visible object.
    pub fn with_visible(
        mut self,
        name: impl Into<String>,
        kind: ObjectKind,
        position: Vec3,
    ) -> Self {
        let distance = self.position.distance_to(position);
        self.visible.push(VisibleObject {
            name: name.into(),
            kind,
            position,
            distance,
            attributes: Metadata::new(),
        });
        self
    }

    /// Visible objects of the given kind, in reported order.
    pub fn visible_of_kind(&self, kind: ObjectKind) -> impl Iterator<Item = &VisibleObject> {
        self.visible.iter().filter(move |v| v.kind == kind)
    }
}

/// JSON Schema of [`Observation`], published to the simulation collaborator.
pub fn observation_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(Observation)).unwrap_or(serde_json::Value::Null)
}

// ─────────────────────────────────────────────────────────────────────────────
// WorldObject
// ─────────────────────────────────────────────────────────────────────────────

/// Structured knowledge about one named object in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldObject {
    pub name: String,
    pub kind: ObjectKind,
    /// Last known position.
    pub position: Vec3,
    pub status: ObjectStatus,
    /// Tick of the most recent direct observation. Never decreases.
    pub last_seen_tick: u64,
    pub attributes: Metadata,
}

impl WorldObject {
    /// Create an active object first seen at `tick`.
    pub fn from_visible(visible: &VisibleObject, tick: u64) -> Self {
        Self {
            name: visible.name.clone(),
            kind: visible.kind,
            position: visible.position,
            status: ObjectStatus::Active,
            last_seen_tick: tick,
            attributes: visible.attributes.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ObjectStatus::Active
    }

    pub fn distance_to(&self, position: Vec3) -> f64 {
        self.position.distance_to(position)
    }

    /// Ticks elapsed since this object was last confirmed by observation.
    pub fn staleness(&self, current_tick: u64) -> u64 {
        current_tick.saturating_sub(self.last_seen_tick)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Experiences
// ─────────────────────────────────────────────────────────────────────────────

/// Category of a significant event the agent went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceKind {
    Collision,
    Damage,
    Collection,
    Discovery,
    Other,
}

impl ExperienceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceKind::Collision => "collision",
            ExperienceKind::Damage => "damage",
            ExperienceKind::Collection => "collection",
            ExperienceKind::Discovery => "discovery",
            ExperienceKind::Other => "other",
        }
    }
}

impl fmt::Display for ExperienceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A significant event, kept alongside the world map for decision context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEvent {
    pub tick: u64,
    pub kind: ExperienceKind,
    pub description: String,
    pub position: Vec3,
    /// Object involved, if any (e.g. the obstacle collided with).
    #[serde(default)]
    pub object_name: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error taxonomy shared by the vector store, object memory, world map and
/// histories.
///
/// Empty results are never errors: no nearby objects or no similar memories
/// is an empty list.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemoryError {
    /// Unknown id or name on a direct lookup.
    #[error("not found: {0}")]
    NotFound(String),

    /// A persisted file is unreadable, version-mismatched or dimension-mismatched.
    #[error("corrupt state: {0}")]
    CorruptState(String),

    #[error("capacity exceeded: store holds at most {capacity} records")]
    CapacityExceeded { capacity: usize },

    /// A converter failed while mapping an object to or from its stored form.
    #[error("converter error: {0}")]
    Converter(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("summarizer failed: {0}")]
    Summarizer(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_distance() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 0.0, 4.0);
        assert!((a.distance_to(b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn vec3_display_is_one_decimal() {
        assert_eq!(Vec3::new(1.0, 0.3, -2.0).to_string(), "(1.0, 0.3, -2.0)");
    }

    #[test]
    fn object_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ObjectKind::Resource).unwrap();
        assert_eq!(json, "\"resource\"");
    }

    #[test]
    fn unknown_object_kind_deserializes_as_other() {
        let kind: ObjectKind = serde_json::from_str("\"tree\"").unwrap();
        assert_eq!(kind, ObjectKind::Other);
    }

    #[test]
    fn object_kind_from_str() {
        assert_eq!("Hazard".parse::<ObjectKind>().unwrap(), ObjectKind::Hazard);
        assert!("tree".parse::<ObjectKind>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!ObjectStatus::Active.is_terminal());
        assert!(ObjectStatus::Collected.is_terminal());
        assert!(ObjectStatus::Destroyed.is_terminal());
    }

    #[test]
    fn observation_parses_with_defaults() {
        let raw = r#"{
            "agent_id": "forager",
            "tick": 3,
            "position": {"x": 1.0, "y": 0.0, "z": 2.0},
            "health": 90.0,
            "energy": 75.0,
            "visible": [
                {"name": "Berry1", "kind": "resource",
                 "position": {"x": 2.0, "y": 0.0, "z": 2.0}, "distance": 1.0}
            ]
        }"#;
        let obs: Observation = serde_json::from_str(raw).unwrap();
        assert_eq!(obs.tick, 3);
        assert_eq!(obs.visible.len(), 1);
        assert!(obs.visible[0].attributes.is_empty());
        assert!(obs.inventory.is_empty());
    }

    #[test]
    fn with_visible_computes_distance() {
        let obs = Observation::new("a", 1, Vec3::new(0.0, 0.0, 0.0))
            .with_visible("Rock", ObjectKind::Other, Vec3::new(0.0, 0.0, 2.0));
        assert!((obs.visible[0].distance - 2.0).abs() < 1e-12);
        assert_eq!(obs.visible_of_kind(ObjectKind::Other).count(), 1);
        assert_eq!(obs.visible_of_kind(ObjectKind::Hazard).count(), 0);
    }

    #[test]
    fn world_object_staleness_saturates() {
        let visible = VisibleObject {
            name: "Fire".into(),
            kind: ObjectKind::Hazard,
            position: Vec3::default(),
            distance: 0.0,
            attributes: Metadata::new(),
        };
        let obj = WorldObject::from_visible(&visible, 10);
        assert_eq!(obj.staleness(25), 15);
        assert_eq!(obj.staleness(5), 0);
        assert!(obj.is_active());
    }

    #[test]
    fn observation_schema_lists_fields() {
        let schema = observation_schema().to_string();
        assert!(schema.contains("agent_id"));
        assert!(schema.contains("visible"));
        assert!(schema.contains("VisibleObject"));
    }

    #[test]
    fn memory_error_display() {
        let err = MemoryError::DimensionMismatch { expected: 768, actual: 384 };
        assert!(err.to_string().contains("768"));
        let err = MemoryError::NotFound("Berry1".into());
        assert!(err.to_string().contains("Berry1"));
    }
}
