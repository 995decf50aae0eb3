//! `arena-spatial` – the agent's structured world map.
//!
//! Tracks discrete world objects by name, position and lifecycle status and
//! answers exact, deterministic proximity and kind queries. This crate is
//! deliberately independent of `arena-memory`: nothing here is embedded or
//! ranked by similarity.
//!
//! # Modules
//!
//! - [`grid`] – [`SpatialGrid`][grid::SpatialGrid]: spatial hash of object
//!   names keyed by horizontal cell.
//! - [`world_map`] – [`WorldMap`][world_map::WorldMap]: object table, grid
//!   index and experience log updated together.

pub mod grid;
pub mod world_map;

pub use grid::{CellKey, SpatialGrid};
pub use world_map::{
    NearQuery, SUBTYPE_KEY, SpatialHit, StatusFilter, UpdateReport, WorldMap, WorldMapConfig,
    WorldMapSnapshot,
};
