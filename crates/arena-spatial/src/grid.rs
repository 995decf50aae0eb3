//! Spatial hash over the horizontal plane.
//!
//! Positions are bucketed by `(floor(x / cell_size), floor(z / cell_size))`;
//! the vertical axis is ignored. The grid only stores object *names*. It is
//! derived state owned by [`WorldMap`](crate::world_map::WorldMap), which is
//! the only code allowed to mutate it.
//!
//! # Example
//!
//! ```rust
//! use arena_spatial::grid::{CellKey, SpatialGrid};
//! use arena_types::Vec3;
//!
//! let grid = SpatialGrid::new(10.0).unwrap();
//! assert_eq!(grid.key_for(Vec3::new(-0.5, 3.0, 25.0)), CellKey { x: -1, z: 2 });
//! ```

use std::collections::{BTreeSet, HashMap};

use arena_types::{MemoryError, MemoryResult, Vec3};
use serde::{Deserialize, Serialize};

/// Integer coordinates of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub x: i64,
    pub z: i64,
}

impl CellKey {
    /// The cell containing `position`.
    pub fn containing(position: Vec3, cell_size: f64) -> Self {
        Self {
            x: (position.x / cell_size).floor() as i64,
            z: (position.z / cell_size).floor() as i64,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SpatialGrid
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f64,
    cells: HashMap<CellKey, BTreeSet<String>>,
}

impl SpatialGrid {
    /// # Errors
    ///
    /// [`MemoryError::InvalidConfig`] unless `cell_size` is finite and
    /// positive.
    pub fn new(cell_size: f64) -> MemoryResult<Self> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(MemoryError::InvalidConfig(format!(
                "cell size must be a positive number (got {cell_size})"
            )));
        }
        Ok(Self {
            cell_size,
            cells: HashMap::new(),
        })
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn key_for(&self, position: Vec3) -> CellKey {
        CellKey::containing(position, self.cell_size)
    }

    pub(crate) fn insert(&mut self, name: &str, position: Vec3) -> CellKey {
        let key = self.key_for(position);
        self.cells.entry(key).or_default().insert(name.to_string());
        key
    }

    pub(crate) fn remove(&mut self, name: &str, key: CellKey) -> bool {
        let Some(names) = self.cells.get_mut(&key) else {
            return false;
        };
        let removed = names.remove(name);
        if names.is_empty() {
            self.cells.remove(&key);
        }
        removed
    }

    /// Move `name` between cells. No-op when both keys are equal.
    pub(crate) fn relocate(&mut self, name: &str, from: CellKey, to: CellKey) {
        if from == to {
            return;
        }
        self.remove(name, from);
        self.cells.entry(to).or_default().insert(name.to_string());
    }

    pub(crate) fn clear(&mut self) {
        self.cells.clear();
    }

    /// Inclusive cell range covering the square of half-side `radius`
    /// centred on `center`, padded by one cell on every side.
    ///
    /// `center ± radius` is rounded before flooring, so a position exactly
    /// `radius` away on a cell boundary can key one cell outside the
    /// unpadded range.
    fn key_range(&self, center: Vec3, radius: f64) -> (CellKey, CellKey) {
        let lo = self.key_for(Vec3::new(center.x - radius, center.y, center.z - radius));
        let hi = self.key_for(Vec3::new(center.x + radius, center.y, center.z + radius));
        (
            CellKey {
                x: lo.x.saturating_sub(1),
                z: lo.z.saturating_sub(1),
            },
            CellKey {
                x: hi.x.saturating_add(1),
                z: hi.z.saturating_add(1),
            },
        )
    }

    /// Names stored in cells overlapping the bounding square of side
    /// `2 * radius` around `center`.
    ///
    /// This is a superset of the objects within `radius`; callers filter by
    /// exact distance.
    pub fn candidates(&self, center: Vec3, radius: f64) -> Vec<&str> {
        if radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }
        let (lo, hi) = self.key_range(center, radius);
        let span_x = (i128::from(hi.x) - i128::from(lo.x) + 1).max(0);
        let span_z = (i128::from(hi.z) - i128::from(lo.z) + 1).max(0);
        let box_cells = span_x.saturating_mul(span_z);

        let in_range = |k: &CellKey| k.x >= lo.x && k.x <= hi.x && k.z >= lo.z && k.z <= hi.z;
        let mut out = Vec::new();
        if box_cells > self.cells.len() as i128 {
            // Fewer occupied cells than cells in the box: scan the occupied ones.
            for (key, names) in &self.cells {
                if in_range(key) {
                    out.extend(names.iter().map(String::as_str));
                }
            }
        } else {
            for x in lo.x..=hi.x {
                for z in lo.z..=hi.z {
                    if let Some(names) = self.cells.get(&CellKey { x, z }) {
                        out.extend(names.iter().map(String::as_str));
                    }
                }
            }
        }
        out
    }

    /// Names stored in one cell.
    pub fn names_in(&self, key: CellKey) -> Option<&BTreeSet<String>> {
        self.cells.get(&key)
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Total number of (cell, name) entries.
    pub fn len(&self) -> usize {
        self.cells.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Every (cell, name) entry, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (CellKey, &str)> {
        self.cells
            .iter()
            .flat_map(|(key, names)| names.iter().map(move |n| (*key, n.as_str())))
    }
}
