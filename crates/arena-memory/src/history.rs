//! Bounded History.
//!
//! A fixed-capacity FIFO of raw entries with no indexing. Pushing onto a
//! full history evicts the oldest entry; the most recent `n` entries are
//! available in O(n) without any embedding work.

use std::collections::VecDeque;

use arena_types::{MemoryError, MemoryResult, Observation};

/// Renders an entry as one line of plain text for prompts and summaries.
pub trait Narrate {
    fn narrate(&self) -> String;

    /// Simulation tick the entry belongs to, if it has one.
    fn tick(&self) -> Option<u64> {
        None
    }
}

impl Narrate for String {
    fn narrate(&self) -> String {
        self.clone()
    }
}

impl Narrate for Observation {
    fn narrate(&self) -> String {
        let mut line = format!(
            "Tick {}: at {} health {:.0} energy {:.0}",
            self.tick, self.position, self.health, self.energy
        );
        if self.visible.is_empty() {
            line.push_str("; sees nothing");
        } else {
            let seen: Vec<String> = self
                .visible
                .iter()
                .map(|v| format!("{} ({}, {:.1} away)", v.name, v.kind, v.distance))
                .collect();
            line.push_str("; sees ");
            line.push_str(&seen.join(", "));
        }
        if !self.inventory.is_empty() {
            let items: Vec<String> = self
                .inventory
                .iter()
                .map(|i| format!("{} x{}", i.name, i.quantity))
                .collect();
            line.push_str("; carrying ");
            line.push_str(&items.join(", "));
        }
        line
    }

    fn tick(&self) -> Option<u64> {
        Some(self.tick)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BoundedHistory
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    /// # Errors
    ///
    /// [`MemoryError::InvalidConfig`] when `capacity` is zero.
    pub fn new(capacity: usize) -> MemoryResult<Self> {
        if capacity == 0 {
            return Err(MemoryError::InvalidConfig(
                "history capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Append `entry`, returning the evicted oldest entry when full.
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Up to `n` most recent entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<&T> {
        self.entries.iter().rev().take(n).collect()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: Narrate> BoundedHistory<T> {
    /// The `n` most recent entries as text, oldest of them first.
    pub fn summarize(&self, n: usize) -> String {
        if self.entries.is_empty() {
            return "No observations in memory.".to_string();
        }
        let skip = self.entries.len().saturating_sub(n);
        let lines: Vec<String> = self
            .entries
            .iter()
            .skip(skip)
            .map(|e| format!("- {}", e.narrate()))
            .collect();
        format!("Recent history ({} entries):\n{}", lines.len(), lines.join("\n"))
    }
}
