//! Compacting History.
//!
//! Behaves like [`BoundedHistory`](crate::history::BoundedHistory) until the
//! buffer holds `trigger` entries. At that point the oldest entries are
//! handed to an external [`Summarizer`] and collapsed into a single running
//! summary; only the newest [`CompactingConfig::keep_count`] entries stay
//! raw.
//!
//! | situation                                   | result                                  |
//! |---------------------------------------------|-----------------------------------------|
//! | buffer below `trigger`                      | [`CompactionOutcome::NotNeeded`]         |
//! | summarizer succeeds (after retries)         | [`CompactionOutcome::Compacted`]         |
//! | summarizer fails, buffer below `capacity`   | [`CompactionOutcome::Deferred`], buffer kept intact |
//! | summarizer fails, buffer at `capacity`      | [`CompactionOutcome::FallbackCompacted`] with a local digest |

use std::collections::VecDeque;
use std::sync::Arc;

use arena_types::{MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::history::Narrate;

/// External collaborator turning a list of texts into one summary.
///
/// Shared by every agent in the process, so implementations must tolerate
/// concurrent calls.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, texts: &[String]) -> MemoryResult<String>;
}

impl<S: Summarizer + ?Sized> Summarizer for Arc<S> {
    fn summarize(&self, texts: &[String]) -> MemoryResult<String> {
        (**self).summarize(texts)
    }
}

fn default_capacity() -> usize {
    20
}

fn default_trigger() -> usize {
    15
}

fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactingConfig {
    /// Hard ceiling on raw entries kept in the buffer.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Buffer length at which compaction is attempted.
    #[serde(default = "default_trigger")]
    pub trigger: usize,
    /// Extra summarizer attempts after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for CompactingConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            trigger: default_trigger(),
            max_retries: default_max_retries(),
        }
    }
}

impl CompactingConfig {
    pub fn validate(&self) -> MemoryResult<()> {
        if self.capacity == 0 {
            return Err(MemoryError::InvalidConfig("capacity must be at least 1".into()));
        }
        if self.trigger == 0 || self.trigger > self.capacity {
            return Err(MemoryError::InvalidConfig(format!(
                "trigger must be within 1..={} (got {})",
                self.capacity, self.trigger
            )));
        }
        Ok(())
    }

    /// Raw entries retained after a compaction. Always below `trigger`, so
    /// every compaction removes at least one entry.
    pub fn keep_count(&self) -> usize {
        (self.capacity - self.trigger).min(self.trigger - 1)
    }
}

/// What a [`CompactingHistory::push`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    NotNeeded,
    Compacted { compacted: usize },
    /// The summarizer failed on every attempt; nothing was dropped.
    Deferred { attempts: u32 },
    /// The summarizer failed with the buffer full; a local digest was used.
    FallbackCompacted { compacted: usize },
}

// ─────────────────────────────────────────────────────────────────────────────
// CompactingHistory
// ─────────────────────────────────────────────────────────────────────────────

pub struct CompactingHistory<T> {
    summarizer: Arc<dyn Summarizer>,
    config: CompactingConfig,
    buffer: VecDeque<T>,
    summary: Option<String>,
    total_pushed: u64,
}

impl<T> std::fmt::Debug for CompactingHistory<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompactingHistory")
            .field("config", &self.config)
            .field("buffered", &self.buffer.len())
            .field("has_summary", &self.summary.is_some())
            .field("total_pushed", &self.total_pushed)
            .finish()
    }
}

impl<T: Narrate> CompactingHistory<T> {
    pub fn new(summarizer: Arc<dyn Summarizer>, config: CompactingConfig) -> MemoryResult<Self> {
        config.validate()?;
        Ok(Self {
            summarizer,
            config,
            buffer: VecDeque::with_capacity(config.capacity),
            summary: None,
            total_pushed: 0,
        })
    }

    pub fn config(&self) -> &CompactingConfig {
        &self.config
    }

    /// Append `entry` and compact if the trigger is reached.
    pub fn push(&mut self, entry: T) -> CompactionOutcome {
        self.buffer.push_back(entry);
        self.total_pushed += 1;
        if self.buffer.len() < self.config.trigger {
            return CompactionOutcome::NotNeeded;
        }

        let overflow = self.buffer.len() - self.config.keep_count();
        let input = self.compaction_input(overflow);
        let attempts = self.config.max_retries + 1;
        for attempt in 1..=attempts {
            match self.summarizer.summarize(&input) {
                Ok(summary) => {
                    self.apply(overflow, summary);
                    info!(compacted = overflow, attempt, "compacted history");
                    return CompactionOutcome::Compacted { compacted: overflow };
                }
                Err(e) => warn!(attempt, error = %e, "summarizer failed"),
            }
        }

        if self.buffer.len() >= self.config.capacity {
            let digest = self.fallback_digest(overflow);
            self.apply(overflow, digest);
            warn!(compacted = overflow, "history full, compacted with local digest");
            return CompactionOutcome::FallbackCompacted { compacted: overflow };
        }
        CompactionOutcome::Deferred { attempts }
    }

    fn compaction_input(&self, overflow: usize) -> Vec<String> {
        let mut input = Vec::with_capacity(overflow + 1);
        if let Some(summary) = &self.summary {
            input.push(format!("Previous summary: {summary}"));
        }
        input.extend(self.buffer.iter().take(overflow).map(Narrate::narrate));
        input
    }

    fn fallback_digest(&self, overflow: usize) -> String {
        let first = self.buffer.front();
        let last = self.buffer.get(overflow.saturating_sub(1));
        let range = match (first.and_then(Narrate::tick), last.and_then(Narrate::tick)) {
            (Some(a), Some(b)) => format!("Ticks {a}-{b}"),
            _ => "Earlier entries".to_string(),
        };
        let mut digest = String::new();
        if let Some(summary) = &self.summary {
            digest.push_str(summary);
            digest.push(' ');
        }
        digest.push_str(&format!("{range}: {overflow} entries compacted without summarizer."));
        if let Some(last) = last {
            digest.push_str(&format!(" Last: {}", last.narrate()));
        }
        digest
    }

    fn apply(&mut self, overflow: usize, summary: String) {
        self.buffer.drain(..overflow);
        self.summary = Some(summary);
    }

    /// Up to `n` raw entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<&T> {
        self.buffer.iter().rev().take(n).collect()
    }

    /// The running summary of compacted entries.
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Entries ever pushed, compacted ones included.
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// Raw entries currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.summary.is_none()
    }

    /// Summary plus raw entries, for an LLM context.
    pub fn summarize(&self) -> String {
        let mut lines = Vec::new();
        if let Some(summary) = &self.summary {
            lines.push("=== Compressed Memory Summary ===".to_string());
            lines.push(summary.clone());
            lines.push(String::new());
        }
        if !self.buffer.is_empty() {
            lines.push(format!(
                "=== Recent Observations ({} most recent) ===",
                self.buffer.len()
            ));
            lines.extend(self.buffer.iter().rev().map(|e| format!("- {}", e.narrate())));
        } else if self.summary.is_none() {
            lines.push("No observations in memory.".to_string());
        }
        lines.join("\n")
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.summary = None;
        self.total_pushed = 0;
    }
}
