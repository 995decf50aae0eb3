//! Engine configuration, read from and written to `~/.arena/config.toml`.
//!
//! Every field has a default, so an empty file (or a file holding only the
//! sections a deployment cares about) is valid:
//!
//! ```toml
//! [vector_store]
//! metric = "cosine"
//! index = { type = "ivf", nlist = 16, nprobe = 4 }
//!
//! [world_map]
//! cell_size = 10.0
//! stale_threshold = 100
//!
//! [embedder]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dimension = 768
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use arena_memory::compacting::CompactingConfig;
use arena_memory::embedder::EMBEDDING_DIM_384;
use arena_memory::episodic::EpisodicConfig;
use arena_memory::store::VectorStoreConfig;
use arena_spatial::world_map::WorldMapConfig;
use serde::{Deserialize, Serialize};

/// Where embeddings come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderProvider {
    /// Deterministic in-process feature hashing; no model server needed.
    #[default]
    Hash,
    Ollama,
    /// In-process sentence embeddings; needs the `local-embeddings` feature.
    Local,
}

impl std::fmt::Display for EmbedderProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedderProvider::Hash => write!(f, "hash"),
            EmbedderProvider::Ollama => write!(f, "ollama"),
            EmbedderProvider::Local => write!(f, "local"),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_embed_dimension() -> usize {
    EMBEDDING_DIM_384
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_summary_model() -> String {
    "llama3".to_string()
}
fn default_history_window() -> usize {
    10
}
fn default_nearby_radius() -> f64 {
    30.0
}
fn default_context_experiences() -> usize {
    5
}
fn default_context_history() -> usize {
    5
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedderConfig {
    #[serde(default)]
    pub provider: EmbedderProvider,
    /// Base URL of the Ollama instance.
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_embed_model")]
    pub model: String,
    /// Vector length the model produces.
    #[serde(default = "default_embed_dimension")]
    pub dimension: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderProvider::default(),
            url: default_ollama_url(),
            model: default_embed_model(),
            dimension: default_embed_dimension(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// OpenAI-compatible chat endpoint used to compact long histories.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Without a summarizer, histories stay bounded but are never compacted.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_summary_model")]
    pub model: String,
    /// Bearer token (stored as plain text; the file is written owner-only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_ollama_url(),
            model: default_summary_model(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for SummarizerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizerConfig")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("model", &self.model)
            .field(
                "api_key",
                if self.api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EpisodicSection {
    #[serde(flatten)]
    pub memory: EpisodicConfig,
    /// SQLite file episodes are loaded from at startup and saved to at the
    /// end of every episode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySection {
    /// Observations kept by the bounded short-term history.
    #[serde(default = "default_history_window")]
    pub window: usize,
    /// Compacting history tunables; only used with a summarizer.
    #[serde(default)]
    pub compaction: CompactingConfig,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            window: default_history_window(),
            compaction: CompactingConfig::default(),
        }
    }
}

/// How much of each layer goes into a decision context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSection {
    /// Radius of the "nearby objects" query around the agent.
    #[serde(default = "default_nearby_radius")]
    pub nearby_radius: f64,
    #[serde(default = "default_context_experiences")]
    pub experiences: usize,
    /// Recent observations rendered from the bounded history.
    #[serde(default = "default_context_history")]
    pub history: usize,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            nearby_radius: default_nearby_radius(),
            experiences: default_context_experiences(),
            history: default_context_history(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

/// Persisted configuration stored in `~/.arena/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub world_map: WorldMapConfig,
    #[serde(default)]
    pub episodic: EpisodicSection,
    #[serde(default)]
    pub history: HistorySection,
    #[serde(default)]
    pub context: ContextSection,
    #[serde(default)]
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
}

/// Return the path to `~/.arena/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".arena").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path, then apply `ARENA_*` overrides.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg = parse(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Parse TOML text without touching the environment.
pub fn parse(raw: &str) -> Result<Config, String> {
    toml::from_str(raw).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `ARENA_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ARENA_OLLAMA_URL` | `embedder.url` |
/// | `ARENA_EMBED_MODEL` | `embedder.model` |
/// | `ARENA_EMBED_DIM` | `embedder.dimension` |
/// | `ARENA_CELL_SIZE` | `world_map.cell_size` |
/// | `ARENA_STALE_THRESHOLD` | `world_map.stale_threshold` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

/// [`apply_env_overrides`] with an arbitrary variable source.
pub fn apply_overrides_from(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("ARENA_OLLAMA_URL") {
        cfg.embedder.url = v;
    }
    if let Some(v) = lookup("ARENA_EMBED_MODEL") {
        cfg.embedder.model = v;
    }
    if let Some(v) = lookup("ARENA_EMBED_DIM")
        && let Ok(dim) = v.parse::<usize>()
        && dim > 0
    {
        cfg.embedder.dimension = dim;
    }
    if let Some(v) = lookup("ARENA_CELL_SIZE")
        && let Ok(size) = v.parse::<f64>()
        && size.is_finite()
        && size > 0.0
    {
        cfg.world_map.cell_size = size;
    }
    if let Some(v) = lookup("ARENA_STALE_THRESHOLD")
        && let Ok(ticks) = v.parse::<u64>()
    {
        cfg.world_map.stale_threshold = ticks;
    }
}

/// Save the config to disk, creating `~/.arena/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner-only directory (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner-only file (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
