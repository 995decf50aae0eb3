//! [`LlmSummarizer`]: history compaction through an OpenAI-compatible
//! `/v1/chat/completions` endpoint, such as a local
//! [Ollama](https://ollama.com) server.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use arena_memory::compacting::Summarizer;
//! use arena_runtime::llm_summarizer::LlmSummarizer;
//!
//! let summarizer = LlmSummarizer::new("http://localhost:11434", "llama3", None, Duration::from_secs(30)).unwrap();
//! // Requires a running model server.
//! let digest = summarizer.summarize(&["Tick 1: found berries".into()]).unwrap();
//! println!("{digest}");
//! ```

use std::sync::Arc;
use std::time::Duration;

use arena_memory::compacting::Summarizer;
use arena_types::{MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::SummarizerConfig;

/// System prompt sent with every compaction request.
pub const SUMMARY_INSTRUCTIONS: &str = "\
Summarize the following agent observations into a concise narrative.
Focus on: significant events, discoveries, state changes, and patterns.
Be brief but preserve important details.";

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum LlmError {
    /// The HTTP request to the model server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response from the model server could not be used.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

impl From<LlmError> for MemoryError {
    fn from(e: LlmError) -> Self {
        MemoryError::Summarizer(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmSummarizer
// ─────────────────────────────────────────────────────────────────────────────

/// Blocking chat-completions client. One instance can serve every agent.
#[derive(Clone)]
pub struct LlmSummarizer {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for LlmSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSummarizer")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field(
                "api_key",
                if self.api_key.is_some() { &"<redacted>" } else { &"<not set>" },
            )
            .finish()
    }
}

impl LlmSummarizer {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, model, api_key, client))
    }

    pub fn with_client(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        client: reqwest::blocking::Client,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        }
    }

    /// Send `messages` and return the assistant's reply text.
    ///
    /// # Errors
    ///
    /// [`LlmError::Http`] if the request fails, [`LlmError::BadResponse`] if
    /// the reply has no choices.
    pub fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: ChatResponse = request.send()?.error_for_status()?.json()?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("empty choices array".into()))
    }
}

impl Summarizer for LlmSummarizer {
    fn summarize(&self, texts: &[String]) -> MemoryResult<String> {
        if texts.is_empty() {
            return Ok(String::new());
        }
        let messages = [
            ChatMessage {
                role: Role::System,
                content: SUMMARY_INSTRUCTIONS.to_string(),
            },
            ChatMessage {
                role: Role::User,
                content: texts.join("\n"),
            },
        ];
        let reply = self.complete(&messages)?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(LlmError::BadResponse("empty summary".into()).into());
        }
        debug!(model = %self.model, inputs = texts.len(), chars = reply.len(), "summarized history");
        Ok(reply.to_string())
    }
}

/// A summarizer when `cfg.enabled`, otherwise `None`.
pub fn summarizer_from_config(cfg: &SummarizerConfig) -> Result<Option<Arc<dyn Summarizer>>, LlmError> {
    if !cfg.enabled {
        return Ok(None);
    }
    let api_key = Some(cfg.api_key.clone()).filter(|k| !k.is_empty());
    let summarizer = LlmSummarizer::new(
        cfg.url.clone(),
        cfg.model.clone(),
        api_key,
        Duration::from_secs(cfg.timeout_secs),
    )?;
    let summarizer: Arc<dyn Summarizer> = Arc::new(summarizer);
    Ok(Some(summarizer))
}
