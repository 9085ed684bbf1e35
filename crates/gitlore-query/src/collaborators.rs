//! External collaborators used by query handlers.
//!
//! - [`GraphAnalytics`] answers structural questions (dependents, breaking
//!   changes, hotspots, complexity) that embeddings cannot.
//! - [`Narrator`] turns a list of commits into prose. It is best-effort:
//!   handlers drop the narrative when it fails.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use gitlore_core::config::{EmbeddingConfig, QueryConfig};
use gitlore_core::error::{LoreError, Result};

// ---------------------------------------------------------------------------
// Graph analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakingChange {
    pub commit: String,
    pub message: String,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeHotspot {
    pub file: String,
    pub changes: usize,
    #[serde(default)]
    pub bug_fixes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorHotspot {
    pub file: String,
    pub sole_author: String,
    pub contributions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CouplingHotspot {
    pub file1: String,
    pub file2: String,
    pub co_changes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hotspots {
    pub change_hotspots: Vec<ChangeHotspot>,
    /// Change hotspots with frequent bug fixes.
    pub bug_hotspots: Vec<ChangeHotspot>,
    pub author_hotspots: Vec<AuthorHotspot>,
    pub coupling_hotspots: Vec<CouplingHotspot>,
}

impl Hotspots {
    pub fn is_empty(&self) -> bool {
        self.change_hotspots.is_empty()
            && self.bug_hotspots.is_empty()
            && self.author_hotspots.is_empty()
            && self.coupling_hotspots.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexFile {
    pub file: String,
    pub average_complexity: f64,
    pub max_complexity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexitySummary {
    pub average_file_complexity: f64,
    pub high_complexity_files: Vec<ComplexFile>,
    pub refactoring_candidates: Vec<String>,
}

/// Structural repository facts from an external code graph.
#[async_trait]
pub trait GraphAnalytics: Send + Sync {
    /// Files that depend on `path`.
    async fn dependents_of(&self, path: &str) -> Result<Vec<String>>;

    async fn breaking_changes(&self) -> Result<Vec<BreakingChange>>;

    async fn hotspots(&self) -> Result<Hotspots>;

    async fn complexity(&self) -> Result<ComplexitySummary>;
}

/// Graph analytics for deployments without a code graph: every answer is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGraphAnalytics;

#[async_trait]
impl GraphAnalytics for NoGraphAnalytics {
    async fn dependents_of(&self, _path: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn breaking_changes(&self) -> Result<Vec<BreakingChange>> {
        Ok(Vec::new())
    }

    async fn hotspots(&self) -> Result<Hotspots> {
        Ok(Hotspots::default())
    }

    async fn complexity(&self) -> Result<ComplexitySummary> {
        Ok(ComplexitySummary::default())
    }
}

/// JSON export of a code graph's analytics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSnapshot {
    /// File path to the files depending on it.
    pub dependents: HashMap<String, Vec<String>>,
    pub breaking_changes: Vec<BreakingChange>,
    pub hotspots: Hotspots,
    pub complexity: ComplexitySummary,
}

/// Graph analytics answered from a [`GraphSnapshot`] loaded once.
#[derive(Debug, Clone, Default)]
pub struct SnapshotGraphAnalytics {
    snapshot: GraphSnapshot,
}

impl SnapshotGraphAnalytics {
    pub fn new(snapshot: GraphSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let analytics = Self::from_json(&content)?;
        info!(
            path = %path.display(),
            files = analytics.snapshot.dependents.len(),
            "Graph snapshot loaded"
        );
        Ok(analytics)
    }
}

#[async_trait]
impl GraphAnalytics for SnapshotGraphAnalytics {
    async fn dependents_of(&self, path: &str) -> Result<Vec<String>> {
        Ok(self
            .snapshot
            .dependents
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    async fn breaking_changes(&self) -> Result<Vec<BreakingChange>> {
        Ok(self.snapshot.breaking_changes.clone())
    }

    async fn hotspots(&self) -> Result<Hotspots> {
        Ok(self.snapshot.hotspots.clone())
    }

    async fn complexity(&self) -> Result<ComplexitySummary> {
        Ok(self.snapshot.complexity.clone())
    }
}

// ---------------------------------------------------------------------------
// Narrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub narrative: String,
    #[serde(default)]
    pub key_themes: Vec<String>,
    #[serde(default)]
    pub evolution_summary: String,
}

/// One commit handed to a narrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrativeItem {
    pub message: String,
    pub commit_type: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Produces a prose account of a set of commits.
#[async_trait]
pub trait Narrator: Send + Sync {
    /// Handlers skip narration entirely when this is false.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn narrate(&self, items: &[NarrativeItem]) -> Result<Narrative>;
}

/// Narrator used when narration is turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNarrator;

#[async_trait]
impl Narrator for DisabledNarrator {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn narrate(&self, _items: &[NarrativeItem]) -> Result<Narrative> {
        Err(LoreError::ProviderUnavailable(
            "narration is disabled".to_string(),
        ))
    }
}

const NARRATOR_SYSTEM_PROMPT: &str =
    "You are a software development analyst. Analyze repository evolution and provide insights.";

/// Narrator backed by an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiNarrator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
    max_items: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
    content: Option<String>,
}

impl OpenAiNarrator {
    /// Reuses the embedding endpoint and key; the model and item cap come
    /// from the query config.
    pub fn from_config(embedding: &EmbeddingConfig, query: &QueryConfig) -> Result<Self> {
        let api_key = std::env::var(&embedding.api_key_env).map_err(|_| {
            LoreError::Config(format!(
                "environment variable {} is not set",
                embedding.api_key_env
            ))
        })?;
        Self::new(
            &api_key,
            &embedding.api_base,
            &query.narrative_model,
            embedding.request_timeout(),
            query.narrative_max_items,
        )
    }

    pub fn new(
        api_key: &str,
        api_base: &str,
        model: &str,
        timeout: Duration,
        max_items: usize,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(LoreError::Config("missing narrator API key".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|e| LoreError::Config(format!("invalid API key: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| LoreError::Config(format!("failed to build HTTP client: {}", e)))?;

        let endpoint = format!("{}/chat/completions", api_base.trim_end_matches('/'));
        info!(%endpoint, model, "Narrator configured");

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
            timeout,
            max_items: max_items.max(1),
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> LoreError {
        if err.is_timeout() {
            LoreError::ProviderTimeout {
                after_ms: self.timeout.as_millis() as u64,
            }
        } else {
            LoreError::ProviderUnavailable(err.to_string())
        }
    }
}

#[async_trait]
impl Narrator for OpenAiNarrator {
    async fn narrate(&self, items: &[NarrativeItem]) -> Result<Narrative> {
        let prompt = build_prompt(&items[..items.len().min(self.max_items)]);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: NARRATOR_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: 800,
            temperature: 0.4,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LoreError::ProviderUnavailable(format!(
                "chat request failed ({}): {}",
                status, text
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LoreError::MalformedProviderResponse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LoreError::MalformedProviderResponse("no completion content".into()))?;

        debug!(items = items.len(), "Narrative received");
        Ok(parse_narrative(&content))
    }
}

fn build_prompt(items: &[NarrativeItem]) -> String {
    let lines: Vec<String> = items
        .iter()
        .map(|item| {
            let message: String = item.message.chars().take(100).collect();
            match &item.commit_type {
                Some(t) => format!("- [{}] {}", t, message),
                None => format!("- {}", message),
            }
        })
        .collect();
    format!(
        "Analyze this repository's evolution based on recent commits:\n\n{}\n\n\
         Please provide:\n\
         1. A narrative summary of the repository's evolution\n\
         2. Key themes and patterns in the changes\n\
         3. Overall development direction\n\n\
         Respond in JSON format:\n\
         {{\"narrative\": \"...\", \"key_themes\": [\"...\"], \"evolution_summary\": \"...\"}}",
        lines.join("\n")
    )
}

/// Parse a narrator reply, falling back to the raw text when it is not the
/// requested JSON.
pub fn parse_narrative(content: &str) -> Narrative {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    match serde_json::from_str::<Narrative>(body) {
        Ok(narrative) => narrative,
        Err(e) => {
            warn!(error = %e, "Narrative reply is not JSON; using raw text");
            Narrative {
                narrative: content.to_string(),
                key_themes: vec!["Analysis completed".to_string()],
                evolution_summary: "Repository analysis complete".to_string(),
            }
        }
    }
}
