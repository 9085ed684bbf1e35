use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Preprocessing mode applied to text before it is embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Code,
    Commit,
    General,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Commit => "commit",
            Self::General => "general",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "code" => Some(Self::Code),
            "commit" => Some(Self::Commit),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl Default for ContextType {
    fn default() -> Self {
        Self::General
    }
}

/// Identifies one embedding space: the model that produced a vector and
/// the dimension all of its vectors share.
///
/// Vectors stamped with different versions are never compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexVersion {
    pub model_id: String,
    pub dimensions: usize,
}

impl IndexVersion {
    pub fn new(model_id: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimensions,
        }
    }

    /// True when `vector` has this version's dimension.
    pub fn accepts(&self, vector: &[f32]) -> bool {
        vector.len() == self.dimensions
    }
}

impl fmt::Display for IndexVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.model_id, self.dimensions)
    }
}

/// The kinds of history entities that carry embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Commit,
    Change,
    PullRequest,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Change => "change",
            Self::PullRequest => "pull_request",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "commit" => Some(Self::Commit),
            "change" => Some(Self::Change),
            "pull_request" => Some(Self::PullRequest),
            _ => None,
        }
    }
}

/// Natural key of an embedded entity. Re-storing the same key updates in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityKey {
    Commit { sha: String },
    Change { commit_sha: String, file_path: String },
    PullRequest { number: u64 },
}

impl EntityKey {
    pub fn commit(sha: impl Into<String>) -> Self {
        Self::Commit { sha: sha.into() }
    }

    pub fn change(commit_sha: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self::Change {
            commit_sha: commit_sha.into(),
            file_path: file_path.into(),
        }
    }

    pub fn pull_request(number: u64) -> Self {
        Self::PullRequest { number }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Commit { .. } => EntityKind::Commit,
            Self::Change { .. } => EntityKind::Change,
            Self::PullRequest { .. } => EntityKind::PullRequest,
        }
    }

    /// Stable string id, unique within a kind.
    ///
    /// A change id is `{len}:{commit_sha}:{file_path}` where `len` is the
    /// sha's length in characters, so no (sha, path) pair can collide with
    /// another whatever characters either contains.
    pub fn natural_id(&self) -> String {
        match self {
            Self::Commit { sha } => sha.clone(),
            Self::Change {
                commit_sha,
                file_path,
            } => format!("{}:{}:{}", commit_sha.chars().count(), commit_sha, file_path),
            Self::PullRequest { number } => number.to_string(),
        }
    }

    /// The commit this entity belongs to, for commits and changes.
    pub fn commit_sha(&self) -> Option<&str> {
        match self {
            Self::Commit { sha } => Some(sha),
            Self::Change { commit_sha, .. } => Some(commit_sha),
            Self::PullRequest { .. } => None,
        }
    }

    pub fn file_path(&self) -> Option<&str> {
        match self {
            Self::Change { file_path, .. } => Some(file_path),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.natural_id())
    }
}

/// A commit as supplied by the history miner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    /// Externally classified commit type (feature, bugfix, breaking, ...).
    #[serde(default)]
    pub commit_type: Option<String>,
    #[serde(default)]
    pub insertions: u32,
    #[serde(default)]
    pub deletions: u32,
}

impl Commit {
    /// Text embedded for this commit: message followed by its type tag.
    pub fn embedding_text(&self) -> String {
        format!(
            "{} {}",
            self.message,
            self.commit_type.as_deref().unwrap_or_default()
        )
        .trim_end()
        .to_string()
    }
}

/// One file's edit within a commit, as supplied by the history miner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub commit_sha: String,
    pub file_path: String,
    /// Code after the change (or the diff when no snapshot is available).
    pub after: String,
    /// Code before the change, when known.
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub change_type: Option<String>,
}

/// Attributes stored alongside a change embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeMetadata {
    pub source_text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub change_type: Option<String>,
    /// Cosine similarity between the before and after code.
    #[serde(default)]
    pub semantic_similarity: Option<f64>,
    /// L2 distance between the before and after embeddings.
    #[serde(default)]
    pub change_magnitude: Option<f64>,
    #[serde(default)]
    pub author: Option<String>,
}

/// A pull request as supplied by the history miner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub state: String,
    #[serde(default)]
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    /// Shas of the commits the PR includes.
    #[serde(default)]
    pub commits: Vec<String>,
}

impl PullRequest {
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.title, self.description)
            .trim_end()
            .to_string()
    }
}

/// Any commit, change or pull request together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedEntity {
    pub key: EntityKey,
    pub version: IndexVersion,
    pub context_type: ContextType,
    pub source_text: String,
    pub embedding: Vec<f32>,
    pub timestamp: DateTime<Utc>,
    /// Kind-specific attributes (author, commit type, change type, ...).
    #[serde(default)]
    pub metadata: Value,
}

impl EmbeddedEntity {
    pub fn kind(&self) -> EntityKind {
        self.key.kind()
    }

    fn meta_str(&self, field: &str) -> Option<&str> {
        self.metadata.get(field).and_then(|v| v.as_str())
    }

    pub fn commit_type(&self) -> Option<&str> {
        self.meta_str("commit_type")
    }

    pub fn change_type(&self) -> Option<&str> {
        self.meta_str("change_type")
    }

    pub fn author(&self) -> Option<&str> {
        self.meta_str("author")
    }

    pub fn author_email(&self) -> Option<&str> {
        self.meta_str("author_email")
    }

    /// Commit message for commits, title for pull requests, source text otherwise.
    pub fn headline(&self) -> &str {
        self.meta_str("message")
            .or_else(|| self.meta_str("title"))
            .unwrap_or(&self.source_text)
    }

    /// Copy of this entity without source text or embedding.
    pub fn metadata_only(&self) -> Self {
        Self {
            key: self.key.clone(),
            version: self.version.clone(),
            context_type: self.context_type,
            source_text: String::new(),
            embedding: Vec::new(),
            timestamp: self.timestamp,
            metadata: self.metadata.clone(),
        }
    }

    /// Lines inserted plus lines deleted, when recorded.
    pub fn change_size(&self) -> Option<u64> {
        let ins = self.metadata.get("insertions").and_then(|v| v.as_u64());
        let del = self.metadata.get("deletions").and_then(|v| v.as_u64());
        match (ins, del) {
            (None, None) => None,
            (i, d) => Some(i.unwrap_or(0) + d.unwrap_or(0)),
        }
    }
}

/// Filter for entity scans. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityFilter {
    pub kind: Option<EntityKind>,
    /// Only entities stamped with this version.
    pub version: Option<IndexVersion>,
    /// Only entities NOT stamped with this version.
    pub stale_for: Option<IndexVersion>,
    pub file_path: Option<String>,
    pub commit_sha: Option<String>,
}

impl EntityFilter {
    pub fn kind(kind: EntityKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: &IndexVersion) -> Self {
        self.version = Some(version.clone());
        self
    }

    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_commit_sha(mut self, sha: impl Into<String>) -> Self {
        self.commit_sha = Some(sha.into());
        self
    }

    pub fn matches(&self, entity: &EmbeddedEntity) -> bool {
        if self.kind.is_some_and(|k| k != entity.kind()) {
            return false;
        }
        if self.version.as_ref().is_some_and(|v| *v != entity.version) {
            return false;
        }
        if self.stale_for.as_ref().is_some_and(|v| *v == entity.version) {
            return false;
        }
        if let Some(path) = &self.file_path {
            if entity.key.file_path() != Some(path.as_str()) {
                return false;
            }
        }
        if let Some(sha) = &self.commit_sha {
            if entity.key.commit_sha() != Some(sha.as_str()) {
                return false;
            }
        }
        true
    }
}

/// An item paired with its cosine similarity to some query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored<T> {
    pub item: T,
    pub similarity: f64,
}
