use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LoreError, Result};

/// Top-level configuration for gitlore.
///
/// Loaded from `~/.gitlore/config.toml` by default. Each section configures
/// one component; missing sections and fields fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoreConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

impl LoreConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LoreConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimensions == 0 {
            return Err(LoreError::Config(
                "embedding.dimensions must be greater than 0".into(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(LoreError::Config(
                "embedding.batch_size must be greater than 0".into(),
            ));
        }
        if self.embedding.max_in_flight == 0 {
            return Err(LoreError::Config(
                "embedding.max_in_flight must be greater than 0".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.store.similarity_floor) {
            return Err(LoreError::Config(format!(
                "store.similarity_floor must be within [-1, 1], got {}",
                self.store.similarity_floor
            )));
        }
        if self.store.scan_page_size == 0 {
            return Err(LoreError::Config(
                "store.scan_page_size must be greater than 0".into(),
            ));
        }
        if self.analysis.default_clusters == 0 {
            return Err(LoreError::Config(
                "analysis.default_clusters must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Path of the SQLite database inside the data directory.
    pub fn database_path(&self) -> PathBuf {
        expand_home(&self.general.data_dir).join(&self.store.database_file)
    }
}

/// Default config file location: `~/.gitlore/config.toml`.
pub fn default_config_path() -> PathBuf {
    expand_home("~/.gitlore/config.toml")
}

/// Expand a leading `~` using `HOME` (or `USERPROFILE` on Windows).
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~") {
        let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
        if let Some(home) = home {
            return PathBuf::from(home).join(rest.trim_start_matches(['/', '\\']));
        }
    }
    PathBuf::from(path)
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.gitlore/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Embedding provider and manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider: "hashing" (local, deterministic) or "openai".
    pub provider: String,
    /// Model identifier; part of the index version.
    pub model: String,
    /// Vector dimension; part of the index version.
    pub dimensions: usize,
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Maximum texts per provider call.
    pub batch_size: usize,
    /// Maximum concurrent provider calls during batch embedding.
    pub max_in_flight: usize,
    /// Minimum delay between two provider calls.
    pub min_call_interval_ms: u64,
    /// Wait before the single retry of a failed call.
    pub retry_backoff_ms: u64,
    /// Truncation length applied to the retried input.
    pub safety_max_chars: usize,
    /// Per-call provider timeout.
    pub request_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            model: "hashing-v1".to_string(),
            dimensions: 256,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            batch_size: 100,
            max_in_flight: 4,
            min_call_interval_ms: 100,
            retry_backoff_ms: 1000,
            safety_max_chars: 8000,
            request_timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn min_call_interval(&self) -> Duration {
        Duration::from_millis(self.min_call_interval_ms)
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend: "sqlite" or "memory".
    pub backend: String,
    /// Database file name inside the data directory.
    pub database_file: String,
    /// Similarity results must be strictly above this value.
    pub similarity_floor: f64,
    /// Page size for corpus scans.
    pub scan_page_size: usize,
    /// Maximum entities fed to clustering.
    pub max_cluster_corpus: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            database_file: "gitlore.db".to_string(),
            similarity_floor: 0.3,
            scan_page_size: 500,
            max_cluster_corpus: 500,
        }
    }
}

/// Clustering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub default_clusters: usize,
    /// Representative members reported per cluster.
    pub cluster_samples: usize,
    pub clustering_seed: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_clusters: 5,
            cluster_samples: 5,
            clustering_seed: 42,
        }
    }
}

/// Query routing and handler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub semantic_top_k: usize,
    pub general_top_k: usize,
    /// Whether the general handler asks a narrator for prose.
    pub narrative_enabled: bool,
    pub narrative_model: String,
    /// Maximum items passed to the narrator.
    pub narrative_max_items: usize,
    /// Optional graph analytics snapshot (JSON) used by impact queries.
    pub graph_snapshot: Option<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            semantic_top_k: 10,
            general_top_k: 5,
            narrative_enabled: false,
            narrative_model: "gpt-4o-mini".to_string(),
            narrative_max_items: 50,
            graph_snapshot: None,
        }
    }
}
