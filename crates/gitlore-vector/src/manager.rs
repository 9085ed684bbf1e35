//! Embedding manager: caching, preprocessing, batching, retries and the
//! degraded zero-vector fallback around an [`EmbeddingProvider`].
//!
//! [`EmbeddingProvider`]: crate::provider::EmbeddingProvider

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use gitlore_core::config::EmbeddingConfig;
use gitlore_core::error::{LoreError, Result};
use gitlore_core::types::{ContextType, IndexVersion};

use crate::cache::{CacheStats, EmbeddingCache};
use crate::clustering::{ClusteringStrategy, SeededKMeans};
use crate::preprocess::{preprocess, truncate_chars};
use crate::provider::DynEmbeddingProvider;
use crate::similarity::{self, cosine_similarity, l2_distance, l2_norm, mean_vector};

/// Most diffs considered by [`EmbeddingManager::commit_coherence`].
const COHERENCE_MAX_DIFFS: usize = 10;

/// Runtime knobs of the embedding manager.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub batch_size: usize,
    pub max_in_flight: usize,
    pub min_call_interval: Duration,
    pub retry_backoff: Duration,
    pub safety_max_chars: usize,
    pub request_timeout: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&EmbeddingConfig::default())
    }
}

impl From<&EmbeddingConfig> for ManagerSettings {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_in_flight: config.max_in_flight.max(1),
            min_call_interval: config.min_call_interval(),
            retry_backoff: config.retry_backoff(),
            safety_max_chars: config.safety_max_chars,
            request_timeout: config.request_timeout(),
        }
    }
}

/// Enforces a minimum delay between the starts of two provider calls.
#[derive(Debug)]
struct Pacer {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Summary of a set of embeddings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingStatistics {
    pub count: usize,
    pub dimension: usize,
    pub mean_magnitude: f64,
    pub std_magnitude: f64,
    pub cache: CacheStats,
}

/// Coarse size of a code change, from before/after similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeClass {
    MinorChange,
    ModerateChange,
    SignificantChange,
    MajorRefactoring,
}

impl ChangeClass {
    pub fn from_similarity(similarity: f64) -> Self {
        if similarity > 0.95 {
            Self::MinorChange
        } else if similarity > 0.8 {
            Self::ModerateChange
        } else if similarity > 0.5 {
            Self::SignificantChange
        } else {
            Self::MajorRefactoring
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinorChange => "minor_change",
            Self::ModerateChange => "moderate_change",
            Self::SignificantChange => "significant_change",
            Self::MajorRefactoring => "major_refactoring",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeChangeAnalysis {
    pub file_path: String,
    pub semantic_similarity: f64,
    /// L2 distance between the before and after embeddings.
    pub change_magnitude: f64,
    pub change_class: ChangeClass,
    #[serde(skip)]
    pub after_embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitCoherence {
    pub files_changed: usize,
    pub coherence_score: f64,
    pub interpretation: &'static str,
}

pub fn interpret_coherence(score: f64) -> &'static str {
    if score > 0.7 {
        "High coherence: commit message aligns well with code changes"
    } else if score > 0.4 {
        "Moderate coherence: commit message partially reflects code changes"
    } else {
        "Low coherence: commit message may not accurately describe changes"
    }
}

/// A batch input waiting for the provider.
struct Pending<'a> {
    index: usize,
    text: &'a str,
    key: String,
    input: String,
}

/// Converts text into vectors of one [`IndexVersion`].
///
/// Provider failures never escape: a failed call is retried once after a
/// backoff with the input truncated to the safety length, and a second
/// failure yields a zero vector that is returned but not cached.
pub struct EmbeddingManager {
    provider: Arc<dyn DynEmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    clustering: Arc<dyn ClusteringStrategy>,
    settings: ManagerSettings,
    pacer: Pacer,
}

impl EmbeddingManager {
    pub fn new(provider: Arc<dyn DynEmbeddingProvider>, settings: ManagerSettings) -> Self {
        Self::with_cache(provider, settings, Arc::new(EmbeddingCache::new()))
    }

    /// Build a manager sharing an existing cache.
    pub fn with_cache(
        provider: Arc<dyn DynEmbeddingProvider>,
        settings: ManagerSettings,
        cache: Arc<EmbeddingCache>,
    ) -> Self {
        info!(
            model = provider.model_id(),
            dimensions = provider.dimensions(),
            "Embedding manager ready"
        );
        Self {
            pacer: Pacer::new(settings.min_call_interval),
            provider,
            cache,
            clustering: Arc::new(SeededKMeans::default()),
            settings,
        }
    }

    /// Replace the clustering strategy.
    pub fn with_clustering(mut self, strategy: Arc<dyn ClusteringStrategy>) -> Self {
        self.clustering = strategy;
        self
    }

    pub fn version(&self) -> IndexVersion {
        IndexVersion::new(self.provider.model_id(), self.provider.dimensions())
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Embed one text. Empty or whitespace-only text is rejected.
    pub async fn generate_embedding(&self, text: &str, context_type: ContextType) -> Result<Vec<f32>> {
        ensure_text(text)?;

        let key = EmbeddingCache::key(text, context_type, self.provider.model_id());
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        debug!(context = context_type.as_str(), "Embedding cache miss");

        let input = self.provider_input(text, context_type);
        Ok(self.embed_with_fallback(&key, &input).await)
    }

    /// Embed many texts, preserving order and count.
    ///
    /// Uncached texts are sent in chunks of at most `batch_size` (and the
    /// provider's own limit), with up to `max_in_flight` chunks concurrently.
    /// A chunk that fails is re-embedded item by item.
    pub async fn generate_batch_embeddings(
        &self,
        texts: &[String],
        context_type: ContextType,
    ) -> Result<Vec<Vec<f32>>> {
        for text in texts {
            ensure_text(text)?;
        }

        let model_id = self.provider.model_id();
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut pending = Vec::new();
        for (index, text) in texts.iter().enumerate() {
            let key = EmbeddingCache::key(text, context_type, model_id);
            match self.cache.get(&key) {
                Some(hit) => results[index] = Some(hit),
                None => pending.push(Pending {
                    index,
                    text,
                    key,
                    input: self.provider_input(text, context_type),
                }),
            }
        }

        let chunk_size = self
            .settings
            .batch_size
            .min(self.provider.max_batch_size())
            .max(1);
        debug!(
            total = texts.len(),
            uncached = pending.len(),
            chunk_size,
            "Batch embedding"
        );

        let chunk_results: Vec<Vec<(usize, Vec<f32>)>> = stream::iter(pending.chunks(chunk_size))
            .map(|chunk| self.embed_chunk(chunk, context_type))
            .buffered(self.settings.max_in_flight.max(1))
            .collect()
            .await;

        for (index, vector) in chunk_results.into_iter().flatten() {
            results[index] = Some(vector);
        }

        Ok(results
            .into_iter()
            .map(|v| v.unwrap_or_else(|| self.zero_vector()))
            .collect())
    }

    async fn embed_chunk(
        &self,
        chunk: &[Pending<'_>],
        context_type: ContextType,
    ) -> Vec<(usize, Vec<f32>)> {
        let inputs: Vec<String> = chunk.iter().map(|p| p.input.clone()).collect();

        self.pacer.wait().await;
        let outcome = match tokio::time::timeout(
            self.settings.request_timeout,
            self.provider.embed_batch_boxed(&inputs),
        )
        .await
        {
            Ok(result) => result.and_then(|vectors| self.validate_batch(vectors, inputs.len())),
            Err(_) => Err(self.timeout_error()),
        };

        match outcome {
            Ok(vectors) => chunk
                .iter()
                .zip(vectors)
                .map(|(p, v)| (p.index, self.cache.insert_if_absent(p.key.clone(), v)))
                .collect(),
            Err(e) => {
                warn!(
                    error = %e,
                    size = chunk.len(),
                    "Batch chunk failed, falling back to per-item embedding"
                );
                let mut vectors = Vec::with_capacity(chunk.len());
                for p in chunk {
                    let v = match self.generate_embedding(p.text, context_type).await {
                        Ok(v) => v,
                        Err(_) => self.zero_vector(),
                    };
                    vectors.push((p.index, v));
                }
                vectors
            }
        }
    }

    /// Cosine similarity in [-1, 1]; 0 for zero or mismatched vectors.
    pub fn calculate_similarity(&self, a: &[f32], b: &[f32]) -> f64 {
        cosine_similarity(a, b)
    }

    /// Candidates at or above `threshold`, best first, at most `top_k`.
    pub fn find_similar<T: Clone>(
        &self,
        query: &[f32],
        candidates: &[(T, Vec<f32>)],
        top_k: usize,
        threshold: f64,
    ) -> Vec<gitlore_core::types::Scored<T>> {
        similarity::find_similar(query, candidates, top_k, threshold)
    }

    /// Cluster ids per embedding with `k` clipped to the input size.
    pub fn cluster_embeddings(&self, embeddings: &[Vec<f32>], k: usize) -> Vec<usize> {
        self.clustering.assign(embeddings, k)
    }

    pub fn clustering(&self) -> &Arc<dyn ClusteringStrategy> {
        &self.clustering
    }

    pub fn embedding_statistics(&self, embeddings: &[Vec<f32>]) -> EmbeddingStatistics {
        let magnitudes: Vec<f64> = embeddings.iter().map(|e| l2_norm(e)).collect();
        let count = magnitudes.len();
        let (mean, std) = if count == 0 {
            (0.0, 0.0)
        } else {
            let mean = magnitudes.iter().sum::<f64>() / count as f64;
            let var = magnitudes.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / count as f64;
            (mean, var.sqrt())
        };
        EmbeddingStatistics {
            count,
            dimension: embeddings.first().map_or(0, Vec::len),
            mean_magnitude: mean,
            std_magnitude: std,
            cache: self.cache.stats(),
        }
    }

    /// Mean of the code embedding of `diff` and the commit embedding of `message`.
    pub async fn code_summary_embedding(&self, diff: &str, message: &str) -> Result<Vec<f32>> {
        let code = self.generate_embedding(diff, ContextType::Code).await?;
        let commit = self.generate_embedding(message, ContextType::Commit).await?;
        mean_vector(&[code, commit]).ok_or(LoreError::DimensionMismatch {
            expected: self.dimensions(),
            actual: 0,
        })
    }

    pub async fn analyze_code_change(
        &self,
        before: &str,
        after: &str,
        file_path: &str,
    ) -> Result<CodeChangeAnalysis> {
        let before_embedding = self.generate_embedding(before, ContextType::Code).await?;
        let after_embedding = self.generate_embedding(after, ContextType::Code).await?;
        let semantic_similarity = cosine_similarity(&before_embedding, &after_embedding);

        Ok(CodeChangeAnalysis {
            file_path: file_path.to_string(),
            semantic_similarity,
            change_magnitude: l2_distance(&before_embedding, &after_embedding),
            change_class: ChangeClass::from_similarity(semantic_similarity),
            after_embedding,
        })
    }

    /// How well a commit message matches its diffs (first ten considered).
    pub async fn commit_coherence(&self, message: &str, diffs: &[String]) -> Result<CommitCoherence> {
        let commit_embedding = self.generate_embedding(message, ContextType::Commit).await?;

        let mut diff_embeddings = Vec::new();
        for diff in diffs.iter().filter(|d| !d.trim().is_empty()).take(COHERENCE_MAX_DIFFS) {
            diff_embeddings.push(self.generate_embedding(diff, ContextType::Code).await?);
        }

        let coherence_score = mean_vector(&diff_embeddings)
            .map(|mean| cosine_similarity(&commit_embedding, &mean))
            .unwrap_or(0.0);

        Ok(CommitCoherence {
            files_changed: diffs.len(),
            coherence_score,
            interpretation: interpret_coherence(coherence_score),
        })
    }

    fn provider_input(&self, text: &str, context_type: ContextType) -> String {
        let processed = preprocess(text, context_type);
        let processed = if processed.trim().is_empty() {
            text.trim().to_string()
        } else {
            processed
        };
        truncate_chars(&processed, self.provider.max_input_chars()).to_string()
    }

    async fn embed_with_fallback(&self, key: &str, input: &str) -> Vec<f32> {
        match self.call_provider(input).await {
            Ok(v) => return self.cache.insert_if_absent(key.to_string(), v),
            Err(e) => warn!(error = %e, "Embedding failed, retrying with truncated input"),
        }

        tokio::time::sleep(self.settings.retry_backoff).await;
        let truncated = truncate_chars(input, self.settings.safety_max_chars);
        match self.call_provider(truncated).await {
            Ok(v) => self.cache.insert_if_absent(key.to_string(), v),
            Err(e) => {
                warn!(error = %e, "Embedding retry failed, returning zero vector");
                self.zero_vector()
            }
        }
    }

    async fn call_provider(&self, input: &str) -> Result<Vec<f32>> {
        self.pacer.wait().await;
        let vector = tokio::time::timeout(self.settings.request_timeout, self.provider.embed_boxed(input))
            .await
            .map_err(|_| self.timeout_error())??;
        self.validate_vector(&vector)?;
        Ok(vector)
    }

    fn validate_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions() {
            return Err(LoreError::MalformedProviderResponse(format!(
                "expected {} dimensions, got {}",
                self.dimensions(),
                vector.len()
            )));
        }
        Ok(())
    }

    fn validate_batch(&self, vectors: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>> {
        if vectors.len() != expected {
            return Err(LoreError::MalformedProviderResponse(format!(
                "{} vectors for {} inputs",
                vectors.len(),
                expected
            )));
        }
        for v in &vectors {
            self.validate_vector(v)?;
        }
        Ok(vectors)
    }

    fn timeout_error(&self) -> LoreError {
        LoreError::ProviderTimeout {
            after_ms: self.settings.request_timeout.as_millis() as u64,
        }
    }

    fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.dimensions()]
    }
}

fn ensure_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(LoreError::InvalidInput("cannot embed empty text".into()));
    }
    Ok(())
}
