//! Embedding provider trait and implementations.
//!
//! - `HashingProvider` builds deterministic feature-hashed vectors locally.
//!   It needs no network and is the default for offline runs and tests.
//! - `OpenAiProvider` calls an OpenAI-compatible `/embeddings` endpoint.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use gitlore_core::config::EmbeddingConfig;
use gitlore_core::error::{LoreError, Result};

/// A remote or local service that turns text into fixed-dimension vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;

    /// Embed several texts in one call, returning one vector per input in order.
    fn embed_batch(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;

    /// Identifier of the embedding space; part of the index version.
    fn model_id(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// Longest input (in chars) the provider accepts.
    fn max_input_chars(&self) -> usize {
        8000
    }

    /// Most texts accepted by one `embed_batch` call.
    fn max_batch_size(&self) -> usize {
        100
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`EmbeddingProvider`] for dynamic dispatch.
///
/// A blanket implementation is provided so that every `EmbeddingProvider`
/// automatically implements `DynEmbeddingProvider`.
pub trait DynEmbeddingProvider: Send + Sync {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>>;

    fn embed_batch_boxed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;

    fn model_id(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn max_input_chars(&self) -> usize;

    fn max_batch_size(&self) -> usize;
}

impl<T: EmbeddingProvider> DynEmbeddingProvider for T {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
        Box::pin(self.embed(text))
    }

    fn embed_batch_boxed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(self.embed_batch(texts))
    }

    fn model_id(&self) -> &str {
        EmbeddingProvider::model_id(self)
    }

    fn dimensions(&self) -> usize {
        EmbeddingProvider::dimensions(self)
    }

    fn max_input_chars(&self) -> usize {
        EmbeddingProvider::max_input_chars(self)
    }

    fn max_batch_size(&self) -> usize {
        EmbeddingProvider::max_batch_size(self)
    }
}

// ---------------------------------------------------------------------------
// HashingProvider - deterministic local feature hashing
// ---------------------------------------------------------------------------

const TRIGRAM_WEIGHT: f32 = 0.5;

/// Local embedding provider using signed feature hashing.
///
/// Each lowercase alphanumeric token contributes one feature, and each of its
/// character trigrams contributes a half-weight feature, so texts sharing
/// words or word stems ("auth", "authentication") land close together.
/// Output vectors are L2-normalized; text without any token maps to the zero
/// vector.
#[derive(Debug, Clone)]
pub struct HashingProvider {
    model_id: String,
    dimensions: usize,
}

impl HashingProvider {
    pub fn new(model_id: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimensions: dimensions.max(1),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(config.model.clone(), config.dimensions)
    }

    /// Compute the vector for `text` synchronously.
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            self.add_feature(&mut vector, &token, 1.0);

            let padded: Vec<char> = format!("<{}>", token).chars().collect();
            for window in padded.windows(3) {
                let gram: String = window.iter().collect();
                self.add_feature(&mut vector, &gram, TRIGRAM_WEIGHT);
            }
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

/// Lowercase alphanumeric tokens (underscores kept, so identifiers survive).
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

impl EmbeddingProvider for HashingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// OpenAiProvider - OpenAI-compatible HTTP embeddings
// ---------------------------------------------------------------------------

/// Embedding provider for OpenAI-compatible `/embeddings` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
    max_batch_size: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiProvider {
    /// Build a client from the embedding config, reading the API key from
    /// the configured environment variable.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            LoreError::Config(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Self::new(
            &api_key,
            &config.api_base,
            &config.model,
            config.dimensions,
            config.request_timeout(),
            config.batch_size,
        )
    }

    pub fn new(
        api_key: &str,
        api_base: &str,
        model: &str,
        dimensions: usize,
        timeout: Duration,
        max_batch_size: usize,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(LoreError::Config("missing embedding API key".into()));
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

        let endpoint = format!("{}/embeddings", api_base.trim_end_matches('/'));
        info!(%endpoint, model, dimensions, "OpenAI embedding provider configured");

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
            dimensions,
            timeout,
            max_batch_size: max_batch_size.max(1),
        })
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input,
            dimensions: self.dimensions,
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
                "embeddings request failed ({}): {}",
                status, text
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LoreError::MalformedProviderResponse(e.to_string()))?;
        parsed.data.sort_by_key(|d| d.index);

        if parsed.data.len() != input.len() {
            return Err(LoreError::MalformedProviderResponse(format!(
                "{} embeddings for {} inputs",
                parsed.data.len(),
                input.len()
            )));
        }
        debug!(count = input.len(), "Embeddings received");
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
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

impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = [text.to_string()];
        let mut vectors = self.request(&input).await?;
        vectors
            .pop()
            .ok_or_else(|| LoreError::MalformedProviderResponse("empty embedding list".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

/// Build the provider named by `config.provider`.
pub fn provider_from_config(config: &EmbeddingConfig) -> Result<Box<dyn DynEmbeddingProvider>> {
    match config.provider.as_str() {
        "hashing" => Ok(Box::new(HashingProvider::from_config(config))),
        "openai" => Ok(Box::new(OpenAiProvider::from_config(config)?)),
        other => Err(LoreError::Config(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}
