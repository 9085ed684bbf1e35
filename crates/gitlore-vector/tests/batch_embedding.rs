//! Batch embedding: ordering, chunk failure isolation and cache behaviour.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gitlore_core::error::{LoreError, Result};
use gitlore_core::types::ContextType;
use gitlore_vector::{EmbeddingManager, EmbeddingProvider, HashingProvider, ManagerSettings};

/// Word-hashing provider that counts calls and fails any batch containing
/// the poison text.
struct CountingProvider {
    inner: HashingProvider,
    single_calls: AtomicUsize,
    batch_calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    poison: Option<String>,
}

impl CountingProvider {
    fn new(poison: Option<&str>) -> Self {
        Self {
            inner: HashingProvider::new("counting", 32),
            single_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
            poison: poison.map(str::to_string),
        }
    }
}

impl EmbeddingProvider for CountingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(texts.len());
        if let Some(poison) = &self.poison {
            if texts.iter().any(|t| t == poison) {
                return Err(LoreError::ProviderUnavailable("chunk rejected".into()));
            }
        }
        Ok(texts.iter().map(|t| self.inner.vectorize(t)).collect())
    }

    fn model_id(&self) -> &str {
        "counting"
    }

    fn dimensions(&self) -> usize {
        32
    }
}

fn settings() -> ManagerSettings {
    ManagerSettings {
        min_call_interval: Duration::ZERO,
        retry_backoff: Duration::ZERO,
        ..ManagerSettings::default()
    }
}

fn inputs(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("commit number {}", i)).collect()
}

#[tokio::test]
async fn batch_with_one_failing_chunk_returns_every_vector_in_order() {
    let texts = inputs(250);
    let provider = Arc::new(CountingProvider::new(Some("commit number 150")));
    let manager = EmbeddingManager::new(provider.clone(), settings());

    let vectors = manager
        .generate_batch_embeddings(&texts, ContextType::General)
        .await
        .unwrap();

    assert_eq!(vectors.len(), 250);
    for (text, vector) in texts.iter().zip(&vectors) {
        assert_eq!(vector, &provider.inner.vectorize(text), "mismatch for {}", text);
    }

    // Chunks of 100, 100 and 50; only the middle one falls back per item.
    assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 3);
    assert_eq!(provider.single_calls.load(Ordering::SeqCst), 100);
    let mut sizes = provider.batch_sizes.lock().unwrap().clone();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![50, 100, 100]);
}

#[tokio::test]
async fn batch_results_are_cached_for_single_calls() {
    let texts = inputs(5);
    let provider = Arc::new(CountingProvider::new(None));
    let manager = EmbeddingManager::new(provider.clone(), settings());

    manager
        .generate_batch_embeddings(&texts, ContextType::General)
        .await
        .unwrap();
    for text in &texts {
        manager.generate_embedding(text, ContextType::General).await.unwrap();
    }

    assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.single_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_identical_embedding_does_not_call_provider() {
    let provider = Arc::new(CountingProvider::new(None));
    let manager = EmbeddingManager::new(provider.clone(), settings());

    let first = manager
        .generate_embedding("refactor auth module", ContextType::Commit)
        .await
        .unwrap();
    let second = manager
        .generate_embedding("refactor auth module", ContextType::Commit)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(provider.single_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn chunk_size_respects_configured_batch_size() {
    let provider = Arc::new(CountingProvider::new(None));
    let manager = EmbeddingManager::new(
        provider.clone(),
        ManagerSettings {
            batch_size: 7,
            ..settings()
        },
    );

    let vectors = manager
        .generate_batch_embeddings(&inputs(20), ContextType::General)
        .await
        .unwrap();

    assert_eq!(vectors.len(), 20);
    let mut sizes = provider.batch_sizes.lock().unwrap().clone();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![6, 7, 7]);
}

#[tokio::test]
async fn empty_batch_makes_no_calls() {
    let provider = Arc::new(CountingProvider::new(None));
    let manager = EmbeddingManager::new(provider.clone(), settings());

    let vectors = manager
        .generate_batch_embeddings(&[], ContextType::Code)
        .await
        .unwrap();

    assert!(vectors.is_empty());
    assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 0);
}
