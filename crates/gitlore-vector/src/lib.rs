//! Gitlore vector crate - embedding generation and the versioned vector store.
//!
//! `EmbeddingManager` wraps an embedding provider with caching, batching,
//! retries and a zero-vector fallback. `VectorStore` persists embedded
//! commits, changes and pull requests through a `StoreBackend` and answers
//! similarity queries restricted to one index version.

pub mod backend;
pub mod cache;
pub mod clustering;
pub mod manager;
pub mod preprocess;
pub mod provider;
pub mod similarity;
pub mod store;

pub use backend::{MemoryBackend, SqliteBackend, StoreBackend};
pub use cache::{CacheStats, EmbeddingCache};
pub use clustering::{cluster_embeddings, ClusteringStrategy, SeededKMeans};
pub use manager::{EmbeddingManager, ManagerSettings};
pub use provider::{
    provider_from_config, DynEmbeddingProvider, EmbeddingProvider, HashingProvider, OpenAiProvider,
};
pub use similarity::{cosine_similarity, find_similar};
pub use store::{EntityRef, Recommendations, SearchScope, StoreSettings, VectorStore};
