//! End-to-end ranking: commits embedded through the manager, stored, and
//! searched with a natural-language query.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use gitlore_core::error::Result;
use gitlore_core::types::{Commit, ContextType};
use gitlore_storage::Database;
use gitlore_vector::{
    EmbeddingManager, EmbeddingProvider, ManagerSettings, MemoryBackend, SearchScope,
    SqliteBackend, StoreBackend, StoreSettings, VectorStore,
};

/// Vocabulary-position embedding: one dimension per concept, 1.0 when any
/// word of the concept occurs in the text.
struct WordOverlap;

const CONCEPTS: &[&[&str]] = &[
    &["auth", "authentication", "login"],
    &["fix", "bug", "bugfix"],
    &["add", "feature"],
    &["refactor", "refactoring"],
    &["module"],
    &["update"],
    &["ci"],
    &["config"],
    &["changes"],
];

impl WordOverlap {
    fn vectorize(text: &str) -> Vec<f32> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();
        CONCEPTS
            .iter()
            .map(|concept| {
                if words.iter().any(|w| concept.contains(&w.as_str())) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect()
    }
}

impl EmbeddingProvider for WordOverlap {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }

    fn model_id(&self) -> &str {
        "word-overlap"
    }

    fn dimensions(&self) -> usize {
        CONCEPTS.len()
    }
}

const CORPUS: [&str; 4] = [
    "fix login bug",
    "add login feature",
    "refactor auth module",
    "update CI config",
];

async fn ranked_messages(backend: Arc<dyn StoreBackend>) -> Vec<String> {
    let manager = EmbeddingManager::new(
        Arc::new(WordOverlap),
        ManagerSettings {
            min_call_interval: Duration::ZERO,
            retry_backoff: Duration::ZERO,
            ..ManagerSettings::default()
        },
    );
    let store = VectorStore::new(backend, manager.version(), StoreSettings::default());

    let commits: Vec<Commit> = CORPUS
        .iter()
        .enumerate()
        .map(|(i, message)| Commit {
            sha: format!("sha{}", i),
            message: message.to_string(),
            author_name: "Dana".into(),
            author_email: "dana@example.com".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1 + i as u32, 10, 0, 0).unwrap(),
            commit_type: None,
            insertions: 0,
            deletions: 0,
        })
        .collect();
    let texts: Vec<String> = commits.iter().map(Commit::embedding_text).collect();
    let vectors = manager
        .generate_batch_embeddings(&texts, ContextType::Commit)
        .await
        .unwrap();
    for (commit, vector) in commits.iter().zip(vectors) {
        store.upsert_commit(commit, vector).await.unwrap();
    }

    let query = manager
        .generate_embedding("authentication changes", ContextType::Commit)
        .await
        .unwrap();
    let hits = store
        .semantic_search(&query, &SearchScope::commits(), 10)
        .await
        .unwrap();
    assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));

    hits.iter().map(|h| h.item.headline().to_string()).collect()
}

fn position(ranked: &[String], message: &str) -> Option<usize> {
    ranked.iter().position(|m| m == message)
}

fn assert_ranking(ranked: &[String]) {
    let ci = position(ranked, "update CI config");
    for relevant in ["refactor auth module", "add login feature"] {
        let pos = position(ranked, relevant)
            .unwrap_or_else(|| panic!("{} missing from {:?}", relevant, ranked));
        if let Some(ci) = ci {
            assert!(pos < ci, "{} ranked below CI config: {:?}", relevant, ranked);
        }
    }
}

#[tokio::test]
async fn authentication_query_ranks_auth_commits_above_ci_in_memory() {
    let ranked = ranked_messages(Arc::new(MemoryBackend::new())).await;
    assert_ranking(&ranked);
}

#[tokio::test]
async fn authentication_query_ranks_auth_commits_above_ci_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::new(&dir.path().join("gitlore.db")).unwrap());
    let ranked = ranked_messages(Arc::new(SqliteBackend::new(db))).await;
    assert_ranking(&ranked);
}
