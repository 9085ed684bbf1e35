//! Store backends: durable SQLite and in-memory.
//!
//! Both answer cosine nearest-neighbour queries by brute force over the
//! entities matching a filter. Results are strictly above the floor, best
//! first, ties kept in scan order (timestamp, kind, natural id).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use gitlore_core::error::{LoreError, Result};
use gitlore_core::types::{EmbeddedEntity, EntityFilter, EntityKey, EntityKind, Scored};
use gitlore_storage::{Database, EntityRepository, VersionCount};

use crate::similarity::{cosine_similarity, sort_by_similarity};

/// Page size used by nearest-neighbour scans over the SQLite backend.
const NEAREST_PAGE_SIZE: usize = 1000;

/// Durable storage and similarity search for embedded entities.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or replace by natural key. For pull requests `pr_commits`
    /// replaces the stored commit links. The write is all-or-nothing.
    async fn upsert(&self, entity: EmbeddedEntity, pr_commits: Vec<String>) -> Result<()>;

    async fn get(&self, key: &EntityKey) -> Result<Option<EmbeddedEntity>>;

    /// Entities matching `filter` with cosine similarity strictly above
    /// `floor`, best first, at most `top_k`.
    async fn nearest(
        &self,
        query: &[f32],
        filter: &EntityFilter,
        floor: f64,
        top_k: usize,
    ) -> Result<Vec<Scored<EmbeddedEntity>>>;

    /// One page of entities matching `filter` in scan order.
    async fn scan(
        &self,
        filter: &EntityFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<EmbeddedEntity>>;

    /// Same page as `scan` with source text and embeddings left empty.
    async fn scan_metadata(
        &self,
        filter: &EntityFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<EmbeddedEntity>> {
        Ok(self
            .scan(filter, offset, limit)
            .await?
            .iter()
            .map(EmbeddedEntity::metadata_only)
            .collect())
    }

    async fn count(&self, filter: &EntityFilter) -> Result<u64>;

    /// Commit shas linked to a pull request.
    async fn pr_commits(&self, number: u64) -> Result<Vec<String>>;

    /// Pull requests that include a commit, ascending.
    async fn pull_requests_for_commit(&self, sha: &str) -> Result<Vec<u64>>;

    async fn version_counts(&self) -> Result<Vec<VersionCount>>;
}

/// Score `entities` against `query` and merge them into `best`, keeping at
/// most `top_k` entries above `floor`.
fn merge_ranked(
    best: &mut Vec<Scored<EmbeddedEntity>>,
    entities: Vec<EmbeddedEntity>,
    query: &[f32],
    floor: f64,
    top_k: usize,
) {
    best.extend(entities.into_iter().filter_map(|entity| {
        let similarity = cosine_similarity(query, &entity.embedding);
        (similarity > floor).then_some(Scored {
            item: entity,
            similarity,
        })
    }));
    sort_by_similarity(best);
    best.truncate(top_k);
}

fn scan_order(a: &EmbeddedEntity, b: &EmbeddedEntity) -> std::cmp::Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.kind().as_str().cmp(b.kind().as_str()))
        .then_with(|| a.key.natural_id().cmp(&b.key.natural_id()))
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    entities: HashMap<(EntityKind, String), EmbeddedEntity>,
    pr_links: HashMap<u64, Vec<String>>,
}

/// In-memory backend for tests and ephemeral runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|e| LoreError::StoreUnavailable(format!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|e| LoreError::StoreUnavailable(format!("Lock poisoned: {}", e)))
    }

    fn matching(&self, filter: &EntityFilter) -> Result<Vec<EmbeddedEntity>> {
        self.page(filter, 0, usize::MAX, EmbeddedEntity::clone)
    }

    /// Sorts matches by reference and clones only the requested window.
    fn page(
        &self,
        filter: &EntityFilter,
        offset: usize,
        limit: usize,
        copy: fn(&EmbeddedEntity) -> EmbeddedEntity,
    ) -> Result<Vec<EmbeddedEntity>> {
        let state = self.read()?;
        let mut entities: Vec<&EmbeddedEntity> = state
            .entities
            .values()
            .filter(|e| filter.matches(e))
            .collect();
        entities.sort_by(|a, b| scan_order(a, b));
        Ok(entities
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(copy)
            .collect())
    }

    pub fn len(&self) -> usize {
        self.read().map(|s| s.entities.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, entity: EmbeddedEntity, pr_commits: Vec<String>) -> Result<()> {
        let mut state = self.write()?;
        if let EntityKey::PullRequest { number } = &entity.key {
            let mut links = pr_commits;
            links.sort();
            links.dedup();
            state.pr_links.insert(*number, links);
        }
        state
            .entities
            .insert((entity.kind(), entity.key.natural_id()), entity);
        Ok(())
    }

    async fn get(&self, key: &EntityKey) -> Result<Option<EmbeddedEntity>> {
        let state = self.read()?;
        Ok(state.entities.get(&(key.kind(), key.natural_id())).cloned())
    }

    async fn nearest(
        &self,
        query: &[f32],
        filter: &EntityFilter,
        floor: f64,
        top_k: usize,
    ) -> Result<Vec<Scored<EmbeddedEntity>>> {
        let mut best = Vec::new();
        merge_ranked(&mut best, self.matching(filter)?, query, floor, top_k);
        Ok(best)
    }

    async fn scan(
        &self,
        filter: &EntityFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<EmbeddedEntity>> {
        self.page(filter, offset, limit, EmbeddedEntity::clone)
    }

    async fn scan_metadata(
        &self,
        filter: &EntityFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<EmbeddedEntity>> {
        self.page(filter, offset, limit, EmbeddedEntity::metadata_only)
    }

    async fn count(&self, filter: &EntityFilter) -> Result<u64> {
        let state = self.read()?;
        Ok(state.entities.values().filter(|e| filter.matches(e)).count() as u64)
    }

    async fn pr_commits(&self, number: u64) -> Result<Vec<String>> {
        let state = self.read()?;
        Ok(state.pr_links.get(&number).cloned().unwrap_or_default())
    }

    async fn pull_requests_for_commit(&self, sha: &str) -> Result<Vec<u64>> {
        let state = self.read()?;
        let mut numbers: Vec<u64> = state
            .pr_links
            .iter()
            .filter(|(_, shas)| shas.iter().any(|s| s == sha))
            .map(|(number, _)| *number)
            .collect();
        numbers.sort_unstable();
        Ok(numbers)
    }

    async fn version_counts(&self) -> Result<Vec<VersionCount>> {
        let state = self.read()?;
        let mut counts: HashMap<(String, usize, EntityKind), u64> = HashMap::new();
        for entity in state.entities.values() {
            *counts
                .entry((
                    entity.version.model_id.clone(),
                    entity.version.dimensions,
                    entity.kind(),
                ))
                .or_default() += 1;
        }
        let mut counts: Vec<VersionCount> = counts
            .into_iter()
            .map(|((model_id, dims, kind), count)| VersionCount {
                version: gitlore_core::types::IndexVersion::new(model_id, dims),
                kind,
                count,
            })
            .collect();
        counts.sort_by(|a, b| {
            (&a.version.model_id, a.version.dimensions, a.kind.as_str()).cmp(&(
                &b.version.model_id,
                b.version.dimensions,
                b.kind.as_str(),
            ))
        });
        Ok(counts)
    }
}

// ---------------------------------------------------------------------------
// SqliteBackend
// ---------------------------------------------------------------------------

/// Durable backend over the SQLite entity repository.
pub struct SqliteBackend {
    repo: EntityRepository,
}

impl SqliteBackend {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            repo: EntityRepository::new(db),
        }
    }
}

#[async_trait]
impl StoreBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn upsert(&self, entity: EmbeddedEntity, pr_commits: Vec<String>) -> Result<()> {
        self.repo.upsert(&entity, &pr_commits)
    }

    async fn get(&self, key: &EntityKey) -> Result<Option<EmbeddedEntity>> {
        self.repo.get(key)
    }

    async fn nearest(
        &self,
        query: &[f32],
        filter: &EntityFilter,
        floor: f64,
        top_k: usize,
    ) -> Result<Vec<Scored<EmbeddedEntity>>> {
        let mut best = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.repo.scan(filter, offset, NEAREST_PAGE_SIZE)?;
            let fetched = page.len();
            merge_ranked(&mut best, page, query, floor, top_k);
            if fetched < NEAREST_PAGE_SIZE {
                break;
            }
            offset += fetched;
        }
        Ok(best)
    }

    async fn scan(
        &self,
        filter: &EntityFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<EmbeddedEntity>> {
        self.repo.scan(filter, offset, limit)
    }

    async fn scan_metadata(
        &self,
        filter: &EntityFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<EmbeddedEntity>> {
        self.repo.scan_metadata(filter, offset, limit)
    }

    async fn count(&self, filter: &EntityFilter) -> Result<u64> {
        self.repo.count(filter)
    }

    async fn pr_commits(&self, number: u64) -> Result<Vec<String>> {
        self.repo.pr_commits(number)
    }

    async fn pull_requests_for_commit(&self, sha: &str) -> Result<Vec<u64>> {
        self.repo.pull_requests_for_commit(sha)
    }

    async fn version_counts(&self) -> Result<Vec<VersionCount>> {
        self.repo.version_counts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use gitlore_core::types::{ContextType, IndexVersion};

    fn entity(sha: &str, minutes: i64, embedding: Vec<f32>) -> EmbeddedEntity {
        EmbeddedEntity {
            key: EntityKey::commit(sha),
            version: IndexVersion::new("m", 2),
            context_type: ContextType::Commit,
            source_text: sha.to_string(),
            embedding,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes),
            metadata: serde_json::Value::Null,
        }
    }

    fn backends() -> Vec<Box<dyn StoreBackend>> {
        vec![
            Box::new(MemoryBackend::new()),
            Box::new(SqliteBackend::new(Arc::new(Database::in_memory().unwrap()))),
        ]
    }

    #[tokio::test]
    async fn test_nearest_floor_is_strict_and_ordered() {
        for backend in backends() {
            backend.upsert(entity("exact", 0, vec![1.0, 0.0]), vec![]).await.unwrap();
            backend.upsert(entity("orthogonal", 1, vec![0.0, 1.0]), vec![]).await.unwrap();
            backend.upsert(entity("diagonal", 2, vec![1.0, 1.0]), vec![]).await.unwrap();

            let hits = backend
                .nearest(&[1.0, 0.0], &EntityFilter::default(), 0.0, 10)
                .await
                .unwrap();
            let ids: Vec<_> = hits.iter().map(|h| h.item.key.natural_id()).collect();
            assert_eq!(ids, vec!["exact", "diagonal"], "backend {}", backend.name());
        }
    }

    #[tokio::test]
    async fn test_nearest_ties_keep_scan_order() {
        for backend in backends() {
            backend.upsert(entity("later", 5, vec![1.0, 0.0]), vec![]).await.unwrap();
            backend.upsert(entity("earlier", 1, vec![2.0, 0.0]), vec![]).await.unwrap();

            let hits = backend
                .nearest(&[1.0, 0.0], &EntityFilter::default(), 0.3, 1)
                .await
                .unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].item.key, EntityKey::commit("earlier"));
        }
    }

    #[tokio::test]
    async fn test_scan_and_count_agree_across_backends() {
        for backend in backends() {
            for i in 0..5 {
                backend
                    .upsert(entity(&format!("c{}", i), i, vec![1.0, 0.0]), vec![])
                    .await
                    .unwrap();
            }
            let filter = EntityFilter::kind(EntityKind::Commit);
            assert_eq!(backend.count(&filter).await.unwrap(), 5);
            let page = backend.scan(&filter, 3, 10).await.unwrap();
            let ids: Vec<_> = page.iter().map(|e| e.key.natural_id()).collect();
            assert_eq!(ids, vec!["c3", "c4"]);
        }
    }

    #[tokio::test]
    async fn test_memory_pr_links() {
        let backend = MemoryBackend::new();
        let mut pr = entity("ignored", 0, vec![1.0, 0.0]);
        pr.key = EntityKey::pull_request(3);
        backend
            .upsert(pr, vec!["b".into(), "a".into(), "a".into()])
            .await
            .unwrap();
        assert_eq!(backend.pr_commits(3).await.unwrap(), vec!["a", "b"]);
        assert!(backend.pr_commits(4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pull_requests_for_commit_across_backends() {
        for backend in backends() {
            for (number, shas) in [(9u64, vec!["a", "b"]), (4, vec!["a"]), (5, vec!["c"])] {
                let mut pr = entity(&format!("pr{}", number), 0, vec![1.0, 0.0]);
                pr.key = EntityKey::pull_request(number);
                backend
                    .upsert(pr, shas.into_iter().map(String::from).collect())
                    .await
                    .unwrap();
            }
            assert_eq!(
                backend.pull_requests_for_commit("a").await.unwrap(),
                vec![4, 9],
                "backend {}",
                backend.name()
            );
            assert!(backend.pull_requests_for_commit("z").await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_scan_metadata_matches_scan_without_payload() {
        for backend in backends() {
            for i in 0..4 {
                backend
                    .upsert(entity(&format!("c{}", i), i, vec![1.0, 0.0]), vec![])
                    .await
                    .unwrap();
            }
            let filter = EntityFilter::kind(EntityKind::Commit);
            let full = backend.scan(&filter, 1, 2).await.unwrap();
            let light = backend.scan_metadata(&filter, 1, 2).await.unwrap();
            let expected: Vec<_> = full.iter().map(EmbeddedEntity::metadata_only).collect();
            assert_eq!(light, expected, "backend {}", backend.name());
        }
    }

    #[tokio::test]
    async fn test_version_counts() {
        let backend = MemoryBackend::new();
        backend.upsert(entity("a", 0, vec![1.0, 0.0]), vec![]).await.unwrap();
        let mut other = entity("b", 0, vec![1.0, 0.0, 0.0]);
        other.version = IndexVersion::new("n", 3);
        backend.upsert(other, vec![]).await.unwrap();

        let counts = backend.version_counts().await.unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].version, IndexVersion::new("m", 2));
        assert_eq!(counts[1].count, 1);
    }
}
