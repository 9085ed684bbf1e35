//! Vector store: typed upserts, versioned similarity search, and corpus
//! access over a pluggable [`StoreBackend`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use gitlore_core::config::StoreConfig;
use gitlore_core::error::{LoreError, Result};
use gitlore_core::types::{
    ChangeMetadata, Commit, ContextType, EmbeddedEntity, EntityFilter, EntityKey, EntityKind,
    IndexVersion, PullRequest, Scored,
};
use gitlore_storage::VersionCount;

use crate::backend::StoreBackend;
use crate::manager::EmbeddingManager;

/// Matches whose files feed [`Recommendations::suggested_files`].
const RECOMMENDATION_SOURCE_COMMITS: usize = 3;

#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Search results must be strictly above this similarity.
    pub similarity_floor: f64,
    pub scan_page_size: usize,
    pub max_cluster_corpus: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for StoreSettings {
    fn from(config: &StoreConfig) -> Self {
        Self {
            similarity_floor: config.similarity_floor,
            scan_page_size: config.scan_page_size.max(1),
            max_cluster_corpus: config.max_cluster_corpus,
        }
    }
}

/// Which entities a semantic search considers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchScope {
    pub kind: Option<EntityKind>,
    pub file_path: Option<String>,
}

impl SearchScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn commits() -> Self {
        Self::of_kind(EntityKind::Commit)
    }

    pub fn changes() -> Self {
        Self::of_kind(EntityKind::Change)
    }

    pub fn pull_requests() -> Self {
        Self::of_kind(EntityKind::PullRequest)
    }

    pub fn of_kind(kind: EntityKind) -> Self {
        Self {
            kind: Some(kind),
            file_path: None,
        }
    }

    /// Restrict to changes of one file.
    pub fn in_file(mut self, path: impl Into<String>) -> Self {
        self.kind = Some(EntityKind::Change);
        self.file_path = Some(path.into());
        self
    }
}

/// Reference entity for [`VectorStore::find_similar_entities`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Commit(String),
    PullRequest(u64),
    /// A file path; its most recent change is the reference.
    File(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendations {
    pub similar_commits: Vec<Scored<EmbeddedEntity>>,
    /// Files changed by the top matches, first occurrence order.
    pub suggested_files: Vec<String>,
    /// Commit types among the matches, most frequent first.
    pub commit_types: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReembedReport {
    pub rewritten: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub backend: String,
    pub version: IndexVersion,
    pub counts: Vec<VersionCountView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionCountView {
    pub version: String,
    pub kind: EntityKind,
    pub count: u64,
}

impl From<VersionCount> for VersionCountView {
    fn from(c: VersionCount) -> Self {
        Self {
            version: c.version.to_string(),
            kind: c.kind,
            count: c.count,
        }
    }
}

/// Persists embedded history entities of one [`IndexVersion`] and answers
/// similarity queries restricted to that version.
pub struct VectorStore {
    backend: Arc<dyn StoreBackend>,
    version: IndexVersion,
    settings: StoreSettings,
}

impl VectorStore {
    pub fn new(backend: Arc<dyn StoreBackend>, version: IndexVersion, settings: StoreSettings) -> Self {
        info!(backend = backend.name(), version = %version, "Vector store ready");
        Self {
            backend,
            version,
            settings,
        }
    }

    pub fn version(&self) -> &IndexVersion {
        &self.version
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Reject a caller whose embeddings come from another index version.
    pub fn ensure_version(&self, version: &IndexVersion) -> Result<()> {
        if *version != self.version {
            return Err(LoreError::VersionMismatch {
                store: self.version.to_string(),
                query: version.to_string(),
            });
        }
        Ok(())
    }

    fn ensure_dimensions(&self, vector: &[f32]) -> Result<()> {
        if !self.version.accepts(vector) {
            return Err(LoreError::DimensionMismatch {
                expected: self.version.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn filter(&self) -> EntityFilter {
        EntityFilter::default().with_version(&self.version)
    }

    pub async fn upsert_commit(&self, commit: &Commit, embedding: Vec<f32>) -> Result<()> {
        self.ensure_dimensions(&embedding)?;
        let entity = EmbeddedEntity {
            key: EntityKey::commit(&commit.sha),
            version: self.version.clone(),
            context_type: ContextType::Commit,
            source_text: commit.embedding_text(),
            embedding,
            timestamp: commit.timestamp,
            metadata: json!({
                "message": commit.message,
                "commit_type": commit.commit_type,
                "author": commit.author_name,
                "author_email": commit.author_email,
                "insertions": commit.insertions,
                "deletions": commit.deletions,
            }),
        };
        self.backend.upsert(entity, Vec::new()).await?;
        debug!(sha = %commit.sha, "Commit embedded");
        Ok(())
    }

    pub async fn upsert_change(
        &self,
        commit_id: &str,
        file_path: &str,
        embedding: Vec<f32>,
        metadata: ChangeMetadata,
    ) -> Result<()> {
        self.ensure_dimensions(&embedding)?;
        let entity = EmbeddedEntity {
            key: EntityKey::change(commit_id, file_path),
            version: self.version.clone(),
            context_type: ContextType::Code,
            timestamp: metadata.timestamp,
            metadata: json!({
                "change_type": metadata.change_type,
                "semantic_similarity": metadata.semantic_similarity,
                "change_magnitude": metadata.change_magnitude,
                "author": metadata.author,
            }),
            source_text: metadata.source_text,
            embedding,
        };
        self.backend.upsert(entity, Vec::new()).await?;
        debug!(commit = commit_id, file = file_path, "Change embedded");
        Ok(())
    }

    pub async fn upsert_pull_request(&self, pr: &PullRequest, embedding: Vec<f32>) -> Result<()> {
        self.ensure_dimensions(&embedding)?;
        let entity = EmbeddedEntity {
            key: EntityKey::pull_request(pr.number),
            version: self.version.clone(),
            context_type: ContextType::Commit,
            source_text: pr.embedding_text(),
            embedding,
            timestamp: pr.created_at,
            metadata: json!({
                "title": pr.title,
                "state": pr.state,
                "author": pr.author,
                "merged_at": pr.merged_at,
            }),
        };
        self.backend.upsert(entity, pr.commits.clone()).await?;
        debug!(number = pr.number, links = pr.commits.len(), "Pull request embedded");
        Ok(())
    }

    /// Fetch an entity of this store's version.
    pub async fn get(&self, key: &EntityKey) -> Result<Option<EmbeddedEntity>> {
        Ok(self
            .backend
            .get(key)
            .await?
            .filter(|e| e.version == self.version))
    }

    pub async fn pr_commits(&self, number: u64) -> Result<Vec<String>> {
        self.backend.pr_commits(number).await
    }

    /// Pull requests that include commit `sha`, ascending.
    pub async fn pull_requests_for_commit(&self, sha: &str) -> Result<Vec<u64>> {
        self.backend.pull_requests_for_commit(sha).await
    }

    /// Entities in `scope` whose similarity to `query` is above the floor,
    /// best first.
    pub async fn semantic_search(
        &self,
        query: &[f32],
        scope: &SearchScope,
        top_k: usize,
    ) -> Result<Vec<Scored<EmbeddedEntity>>> {
        if top_k == 0 {
            return Err(LoreError::InvalidInput("top_k must be greater than 0".into()));
        }
        self.ensure_dimensions(query)?;

        let mut filter = self.filter();
        filter.kind = scope.kind;
        filter.file_path = scope.file_path.clone();

        let hits = self
            .backend
            .nearest(query, &filter, self.settings.similarity_floor, top_k)
            .await?;
        debug!(hits = hits.len(), top_k, "Semantic search");
        Ok(hits)
    }

    /// Entities of the same kind most similar to the reference's latest
    /// embedding. An unknown reference yields no results.
    pub async fn find_similar_entities(
        &self,
        reference: &EntityRef,
        top_k: usize,
    ) -> Result<Vec<Scored<EmbeddedEntity>>> {
        if top_k == 0 {
            return Err(LoreError::InvalidInput("top_k must be greater than 0".into()));
        }

        let (anchor, scope, exclude_file) = match reference {
            EntityRef::Commit(sha) => (
                self.get(&EntityKey::commit(sha)).await?,
                SearchScope::commits(),
                None,
            ),
            EntityRef::PullRequest(number) => (
                self.get(&EntityKey::pull_request(*number)).await?,
                SearchScope::pull_requests(),
                None,
            ),
            EntityRef::File(path) => (
                self.file_history(path).await?.pop(),
                SearchScope::changes(),
                Some(path.as_str()),
            ),
        };

        let Some(anchor) = anchor else {
            debug!(?reference, "No embedding for reference entity");
            return Ok(Vec::new());
        };

        // Over-fetch to make room for the excluded entities.
        let excluded = match exclude_file {
            Some(path) => self
                .backend
                .count(&self.filter().with_file_path(path))
                .await? as usize,
            None => 1,
        };
        let hits = self
            .semantic_search(&anchor.embedding, &scope, top_k.saturating_add(excluded))
            .await?;

        Ok(hits
            .into_iter()
            .filter(|hit| match exclude_file {
                Some(path) => hit.item.key.file_path() != Some(path),
                None => hit.item.key != anchor.key,
            })
            .take(top_k)
            .collect())
    }

    /// Every change to `path`, oldest first.
    pub async fn file_history(&self, path: &str) -> Result<Vec<EmbeddedEntity>> {
        let filter = EntityFilter::kind(EntityKind::Change)
            .with_version(&self.version)
            .with_file_path(path);
        self.scan_all(&filter, usize::MAX).await
    }

    /// Changes recorded for one commit, oldest first.
    pub async fn changes_for_commit(&self, sha: &str) -> Result<Vec<EmbeddedEntity>> {
        let filter = EntityFilter::kind(EntityKind::Change)
            .with_version(&self.version)
            .with_commit_sha(sha);
        self.scan_all(&filter, usize::MAX).await
    }

    /// The most recent `limit` entities of `kind`, in time order.
    pub async fn recent_corpus(&self, kind: EntityKind, limit: usize) -> Result<Vec<EmbeddedEntity>> {
        let mut filter = self.filter();
        filter.kind = Some(kind);
        let total = self.backend.count(&filter).await? as usize;
        let start = total.saturating_sub(limit);
        self.scan_from(&filter, start, limit).await
    }

    /// Corpus for clustering: the latest `max_cluster_corpus` entities.
    pub async fn cluster_corpus(&self, kind: EntityKind) -> Result<Vec<EmbeddedEntity>> {
        self.recent_corpus(kind, self.settings.max_cluster_corpus).await
    }

    /// Feed every entity of `kind` to `visit` one page at a time, oldest
    /// first, without source text or embeddings. Returns the number visited.
    pub async fn visit_metadata<F>(&self, kind: EntityKind, mut visit: F) -> Result<usize>
    where
        F: FnMut(&[EmbeddedEntity]) + Send,
    {
        let mut filter = self.filter();
        filter.kind = Some(kind);
        let page_size = self.settings.scan_page_size;
        let mut offset = 0;
        loop {
            let page = self.backend.scan_metadata(&filter, offset, page_size).await?;
            if page.is_empty() {
                break;
            }
            visit(&page);
            offset += page.len();
            if page.len() < page_size {
                break;
            }
        }
        debug!(kind = kind.as_str(), visited = offset, "Metadata scan");
        Ok(offset)
    }

    async fn scan_all(&self, filter: &EntityFilter, limit: usize) -> Result<Vec<EmbeddedEntity>> {
        self.scan_from(filter, 0, limit).await
    }

    async fn scan_from(
        &self,
        filter: &EntityFilter,
        start: usize,
        limit: usize,
    ) -> Result<Vec<EmbeddedEntity>> {
        let page_size = self.settings.scan_page_size;
        let mut out = Vec::new();
        let mut offset = start;
        while out.len() < limit {
            let want = page_size.min(limit - out.len());
            let page = self.backend.scan(filter, offset, want).await?;
            let fetched = page.len();
            out.extend(page);
            if fetched < want {
                break;
            }
            offset += fetched;
        }
        Ok(out)
    }

    /// Similar commits plus the files and commit types they point at.
    pub async fn contextual_recommendations(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Recommendations> {
        let similar_commits = self
            .semantic_search(query, &SearchScope::commits(), top_k)
            .await?;

        let mut suggested_files: Vec<String> = Vec::new();
        for hit in similar_commits.iter().take(RECOMMENDATION_SOURCE_COMMITS) {
            let Some(sha) = hit.item.key.commit_sha() else {
                continue;
            };
            for change in self.changes_for_commit(sha).await? {
                if let Some(path) = change.key.file_path() {
                    if !suggested_files.iter().any(|f| f == path) {
                        suggested_files.push(path.to_string());
                    }
                }
            }
        }

        let mut type_counts: Vec<(String, usize)> = Vec::new();
        for hit in &similar_commits {
            if let Some(t) = hit.item.commit_type() {
                match type_counts.iter_mut().find(|(name, _)| name == t) {
                    Some((_, n)) => *n += 1,
                    None => type_counts.push((t.to_string(), 1)),
                }
            }
        }
        type_counts.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(Recommendations {
            similar_commits,
            suggested_files,
            commit_types: type_counts,
        })
    }

    /// Rewrite every entity not stamped with this store's version using
    /// `manager`, which must produce this version.
    ///
    /// Queries running meanwhile simply do not see entities until they are
    /// rewritten.
    pub async fn reembed(&self, manager: &EmbeddingManager) -> Result<ReembedReport> {
        self.ensure_version(&manager.version())?;

        let stale = EntityFilter {
            stale_for: Some(self.version.clone()),
            ..EntityFilter::default()
        };
        let mut report = ReembedReport::default();

        loop {
            // Rewritten entities leave the stale set, so only skipped ones
            // shift the offset.
            let page = self
                .backend
                .scan(&stale, report.skipped, self.settings.scan_page_size)
                .await?;
            if page.is_empty() {
                break;
            }

            let mut groups: HashMap<ContextType, Vec<EmbeddedEntity>> = HashMap::new();
            for entity in page {
                if entity.source_text.trim().is_empty() {
                    warn!(key = %entity.key, "Skipping re-embed of entity without source text");
                    report.skipped += 1;
                    continue;
                }
                groups.entry(entity.context_type).or_default().push(entity);
            }

            for (context_type, entities) in groups {
                let texts: Vec<String> = entities.iter().map(|e| e.source_text.clone()).collect();
                let vectors = manager.generate_batch_embeddings(&texts, context_type).await?;
                for (mut entity, vector) in entities.into_iter().zip(vectors) {
                    let links = match &entity.key {
                        EntityKey::PullRequest { number } => self.backend.pr_commits(*number).await?,
                        _ => Vec::new(),
                    };
                    entity.version = self.version.clone();
                    entity.embedding = vector;
                    self.backend.upsert(entity, links).await?;
                    report.rewritten += 1;
                }
            }
        }

        info!(
            rewritten = report.rewritten,
            skipped = report.skipped,
            version = %self.version,
            "Re-embedding finished"
        );
        Ok(report)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            backend: self.backend.name().to_string(),
            version: self.version.clone(),
            counts: self
                .backend
                .version_counts()
                .await?
                .into_iter()
                .map(VersionCountView::from)
                .collect(),
        })
    }
}
