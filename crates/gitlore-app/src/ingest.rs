//! Loading a history export and writing it into the vector store.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use gitlore_core::error::Result;
use gitlore_core::types::{ChangeMetadata, Commit, ContextType, EntityKey, FileChange, PullRequest};
use gitlore_vector::{EmbeddingManager, VectorStore};

/// Output of the history miner: everything `ingest` embeds.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HistoryExport {
    pub commits: Vec<Commit>,
    pub changes: Vec<FileChange>,
    pub pull_requests: Vec<PullRequest>,
}

impl HistoryExport {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub commits: usize,
    pub changes: usize,
    pub pull_requests: usize,
    /// Entities with no text to embed, or changes whose commit is unknown.
    pub skipped: usize,
}

/// Embed and store every entity in `export`.
///
/// Commits are written first so that changes can take their timestamp and
/// author from either the export or commits already in the store.
pub async fn ingest(
    manager: &EmbeddingManager,
    store: &VectorStore,
    export: &HistoryExport,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    let commits: Vec<&Commit> = export
        .commits
        .iter()
        .filter(|c| !c.embedding_text().trim().is_empty())
        .collect();
    report.skipped += export.commits.len() - commits.len();
    let texts: Vec<String> = commits.iter().map(|c| c.embedding_text()).collect();
    let vectors = manager
        .generate_batch_embeddings(&texts, ContextType::Commit)
        .await?;
    for (commit, vector) in commits.iter().zip(vectors) {
        store.upsert_commit(commit, vector).await?;
        report.commits += 1;
    }

    let known: HashMap<&str, (DateTime<Utc>, &str)> = export
        .commits
        .iter()
        .map(|c| (c.sha.as_str(), (c.timestamp, c.author_name.as_str())))
        .collect();

    for change in &export.changes {
        if change.after.trim().is_empty() {
            report.skipped += 1;
            continue;
        }
        let (timestamp, author) = match known.get(change.commit_sha.as_str()) {
            Some((ts, author)) => (*ts, Some(author.to_string())),
            None => match store.get(&EntityKey::commit(change.commit_sha.as_str())).await? {
                Some(commit) => (commit.timestamp, commit.author().map(str::to_string)),
                None => {
                    warn!(
                        commit = %change.commit_sha,
                        file = %change.file_path,
                        "Change skipped, commit unknown"
                    );
                    report.skipped += 1;
                    continue;
                }
            },
        };

        let before = change.before.as_deref().filter(|b| !b.trim().is_empty());
        let (vector, semantic_similarity, change_magnitude) = match before {
            Some(before) => {
                let analysis = manager
                    .analyze_code_change(before, &change.after, &change.file_path)
                    .await?;
                (
                    analysis.after_embedding,
                    Some(analysis.semantic_similarity),
                    Some(analysis.change_magnitude),
                )
            }
            None => (
                manager
                    .generate_embedding(&change.after, ContextType::Code)
                    .await?,
                None,
                None,
            ),
        };

        let metadata = ChangeMetadata {
            source_text: change.after.clone(),
            timestamp,
            change_type: change.change_type.clone(),
            semantic_similarity,
            change_magnitude,
            author,
        };
        store
            .upsert_change(&change.commit_sha, &change.file_path, vector, metadata)
            .await?;
        report.changes += 1;
    }

    let prs: Vec<&PullRequest> = export
        .pull_requests
        .iter()
        .filter(|p| !p.embedding_text().trim().is_empty())
        .collect();
    report.skipped += export.pull_requests.len() - prs.len();
    let texts: Vec<String> = prs.iter().map(|p| p.embedding_text()).collect();
    let vectors = manager
        .generate_batch_embeddings(&texts, ContextType::Commit)
        .await?;
    for (pr, vector) in prs.iter().zip(vectors) {
        store.upsert_pull_request(pr, vector).await?;
        report.pull_requests += 1;
    }

    info!(
        commits = report.commits,
        changes = report.changes,
        pull_requests = report.pull_requests,
        skipped = report.skipped,
        "History ingested"
    );
    Ok(report)
}
