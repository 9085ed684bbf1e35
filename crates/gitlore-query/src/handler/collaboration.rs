//! "Who works on ...?" questions.

use std::collections::HashMap;

use async_trait::async_trait;

use gitlore_core::types::{EmbeddedEntity, EntityKind};

use crate::answer::{
    AnswerType, Contributor, HandlerOutput, Insight, QueryContext, SharedFile, SupportingData,
};
use crate::error::QueryError;
use crate::handler::FirstSeen;
use crate::router::QueryHandler;
use crate::services::QueryServices;

const MAX_CONTRIBUTORS: usize = 20;
const MAX_SHARED_FILES: usize = 15;
const HIGH_COLLABORATION: usize = 3;

/// Contributor rankings and files shared between authors.
pub struct CollaborationHandler;

#[async_trait]
impl QueryHandler for CollaborationHandler {
    fn answer_type(&self) -> AnswerType {
        AnswerType::CollaborationAnalysis
    }

    async fn handle(
        &self,
        _question: &str,
        _context: &QueryContext,
        services: &QueryServices,
    ) -> Result<HandlerOutput, QueryError> {
        let mut authors = ContributorTally::default();
        services
            .store
            .visit_metadata(EntityKind::Commit, |page| authors.add_commits(page))
            .await?;
        let mut files = SharedFileTally::default();
        services
            .store
            .visit_metadata(EntityKind::Change, |page| files.add_changes(page, &authors))
            .await?;

        let contributors = authors.ranked();
        let shared_files = files.shared();

        let mut insights = Vec::new();
        if let Some(top) = contributors.first() {
            insights.push(Insight::new(
                "top_contributor",
                format!(
                    "{} is the top contributor with {} commits",
                    top.author, top.commits
                ),
            ));
        }
        if !shared_files.is_empty() {
            let avg = shared_files
                .iter()
                .map(|f| f.collaboration_level as f64)
                .sum::<f64>()
                / shared_files.len() as f64;
            insights.push(Insight::new(
                "collaboration_level",
                format!("Average {:.1} contributors per heavily modified file", avg),
            ));
        }

        let summary = collaboration_summary(&contributors, &shared_files);
        Ok(HandlerOutput::new(
            SupportingData::Collaboration {
                contributors,
                shared_files,
            },
            summary,
        )
        .with_insights(insights))
    }
}

#[derive(Debug, Default)]
struct AuthorTally {
    email: Option<String>,
    commits: usize,
    types: FirstSeen<()>,
    size_total: u64,
    sized_commits: u64,
}

/// Per-author commit statistics and the author of every commit.
#[derive(Debug, Default)]
pub(crate) struct ContributorTally {
    authors: FirstSeen<AuthorTally>,
    commit_authors: HashMap<String, String>,
}

impl ContributorTally {
    pub(crate) fn add_commits(&mut self, commits: &[EmbeddedEntity]) {
        for commit in commits {
            let Some(author) = commit.author() else {
                continue;
            };
            if let Some(sha) = commit.key.commit_sha() {
                self.commit_authors.insert(sha.to_string(), author.to_string());
            }
            let stats = self.authors.entry(author);
            stats.commits += 1;
            if stats.email.is_none() {
                stats.email = commit.author_email().map(str::to_string);
            }
            if let Some(commit_type) = commit.commit_type() {
                stats.types.entry(commit_type);
            }
            if let Some(size) = commit.change_size() {
                stats.size_total += size;
                stats.sized_commits += 1;
            }
        }
    }

    fn author_of(&self, sha: &str) -> Option<&str> {
        self.commit_authors.get(sha).map(String::as_str)
    }

    /// Authors by commit count (ties by name), top twenty.
    pub(crate) fn ranked(self) -> Vec<Contributor> {
        let mut contributors: Vec<Contributor> = self
            .authors
            .into_entries()
            .into_iter()
            .map(|(author, stats)| Contributor {
                author,
                email: stats.email,
                commits: stats.commits,
                specializations: stats.types.into_keys(),
                avg_change_size: (stats.sized_commits > 0)
                    .then(|| stats.size_total as f64 / stats.sized_commits as f64),
            })
            .collect();
        contributors
            .sort_by(|a, b| b.commits.cmp(&a.commits).then_with(|| a.author.cmp(&b.author)));
        contributors.truncate(MAX_CONTRIBUTORS);
        contributors
    }
}

/// Distinct authors per changed file.
#[derive(Debug, Default)]
pub(crate) struct SharedFileTally {
    files: FirstSeen<FirstSeen<()>>,
}

impl SharedFileTally {
    /// A change's author is its commit's author, falling back to the
    /// author recorded on the change itself.
    pub(crate) fn add_changes(&mut self, changes: &[EmbeddedEntity], commits: &ContributorTally) {
        for change in changes {
            let Some(path) = change.key.file_path() else {
                continue;
            };
            let author = change
                .key
                .commit_sha()
                .and_then(|sha| commits.author_of(sha))
                .or_else(|| change.author());
            if let Some(author) = author {
                self.files.entry(path).entry(author);
            }
        }
    }

    /// Files changed by more than one author, most authors first, top
    /// fifteen.
    pub(crate) fn shared(self) -> Vec<SharedFile> {
        let mut shared: Vec<SharedFile> = self
            .files
            .into_entries()
            .into_iter()
            .filter(|(_, authors)| authors.len() > 1)
            .map(|(file, authors)| SharedFile {
                file,
                collaboration_level: authors.len(),
                collaborators: authors.into_keys(),
            })
            .collect();
        shared.sort_by(|a, b| {
            b.collaboration_level
                .cmp(&a.collaboration_level)
                .then_with(|| a.file.cmp(&b.file))
        });
        shared.truncate(MAX_SHARED_FILES);
        shared
    }
}

pub(crate) fn collaboration_summary(contributors: &[Contributor], shared: &[SharedFile]) -> String {
    let mut summary = format!("Found {} contributors.", contributors.len());
    if !shared.is_empty() {
        let high = shared
            .iter()
            .filter(|f| f.collaboration_level >= HIGH_COLLABORATION)
            .count();
        summary.push_str(&format!(
            " {} files show high collaboration (3+ contributors).",
            high
        ));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gitlore_core::types::{ContextType, EntityKey, IndexVersion};
    use serde_json::json;

    fn commit(sha: &str, author: &str, commit_type: &str, size: u64) -> EmbeddedEntity {
        EmbeddedEntity {
            key: EntityKey::commit(sha),
            version: IndexVersion::new("test", 1),
            context_type: ContextType::Commit,
            source_text: String::new(),
            embedding: vec![1.0],
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            metadata: json!({
                "author": author,
                "author_email": format!("{}@example.com", author.to_lowercase()),
                "commit_type": commit_type,
                "insertions": size,
                "deletions": 0,
            }),
        }
    }

    fn change(sha: &str, path: &str) -> EmbeddedEntity {
        EmbeddedEntity {
            key: EntityKey::change(sha, path),
            version: IndexVersion::new("test", 1),
            context_type: ContextType::Code,
            source_text: String::new(),
            embedding: vec![1.0],
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            metadata: json!({}),
        }
    }

    fn rank_contributors(commits: &[EmbeddedEntity]) -> Vec<Contributor> {
        let mut tally = ContributorTally::default();
        tally.add_commits(commits);
        tally.ranked()
    }

    fn shared_files(commits: &[EmbeddedEntity], changes: &[EmbeddedEntity]) -> Vec<SharedFile> {
        let mut authors = ContributorTally::default();
        authors.add_commits(commits);
        let mut files = SharedFileTally::default();
        files.add_changes(changes, &authors);
        files.shared()
    }

    #[test]
    fn test_rank_contributors() {
        let commits = vec![
            commit("a", "Bo", "fix", 10),
            commit("b", "Ann", "feat", 20),
            commit("c", "Bo", "feat", 30),
            commit("d", "Cy", "docs", 2),
            commit("e", "Ann", "feat", 40),
        ];
        let ranked = rank_contributors(&commits);
        let names: Vec<&str> = ranked.iter().map(|c| c.author.as_str()).collect();
        assert_eq!(names, vec!["Ann", "Bo", "Cy"]);
        assert_eq!(ranked[0].commits, 2);
        assert_eq!(ranked[0].avg_change_size, Some(30.0));
        assert_eq!(ranked[1].specializations, vec!["fix", "feat"]);
        assert_eq!(ranked[0].email.as_deref(), Some("ann@example.com"));
    }

    #[test]
    fn test_shared_files() {
        let commits = vec![
            commit("a", "Bo", "fix", 1),
            commit("b", "Ann", "feat", 1),
            commit("c", "Cy", "feat", 1),
        ];
        let changes = vec![
            change("a", "src/auth.rs"),
            change("b", "src/auth.rs"),
            change("c", "src/auth.rs"),
            change("a", "src/api.rs"),
            change("b", "src/api.rs"),
            change("a", "README.md"),
            change("a", "README.md"),
        ];
        let shared = shared_files(&commits, &changes);
        assert_eq!(shared.len(), 2);
        assert_eq!(shared[0].file, "src/auth.rs");
        assert_eq!(shared[0].collaboration_level, 3);
        assert_eq!(shared[1].collaborators, vec!["Bo", "Ann"]);

        assert_eq!(
            collaboration_summary(&rank_contributors(&commits), &shared),
            "Found 3 contributors. 1 files show high collaboration (3+ contributors)."
        );
    }

    #[test]
    fn test_many_files_and_authors_group_correctly() {
        let commits: Vec<_> = (0..50)
            .map(|i| commit(&format!("c{}", i), &format!("dev{:02}", i % 25), "feat", 1))
            .collect();
        let changes: Vec<_> = (0..10_000)
            .map(|i| change(&format!("c{}", i % 50), &format!("src/f{}.rs", i % 5_000)))
            .collect();

        let ranked = rank_contributors(&commits);
        assert_eq!(ranked.len(), MAX_CONTRIBUTORS);
        assert!(ranked.iter().all(|c| c.commits == 2));
        assert_eq!(ranked[0].author, "dev00");

        // File j is changed at i = j and i = j + 5000, both by commit j % 50.
        assert!(shared_files(&commits, &changes).is_empty());

        // Now by commits j % 49 and (j + 2) % 49, two different authors.
        let changes: Vec<_> = (0..10_000)
            .map(|i| change(&format!("c{}", i % 49), &format!("src/f{}.rs", i % 5_000)))
            .collect();
        let shared = shared_files(&commits, &changes);
        assert_eq!(shared.len(), MAX_SHARED_FILES);
        assert!(shared.iter().all(|f| f.collaboration_level == 2));
    }

    #[test]
    fn test_summary_without_shared_files() {
        assert_eq!(collaboration_summary(&[], &[]), "Found 0 contributors.");
    }
}
