//! "What are the common patterns?" questions.

use async_trait::async_trait;
use chrono::{Datelike, Weekday};

use gitlore_core::types::{EmbeddedEntity, EntityKind};
use gitlore_insight::ClusterReport;

use crate::answer::{AnswerType, HandlerOutput, Insight, PatternEntry, QueryContext, SupportingData};
use crate::error::QueryError;
use crate::handler::FirstSeen;
use crate::router::QueryHandler;
use crate::services::QueryServices;

/// Commit types must occur more often than this to count as a pattern.
const TYPE_PATTERN_MIN: usize = 5;
const PATTERN_EXAMPLES: usize = 3;

/// Semantic clusters, frequent commit types and the weekday/weekend split.
pub struct PatternHandler;

#[async_trait]
impl QueryHandler for PatternHandler {
    fn answer_type(&self) -> AnswerType {
        AnswerType::PatternAnalysis
    }

    async fn handle(
        &self,
        _question: &str,
        _context: &QueryContext,
        services: &QueryServices,
    ) -> Result<HandlerOutput, QueryError> {
        let clusters = services
            .clusters
            .analyze_store(&services.store, EntityKind::Commit, services.settings.cluster_k)
            .await?;
        let mut tally = CommitTally::default();
        let total = services
            .store
            .visit_metadata(EntityKind::Commit, |page| tally.add(page))
            .await?;

        let (weekday_commits, weekend_commits) = tally.weekday_split();
        let mut patterns = cluster_patterns(&clusters);
        patterns.extend(tally.type_patterns());

        let mut insights = Vec::new();
        if total > 0 {
            insights.push(Insight::new(
                "temporal_pattern",
                format!(
                    "Weekday commits: {}, Weekend commits: {}",
                    weekday_commits, weekend_commits
                ),
            ));
        }

        let summary = pattern_summary(&patterns);
        Ok(HandlerOutput::new(
            SupportingData::Pattern {
                patterns,
                weekday_commits,
                weekend_commits,
            },
            summary,
        )
        .with_insights(insights))
    }
}

fn cluster_patterns(report: &ClusterReport) -> Vec<PatternEntry> {
    report
        .clusters
        .iter()
        .map(|cluster| PatternEntry {
            pattern: cluster.theme.as_str().to_string(),
            frequency: cluster.size,
            examples: cluster
                .samples
                .iter()
                .take(PATTERN_EXAMPLES)
                .map(|s| s.headline.clone())
                .collect(),
        })
        .collect()
}

/// Commit type counts and the weekday/weekend split, built one page at a
/// time.
#[derive(Debug, Default)]
pub(crate) struct CommitTally {
    types: FirstSeen<usize>,
    weekday: usize,
    weekend: usize,
}

impl CommitTally {
    pub(crate) fn add(&mut self, commits: &[EmbeddedEntity]) {
        for commit in commits {
            if let Some(commit_type) = commit.commit_type() {
                *self.types.entry(commit_type) += 1;
            }
            // By UTC date.
            match commit.timestamp.weekday() {
                Weekday::Sat | Weekday::Sun => self.weekend += 1,
                _ => self.weekday += 1,
            }
        }
    }

    /// Commits on Monday..Friday and on the weekend.
    pub(crate) fn weekday_split(&self) -> (usize, usize) {
        (self.weekday, self.weekend)
    }

    /// `"{type}_commits"` for every commit type seen more than five times,
    /// most frequent first.
    pub(crate) fn type_patterns(self) -> Vec<PatternEntry> {
        let mut counts = self.types.into_entries();
        counts.retain(|(_, n)| *n > TYPE_PATTERN_MIN);
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
            .into_iter()
            .map(|(t, n)| PatternEntry {
                pattern: format!("{}_commits", t),
                frequency: n,
                examples: Vec::new(),
            })
            .collect()
    }
}

pub(crate) fn pattern_summary(patterns: &[PatternEntry]) -> String {
    let top = patterns.iter().fold(None::<&PatternEntry>, |best, p| match best {
        Some(b) if b.frequency >= p.frequency => Some(b),
        _ => Some(p),
    });
    match top {
        None => "No significant patterns detected.".to_string(),
        Some(top) => format!(
            "Identified {} patterns. Most frequent: {} ({} occurrences).",
            patterns.len(),
            top.pattern,
            top.frequency
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use gitlore_core::types::{ContextType, EntityKey, IndexVersion};
    use serde_json::json;

    // 2024-01-01 is a Monday.
    fn commit(i: i64, commit_type: &str) -> EmbeddedEntity {
        EmbeddedEntity {
            key: EntityKey::commit(format!("c{}", i)),
            version: IndexVersion::new("test", 1),
            context_type: ContextType::Commit,
            source_text: String::new(),
            embedding: vec![1.0],
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::days(i),
            metadata: json!({ "commit_type": commit_type }),
        }
    }

    fn tally(commits: &[EmbeddedEntity]) -> CommitTally {
        let mut tally = CommitTally::default();
        tally.add(commits);
        tally
    }

    #[test]
    fn test_type_patterns_need_more_than_five() {
        let mut commits: Vec<_> = (0..6).map(|i| commit(i, "fix")).collect();
        commits.extend((0..5).map(|i| commit(i, "docs")));
        commits.extend((0..8).map(|i| commit(i, "feat")));
        let patterns = tally(&commits).type_patterns();
        let names: Vec<&str> = patterns.iter().map(|p| p.pattern.as_str()).collect();
        assert_eq!(names, vec!["feat_commits", "fix_commits"]);
        assert_eq!(patterns[0].frequency, 8);
    }

    #[test]
    fn test_weekday_split() {
        let commits: Vec<_> = (0..7).map(|i| commit(i, "fix")).collect();
        assert_eq!(tally(&commits).weekday_split(), (5, 2));

        let mut paged = CommitTally::default();
        for page in commits.chunks(3) {
            paged.add(page);
        }
        assert_eq!(paged.weekday_split(), (5, 2));
    }

    #[test]
    fn test_pattern_summary() {
        assert_eq!(pattern_summary(&[]), "No significant patterns detected.");
        let patterns = vec![
            PatternEntry {
                pattern: "bug_fixing".into(),
                frequency: 4,
                examples: vec![],
            },
            PatternEntry {
                pattern: "fix_commits".into(),
                frequency: 7,
                examples: vec![],
            },
        ];
        assert_eq!(
            pattern_summary(&patterns),
            "Identified 2 patterns. Most frequent: fix_commits (7 occurrences)."
        );
    }
}
