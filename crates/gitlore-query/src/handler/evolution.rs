//! "How did X evolve?" questions.

use std::collections::BTreeMap;

use async_trait::async_trait;

use chrono::NaiveDate;

use gitlore_core::types::{EmbeddedEntity, EntityKind};
use gitlore_insight::{ClusterReport, DriftReport};

use crate::answer::{AnswerType, HandlerOutput, Insight, QueryContext, SupportingData, TimelineDay};
use crate::error::QueryError;
use crate::handler::FirstSeen;
use crate::router::QueryHandler;
use crate::services::QueryServices;

/// Days reported in the activity timeline, earliest first.
const MAX_TIMELINE_DAYS: usize = 365;

/// Combines file drift, commit clusters and a daily activity timeline.
pub struct EvolutionHandler;

#[async_trait]
impl QueryHandler for EvolutionHandler {
    fn answer_type(&self) -> AnswerType {
        AnswerType::EvolutionAnalysis
    }

    async fn handle(
        &self,
        _question: &str,
        context: &QueryContext,
        services: &QueryServices,
    ) -> Result<HandlerOutput, QueryError> {
        let mut insights = Vec::new();

        let drift = match &context.file_path {
            Some(path) => {
                let report = services.drift.analyze_drift(&services.store, path).await?;
                insights.push(Insight::new("semantic_drift", report.interpretation.clone()));
                Some(report)
            }
            None => None,
        };

        let clusters = services
            .clusters
            .analyze_store(&services.store, EntityKind::Commit, services.settings.cluster_k)
            .await?;
        if clusters.num_clusters > 0 {
            insights.push(Insight::new(
                "development_phases",
                format!("Identified {} distinct development patterns", clusters.num_clusters),
            ));
        }

        let mut tally = TimelineTally::default();
        services
            .store
            .visit_metadata(EntityKind::Commit, |page| tally.add(page))
            .await?;
        let timeline = tally.finish();

        let summary = evolution_summary(&timeline, &clusters, drift.as_ref());
        Ok(HandlerOutput::new(
            SupportingData::Evolution {
                drift,
                clusters,
                timeline,
            },
            summary,
        )
        .with_insights(insights))
    }
}

#[derive(Debug, Default)]
struct DayTally {
    commits: usize,
    types: FirstSeen<()>,
}

/// Commits per UTC day with their distinct commit types, built one page
/// at a time. Only the earliest days are kept.
#[derive(Debug, Default)]
pub(crate) struct TimelineTally {
    days: BTreeMap<NaiveDate, DayTally>,
}

impl TimelineTally {
    pub(crate) fn add(&mut self, commits: &[EmbeddedEntity]) {
        for commit in commits {
            let day = self.days.entry(commit.timestamp.date_naive()).or_default();
            day.commits += 1;
            if let Some(commit_type) = commit.commit_type() {
                day.types.entry(commit_type);
            }
            if self.days.len() > MAX_TIMELINE_DAYS {
                self.days.pop_last();
            }
        }
    }

    pub(crate) fn finish(self) -> Vec<TimelineDay> {
        self.days
            .into_iter()
            .map(|(date, day)| TimelineDay {
                date,
                commits: day.commits,
                types: day.types.into_keys(),
            })
            .collect()
    }
}

fn evolution_summary(
    timeline: &[TimelineDay],
    clusters: &ClusterReport,
    drift: Option<&DriftReport>,
) -> String {
    let mut summary = format!(
        "Repository shows {} days of activity with {} distinct development patterns.",
        timeline.len(),
        clusters.num_clusters
    );
    if let Some(drift) = drift {
        summary.push(' ');
        summary.push_str(&drift.interpretation);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use gitlore_core::types::{ContextType, EntityKey, IndexVersion};
    use serde_json::json;

    fn commit(sha: &str, hours: i64, commit_type: Option<&str>) -> EmbeddedEntity {
        EmbeddedEntity {
            key: EntityKey::commit(sha),
            version: IndexVersion::new("test", 1),
            context_type: ContextType::Commit,
            source_text: sha.to_string(),
            embedding: vec![1.0],
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap() + Duration::hours(hours),
            metadata: json!({ "commit_type": commit_type }),
        }
    }

    fn daily_timeline(commits: &[EmbeddedEntity]) -> Vec<TimelineDay> {
        let mut tally = TimelineTally::default();
        tally.add(commits);
        tally.finish()
    }

    #[test]
    fn test_daily_timeline_groups_by_day() {
        let commits = vec![
            commit("a", 0, Some("feat")),
            commit("b", 1, Some("fix")),
            commit("c", 2, Some("feat")),
            commit("d", 5, None),
            commit("e", 30, Some("docs")),
        ];
        let timeline = daily_timeline(&commits);
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline[0].commits, 3);
        assert_eq!(timeline[0].types, vec!["feat", "fix"]);
        assert_eq!(timeline[1].commits, 1);
        assert!(timeline[1].types.is_empty());
        assert_eq!(timeline[2].types, vec!["docs"]);
        assert!(timeline[0].date < timeline[1].date);
    }

    #[test]
    fn test_daily_timeline_caps_days() {
        let commits: Vec<_> = (0..400).map(|d| commit(&format!("c{}", d), d * 24, None)).collect();
        let timeline = daily_timeline(&commits);
        assert_eq!(timeline.len(), MAX_TIMELINE_DAYS);
        assert_eq!(timeline[0].date, commits[0].timestamp.date_naive());
        assert_eq!(
            timeline[MAX_TIMELINE_DAYS - 1].date,
            commits[MAX_TIMELINE_DAYS - 1].timestamp.date_naive()
        );
    }

    #[test]
    fn test_timeline_is_the_same_in_pages() {
        let commits: Vec<_> = (0..12)
            .map(|i| commit(&format!("c{}", i), i * 7, Some(["feat", "fix", "docs"][i as usize % 3])))
            .collect();
        let whole = daily_timeline(&commits);

        let mut tally = TimelineTally::default();
        for page in commits.chunks(5) {
            tally.add(page);
        }
        assert_eq!(tally.finish(), whole);
    }
}
