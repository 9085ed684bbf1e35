//! "What is the impact of ...?" questions.

use async_trait::async_trait;
use tracing::warn;

use gitlore_core::error::Result as LoreResult;

use crate::answer::{
    AnswerType, HandlerOutput, Impact, Insight, QueryContext, Recommendation, SupportingData,
};
use crate::collaborators::{ComplexitySummary, Hotspots};
use crate::error::QueryError;
use crate::router::QueryHandler;
use crate::services::QueryServices;

/// Changed files and their dependents, breaking changes, and stability
/// recommendations from graph analytics.
pub struct ImpactHandler;

#[async_trait]
impl QueryHandler for ImpactHandler {
    fn answer_type(&self) -> AnswerType {
        AnswerType::ImpactAnalysis
    }

    async fn handle(
        &self,
        _question: &str,
        context: &QueryContext,
        services: &QueryServices,
    ) -> Result<HandlerOutput, QueryError> {
        let graph = &services.graph;
        let mut impacts = Vec::new();
        let mut insights = Vec::new();
        let mut pull_requests = Vec::new();

        if let Some(sha) = &context.commit_sha {
            pull_requests = services.store.pull_requests_for_commit(sha).await?;
            if let Some(insight) = pull_request_insight(sha, &pull_requests) {
                insights.push(insight);
            }
            for change in services.store.changes_for_commit(sha).await? {
                let Some(file) = change.key.file_path() else {
                    continue;
                };
                let potentially_affected = degrade(graph.dependents_of(file).await, "dependents");
                impacts.push(Impact::FileChange {
                    file: file.to_string(),
                    change_type: change.change_type().map(str::to_string),
                    potentially_affected,
                });
            }
        }

        for breaking in degrade(graph.breaking_changes().await, "breaking changes") {
            impacts.push(Impact::BreakingChange {
                commit: breaking.commit,
                message: breaking.message,
                files_affected: breaking.files,
            });
        }

        let hotspots = degrade(graph.hotspots().await, "hotspots");
        let complexity = degrade(graph.complexity().await, "complexity");
        let recommendations = recommendations(&hotspots, &complexity);

        let summary = impact_summary(&impacts, &recommendations);
        Ok(HandlerOutput::new(
            SupportingData::Impact {
                impacts,
                pull_requests,
                hotspots,
                complexity,
                recommendations,
            },
            summary,
        )
        .with_insights(insights))
    }
}

fn pull_request_insight(sha: &str, numbers: &[u64]) -> Option<Insight> {
    if numbers.is_empty() {
        return None;
    }
    let list: Vec<String> = numbers.iter().map(|n| format!("#{}", n)).collect();
    Some(Insight::new(
        "pull_requests",
        format!("Commit {} is part of pull requests {}", sha, list.join(", ")),
    ))
}

/// Graph analytics are optional evidence; a failing collaborator yields an
/// empty aggregate.
fn degrade<T: Default>(result: LoreResult<T>, what: &str) -> T {
    result.unwrap_or_else(|e| {
        warn!(error = %e, what, "Graph analytics unavailable");
        T::default()
    })
}

fn actions(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn recommendations(
    hotspots: &Hotspots,
    complexity: &ComplexitySummary,
) -> Vec<Recommendation> {
    let mut out = Vec::new();
    if !hotspots.bug_hotspots.is_empty() {
        out.push(Recommendation {
            priority: "high".into(),
            category: "technical_debt".into(),
            recommendation: format!(
                "{} files attract frequent bug fixes. Prioritize refactoring efforts.",
                hotspots.bug_hotspots.len()
            ),
            actions: hotspots.bug_hotspots.iter().map(|h| h.file.clone()).collect(),
        });
    }
    if !complexity.high_complexity_files.is_empty() {
        out.push(Recommendation {
            priority: "medium".into(),
            category: "maintainability".into(),
            recommendation: "High complexity files need simplification.".into(),
            actions: actions(&[
                "Break down complex functions",
                "Extract methods",
                "Apply single responsibility principle",
            ]),
        });
    }
    if !hotspots.coupling_hotspots.is_empty() {
        out.push(Recommendation {
            priority: "medium".into(),
            category: "coupling".into(),
            recommendation: "High coupling detected between files.".into(),
            actions: actions(&[
                "Consider extracting shared functionality",
                "Reduce interdependencies",
            ]),
        });
    }
    if !hotspots.author_hotspots.is_empty() {
        out.push(Recommendation {
            priority: "low".into(),
            category: "knowledge_sharing".into(),
            recommendation: "Knowledge silos detected.".into(),
            actions: actions(&[
                "Implement pair programming",
                "Conduct code reviews",
                "Document critical modules",
            ]),
        });
    }
    out
}

fn impact_summary(impacts: &[Impact], recommendations: &[Recommendation]) -> String {
    let breaking = impacts
        .iter()
        .filter(|i| matches!(i, Impact::BreakingChange { .. }))
        .count();
    let mut parts = vec![format!("Identified {} potential impacts.", impacts.len())];
    if breaking > 0 {
        parts.push(format!("Warning: {} breaking changes detected.", breaking));
    }
    if !recommendations.is_empty() {
        parts.push(format!(
            "Generated {} recommendations for maintaining stability.",
            recommendations.len()
        ));
    }
    parts.join(" ")
}
