//! "Find commits similar to ..." questions.

use async_trait::async_trait;
use tracing::debug;

use gitlore_core::types::ContextType;
use gitlore_vector::{EntityRef, SearchScope};

use crate::answer::{AnswerType, EntityMatch, HandlerOutput, Insight, QueryContext, SupportingData};
use crate::error::QueryError;
use crate::handler::{count_in_order, most_frequent};
use crate::router::QueryHandler;
use crate::services::QueryServices;

/// Ranks stored commits by similarity to the question.
pub struct SemanticHandler;

#[async_trait]
impl QueryHandler for SemanticHandler {
    fn answer_type(&self) -> AnswerType {
        AnswerType::SemanticSearch
    }

    async fn handle(
        &self,
        question: &str,
        context: &QueryContext,
        services: &QueryServices,
    ) -> Result<HandlerOutput, QueryError> {
        let top_k = services.settings.semantic_top_k;
        let query = services
            .manager
            .generate_embedding(question, ContextType::Commit)
            .await?;
        let hits = services
            .store
            .semantic_search(&query, &SearchScope::commits(), top_k)
            .await?;
        let results: Vec<EntityMatch> = hits.iter().map(EntityMatch::from).collect();

        let mut insights = Vec::new();
        let types = count_in_order(
            results
                .iter()
                .map(|r| r.commit_type.as_deref().unwrap_or("other")),
        );
        if let Some((dominant, n)) = most_frequent(&types) {
            insights.push(Insight::new(
                "pattern",
                format!(
                    "Most similar commits are of type '{}' ({} out of {})",
                    dominant,
                    n,
                    results.len()
                ),
            ));
        }

        let mut related_changes = None;
        if let (Some(path), false) = (&context.file_path, results.is_empty()) {
            let related: Vec<EntityMatch> = services
                .store
                .find_similar_entities(&EntityRef::File(path.clone()), top_k)
                .await?
                .iter()
                .map(EntityMatch::from)
                .collect();
            debug!(file = %path, related = related.len(), "Related changes found");
            if !related.is_empty() {
                insights.push(Insight::new(
                    "related_work",
                    format!("Found {} files with similar change patterns", related.len()),
                ));
            }
            related_changes = Some(related);
        }

        let summary = semantic_summary(&results);
        Ok(HandlerOutput::new(
            SupportingData::Semantic {
                results,
                related_changes,
            },
            summary,
        )
        .with_insights(insights))
    }
}

pub(crate) fn semantic_summary(results: &[EntityMatch]) -> String {
    let Some(top) = results.first() else {
        return "No semantically similar commits found.".to_string();
    };
    let avg = results.iter().map(|r| r.similarity).sum::<f64>() / results.len() as f64;
    let headline: String = top.headline.chars().take(100).collect();
    format!(
        "Found {} semantically similar commits with average similarity of {:.2}. Top match: '{}...'",
        results.len(),
        avg,
        headline
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gitlore_core::types::EntityKey;

    fn hit(message: &str, similarity: f64) -> EntityMatch {
        EntityMatch {
            key: EntityKey::commit("abc"),
            headline: message.to_string(),
            commit_type: None,
            author: None,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            similarity,
        }
    }

    #[test]
    fn test_semantic_summary_empty() {
        assert_eq!(semantic_summary(&[]), "No semantically similar commits found.");
    }

    #[test]
    fn test_semantic_summary_counts_and_average() {
        let summary = semantic_summary(&[hit("refactor auth module", 0.9), hit("add login", 0.6)]);
        assert_eq!(
            summary,
            "Found 2 semantically similar commits with average similarity of 0.75. Top match: 'refactor auth module...'"
        );
    }
}
