//! Fallback for questions no keyword route claims.

use async_trait::async_trait;
use tracing::{debug, warn};

use gitlore_core::types::ContextType;

use crate::answer::{AnswerType, EntityMatch, HandlerOutput, QueryContext, SupportingData};
use crate::collaborators::NarrativeItem;
use crate::error::QueryError;
use crate::router::QueryHandler;
use crate::services::QueryServices;

const SUMMARY_FILES: usize = 3;

/// Semantic matches, recommended files and an optional narrative.
pub struct GeneralHandler;

#[async_trait]
impl QueryHandler for GeneralHandler {
    fn answer_type(&self) -> AnswerType {
        AnswerType::General
    }

    async fn handle(
        &self,
        question: &str,
        _context: &QueryContext,
        services: &QueryServices,
    ) -> Result<HandlerOutput, QueryError> {
        let query = services
            .manager
            .generate_embedding(question, ContextType::Commit)
            .await?;
        let recs = services
            .store
            .contextual_recommendations(&query, services.settings.general_top_k)
            .await?;

        let narrative = if services.narrator.is_enabled() && !recs.similar_commits.is_empty() {
            let items: Vec<NarrativeItem> = recs
                .similar_commits
                .iter()
                .take(services.settings.narrative_max_items)
                .map(|hit| NarrativeItem {
                    message: hit.item.headline().to_string(),
                    commit_type: hit.item.commit_type().map(str::to_string),
                    timestamp: hit.item.timestamp,
                })
                .collect();
            match services.narrator.narrate(&items).await {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!(error = %e, "Narrative omitted");
                    None
                }
            }
        } else {
            debug!("Narration skipped");
            None
        };

        let matches: Vec<EntityMatch> = recs.similar_commits.iter().map(EntityMatch::from).collect();
        let summary = general_summary(matches.len(), &recs.suggested_files);

        let mut output = HandlerOutput::new(
            SupportingData::General {
                matches,
                suggested_files: recs.suggested_files,
                commit_types: recs.commit_types,
            },
            summary,
        );
        output.narrative = narrative;
        Ok(output)
    }
}

pub(crate) fn general_summary(matches: usize, suggested_files: &[String]) -> String {
    let mut summary = format!("Found {} relevant commits.", matches);
    if !suggested_files.is_empty() {
        let top: Vec<&str> = suggested_files
            .iter()
            .take(SUMMARY_FILES)
            .map(String::as_str)
            .collect();
        summary.push_str(&format!(" Suggested files to review: {}", top.join(", ")));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_summary_lists_top_three_files() {
        let files: Vec<String> = ["a.rs", "b.rs", "c.rs", "d.rs"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            general_summary(2, &files),
            "Found 2 relevant commits. Suggested files to review: a.rs, b.rs, c.rs"
        );
        assert_eq!(general_summary(0, &[]), "Found 0 relevant commits.");
    }
}
