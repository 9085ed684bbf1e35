//! Error types for the query engine.

use gitlore_core::error::LoreError;
use gitlore_insight::InsightError;

/// Errors returned to the caller of [`crate::QueryRouter::answer`].
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Question must not be empty")]
    EmptyQuestion,
    #[error("Invalid keyword pattern: {0}")]
    InvalidPattern(String),
    #[error(transparent)]
    Lore(#[from] LoreError),
    #[error("Analysis error: {0}")]
    Insight(#[from] InsightError),
}
