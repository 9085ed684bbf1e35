use gitlore_core::error::LoreError;
use thiserror::Error;

/// Errors that can occur in the insight pipeline.
#[derive(Error, Debug)]
pub enum InsightError {
    #[error("store error: {0}")]
    Store(#[from] LoreError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_input() {
        let e = InsightError::InvalidInput("k must be positive".to_string());
        assert_eq!(e.to_string(), "invalid input: k must be positive");
    }

    #[test]
    fn test_error_from_lore_error() {
        let e: InsightError = LoreError::StoreUnavailable("db offline".into()).into();
        assert!(matches!(e, InsightError::Store(_)));
        assert_eq!(e.to_string(), "store error: Store unavailable: db offline");
    }

    #[test]
    fn test_error_is_debug() {
        let e = InsightError::InvalidInput("test".to_string());
        let debug = format!("{:?}", e);
        assert!(debug.contains("InvalidInput"));
    }
}
