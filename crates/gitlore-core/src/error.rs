use thiserror::Error;

/// Top-level error type for gitlore.
///
/// Provider-side variants (`ProviderUnavailable`, `ProviderTimeout`,
/// `MalformedProviderResponse`) are recovered from locally by the embedding
/// and query layers and normally never reach a caller. `StoreUnavailable` and
/// `InvalidInput` are the ones callers are expected to see.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Provider timed out after {after_ms} ms")]
    ProviderTimeout { after_ms: u64 },

    #[error("Malformed provider response: {0}")]
    MalformedProviderResponse(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index version mismatch: store holds {store}, query uses {query}")]
    VersionMismatch { store: String, query: String },
}

impl LoreError {
    /// True for failures of an external provider that callers degrade around.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            LoreError::ProviderUnavailable(_)
                | LoreError::ProviderTimeout { .. }
                | LoreError::MalformedProviderResponse(_)
        )
    }
}

impl From<toml::de::Error> for LoreError {
    fn from(err: toml::de::Error) -> Self {
        LoreError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LoreError {
    fn from(err: toml::ser::Error) -> Self {
        LoreError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for LoreError {
    fn from(err: serde_json::Error) -> Self {
        LoreError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for gitlore operations.
pub type Result<T> = std::result::Result<T, LoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoreError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_error_display_structured_variants() {
        let err = LoreError::ProviderTimeout { after_ms: 1500 };
        assert_eq!(err.to_string(), "Provider timed out after 1500 ms");

        let err = LoreError::DimensionMismatch {
            expected: 384,
            actual: 1536,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 384, got 1536");

        let err = LoreError::VersionMismatch {
            store: "hashing-v1/256".into(),
            query: "text-embedding-3-small/1536".into(),
        };
        assert!(err.to_string().contains("hashing-v1/256"));
    }

    #[test]
    fn test_provider_failure_classification() {
        assert!(LoreError::ProviderUnavailable("down".into()).is_provider_failure());
        assert!(LoreError::ProviderTimeout { after_ms: 10 }.is_provider_failure());
        assert!(LoreError::MalformedProviderResponse("bad".into()).is_provider_failure());
        assert!(!LoreError::StoreUnavailable("down".into()).is_provider_failure());
        assert!(!LoreError::InvalidInput("empty".into()).is_provider_failure());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LoreError = io_err.into();
        assert!(matches!(err, LoreError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: LoreError = parsed.unwrap_err().into();
        assert!(matches!(err, LoreError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: LoreError = parsed.unwrap_err().into();
        assert!(matches!(err, LoreError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
