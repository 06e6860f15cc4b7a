//! Error types for the vocabulary builder.
//!
//! Per-word failures never reach this type: the translator and enricher absorb
//! them and record empty fields. What remains are run-level and caller-level
//! failures that need distinct handling.

use crate::retry::ServiceError;
use std::path::PathBuf;

/// Result type alias using [`VocabError`].
pub type Result<T> = std::result::Result<T, VocabError>;

/// Errors surfaced by the loader, store, query and export layers.
#[derive(Debug, thiserror::Error)]
pub enum VocabError {
    /// Neither a local copy nor a reachable remote word source exists.
    #[error("Word source not found: {0}")]
    SourceNotFound(String),

    /// The word source was readable but produced no words after normalization.
    #[error("Word source is empty: {0}")]
    EmptySource(String),

    /// The vocabulary dataset has not been built yet.
    #[error("Vocabulary file not found at {}. Run the pipeline first.", .0.display())]
    StoreMissing(PathBuf),

    /// A single-word lookup found no match.
    #[error("Word not found: {0}")]
    NotFound(String),

    /// Export was requested for a dataset without any translations.
    #[error("Translation must be done before exporting a deck")]
    TranslationRequired,

    /// The target language code is not in the supported table.
    #[error("Language '{0}' not supported")]
    UnsupportedLanguage(String),

    /// A remote service failed outside the per-word retry boundary.
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write errors.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite errors while writing the flashcard collection.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Flashcard package assembly errors.
    #[error("Package error: {0}")]
    Package(String),
}

impl VocabError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        VocabError::Config(msg.into())
    }

    /// Whether the caller should retry later rather than fix its input.
    ///
    /// Rate limits, unavailable upstreams and timeouts are degraded-service
    /// conditions; everything else is a permanent problem with the request or
    /// the local state.
    pub fn is_retry_later(&self) -> bool {
        match self {
            VocabError::Service(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether this error means the dataset has not been built.
    pub fn is_store_missing(&self) -> bool {
        matches!(self, VocabError::StoreMissing(_))
    }
}

impl From<zip::result::ZipError> for VocabError {
    fn from(e: zip::result::ZipError) -> Self {
        VocabError::Package(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::ServiceErrorKind;

    #[test]
    fn test_retry_later_for_transient_service_errors() {
        let err = VocabError::from(ServiceError::new(ServiceErrorKind::RateLimited, "429"));
        assert!(err.is_retry_later());

        let err = VocabError::from(ServiceError::new(ServiceErrorKind::Unavailable, "503"));
        assert!(err.is_retry_later());
    }

    #[test]
    fn test_permanent_errors_are_not_retry_later() {
        assert!(!VocabError::UnsupportedLanguage("xx".into()).is_retry_later());
        assert!(!VocabError::TranslationRequired.is_retry_later());
        assert!(!VocabError::StoreMissing(PathBuf::from("x.csv")).is_retry_later());

        let err = VocabError::from(ServiceError::new(ServiceErrorKind::Rejected, "400"));
        assert!(!err.is_retry_later());
    }

    #[test]
    fn test_store_missing_is_distinct() {
        assert!(VocabError::StoreMissing(PathBuf::from("x.csv")).is_store_missing());
        assert!(!VocabError::NotFound("cat".into()).is_store_missing());
    }
}
