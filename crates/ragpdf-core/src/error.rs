use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the pipeline.
///
/// Backend variants keep "service down" (`GenerationUnavailable`,
/// `EmbeddingUnavailable`) apart from "resource missing" (`ModelNotFound`)
/// because the user fixes them differently.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unreadable PDF: {0}")]
    UnreadablePdf(String),

    #[error("No extractable text in document: {0}")]
    EmptyDocument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Embedding model unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Generation backend unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Model '{model}' not found: {detail}")]
    ModelNotFound { model: String, detail: String },

    #[error("Generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    #[error("No passage above the similarity threshold")]
    NoRelevantContext,

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Vector store failure: {0}")]
    Storage(String),

    #[error("Operation not valid in state {0}")]
    InvalidState(String),

    #[error("Session busy: {0} already in progress")]
    Busy(String),
}

impl Error {
    /// True for failures the user can retry once a local service is back up.
    pub fn is_backend_down(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingUnavailable(_) | Error::GenerationUnavailable(_) | Error::GenerationTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
