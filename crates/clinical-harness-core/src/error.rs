//! Failure taxonomy for the answer pipeline.
//!
//! None of these are fatal. The pipeline absorbs each one at the point it
//! occurs, degrades to the next defined path and records the event on the
//! returned [`Answer`](crate::pipeline::Answer).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// The snapshot has no index entries, or the query could not be embedded.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Timeout, connection error, non-2xx status or malformed completion body.
    #[error("completion unavailable: {0}")]
    CompletionUnavailable(String),

    /// The sanitizer found nothing usable and emitted the "not available" bullet.
    #[error("no usable content for this query")]
    NoUsableContent,

    /// A correction rule or guard rewrote a known-incorrect fact.
    #[error("corrected known-incorrect fact ({0})")]
    StaleOrIncorrectFact(String),

    /// Vector/document bookkeeping failed during a snapshot rebuild.
    #[error("index error: {0}")]
    Index(String),
}

impl PipelineError {
    /// Short machine-readable code, used in logs and JSON responses.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::RetrievalUnavailable(_) => "retrieval_unavailable",
            PipelineError::CompletionUnavailable(_) => "completion_unavailable",
            PipelineError::NoUsableContent => "no_usable_content",
            PipelineError::StaleOrIncorrectFact(_) => "stale_or_incorrect_fact",
            PipelineError::Index(_) => "index",
        }
    }
}
