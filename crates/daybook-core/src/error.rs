use std::time::Duration;

use thiserror::Error;

/// Failures raised by a question source adapter.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source answered but holds no row with this ID.
    #[error("question {0} not found")]
    NotFound(i64),

    /// Transport, auth or HTTP-level failure.
    #[error("question source unavailable: {0}")]
    Unavailable(String),

    /// A row came back that cannot be parsed into a question.
    #[error("malformed question row {row}: {reason}")]
    Malformed { row: usize, reason: String },
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

/// Failures raised by the text generator adapter.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator request failed: {0}")]
    Request(String),

    #[error("generator returned an empty response")]
    Empty,

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

/// Errors surfaced by the sequencer and the analysis pipeline.
///
/// A backlog below the analysis threshold is not an error; see
/// [`crate::analysis::AnalysisOutcome`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("question source unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),

    #[error("question sequence exhausted: nothing at index {0} or at index 1")]
    SourceExhausted(i64),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("analysis generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),

    #[error("not found")]
    NotFound,
}

impl Error {
    /// Wraps a persistence failure. Store errors are always retriable.
    pub fn store(e: anyhow::Error) -> Self {
        Self::ServiceUnavailable(format!("{e:#}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
