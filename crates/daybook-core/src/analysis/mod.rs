pub mod chat;
pub mod pipeline;

use std::future::Future;

use chrono::{DateTime, Utc};

use daybook_types::models::{Analysis, ChatMessage};

use crate::error::GenerationError;

pub use chat::{ChatCompletionClient, ChatConfig};
pub use pipeline::AnalysisPipeline;

/// Minimum backlog size before an analysis may be generated.
pub const ANALYSIS_THRESHOLD: usize = 7;

/// One entry as handed to the generator.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub question: String,
    pub answer: String,
    pub written_at: DateTime<Utc>,
    pub transcript: Vec<ChatMessage>,
}

/// Everything the companion sees when replying on an entry.
#[derive(Debug, Clone)]
pub struct CompanionContext {
    pub question: String,
    pub answer: String,
    pub transcript: Vec<ChatMessage>,
    pub message: String,
}

/// External text generator producing the narrative over a backlog.
pub trait AnalysisGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        batch: &[BatchItem],
    ) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

/// External text generator answering the user about a single entry.
pub trait Companion: Send + Sync + 'static {
    fn reply(
        &self,
        context: &CompanionContext,
    ) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

/// Result of a pipeline run that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Created(Analysis),
    /// The backlog is below [`ANALYSIS_THRESHOLD`]; nothing was changed.
    InsufficientEntries { unanalyzed: usize, threshold: usize },
}
