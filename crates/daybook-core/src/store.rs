//! Persistence contracts consumed by the sequencer and the analysis pipeline.
//!
//! Implementations are synchronous (the SQLite layer is), so async callers go
//! through [`run_blocking`].

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::error;
use uuid::Uuid;

use daybook_types::models::{Analysis, ChatMessage, Entry, Question};

use crate::error::Error;

pub trait EntryStore: Send + Sync + 'static {
    /// Number of the owner's entries with no `analyzed_at` watermark.
    fn count_unanalyzed(&self, owner: Uuid) -> Result<usize>;

    /// The owner's unanalyzed entries, oldest first.
    fn list_unanalyzed(&self, owner: Uuid) -> Result<Vec<Entry>>;

    /// Conversation attached to one of the owner's entries, oldest first.
    fn transcript(&self, owner: Uuid, entry_id: i64) -> Result<Vec<ChatMessage>>;

    /// Sets the watermark on the listed entries that are still unanalyzed.
    /// Entries that already carry a watermark are left alone, so repeating
    /// the call is harmless. Returns how many entries changed.
    fn mark_analyzed(&self, owner: Uuid, entry_ids: &[i64], at: DateTime<Utc>) -> Result<usize>;
}

pub trait AnalysisStore: Send + Sync + 'static {
    /// Inserts an analysis record on its own. The pipeline uses
    /// [`AnalysisStore::commit_analysis`] instead.
    fn create_analysis(&self, owner: Uuid, content: &str, entry_count: i64) -> Result<Analysis>;

    /// Newest first.
    fn list_analyses(&self, owner: Uuid) -> Result<Vec<Analysis>>;

    fn get_analysis(&self, owner: Uuid, id: i64) -> Result<Option<Analysis>>;

    fn set_last_analyzed_at(&self, owner: Uuid, at: DateTime<Utc>) -> Result<()>;

    fn last_analyzed_at(&self, owner: Uuid) -> Result<Option<DateTime<Utc>>>;

    /// Creates the analysis, watermarks every entry in `entry_ids` and bumps
    /// the owner's last-analysis timestamp as one unit. Either all three
    /// effects are durable or none is. Fails if any listed entry is not an
    /// unanalyzed entry of `owner`.
    fn commit_analysis(
        &self,
        owner: Uuid,
        content: &str,
        entry_ids: &[i64],
        at: DateTime<Utc>,
    ) -> Result<Analysis>;
}

/// The question handed out for one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct ServedQuestion {
    pub day: NaiveDate,
    pub question: Question,
}

/// Everything the question sequencer needs to resume after a restart.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerState {
    pub cursor: i64,
    /// Last question the sequence served, with the day it was served for.
    pub served: Option<ServedQuestion>,
}

impl Default for SequencerState {
    fn default() -> Self {
        Self { cursor: 1, served: None }
    }
}

/// Durable home for the question sequencer's state. Both fields are written
/// together.
pub trait SequencerStore: Send + Sync + 'static {
    fn load_sequencer(&self) -> Result<Option<SequencerState>>;
    fn save_sequencer(&self, state: &SequencerState) -> Result<()>;
}

/// Runs a store call on the blocking pool and maps failures to
/// [`Error::ServiceUnavailable`].
pub(crate) async fn run_blocking<S, T, F>(store: &Arc<S>, f: F) -> crate::Result<T>
where
    S: Send + Sync + 'static + ?Sized,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            Error::ServiceUnavailable("store task failed".into())
        })?
        .map_err(Error::store)
}
