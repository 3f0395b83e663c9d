use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use daybook_types::models::Analysis;

use super::{ANALYSIS_THRESHOLD, AnalysisGenerator, AnalysisOutcome, BatchItem};
use crate::error::{Error, GenerationError, Result};
use crate::locks::UserLocks;
use crate::store::{AnalysisStore, EntryStore, run_blocking};

/// Turns a user's backlog of unanalyzed entries into one analysis.
///
/// A run holds that user's lock from counting through committing, so two
/// concurrent runs for the same user never see the same backlog. Runs for
/// different users proceed independently.
pub struct AnalysisPipeline<S, G> {
    store: Arc<S>,
    generator: Arc<G>,
    locks: UserLocks,
    generation_timeout: Duration,
}

impl<S, G> AnalysisPipeline<S, G>
where
    S: EntryStore + AnalysisStore,
    G: AnalysisGenerator,
{
    pub fn new(store: Arc<S>, generator: Arc<G>, generation_timeout: Duration) -> Self {
        Self {
            store,
            generator,
            locks: UserLocks::default(),
            generation_timeout,
        }
    }

    pub fn threshold(&self) -> usize {
        ANALYSIS_THRESHOLD
    }

    pub async fn count_unanalyzed(&self, owner: Uuid) -> Result<usize> {
        run_blocking(&self.store, move |s| s.count_unanalyzed(owner)).await
    }

    pub async fn list_analyses(&self, owner: Uuid) -> Result<Vec<Analysis>> {
        run_blocking(&self.store, move |s| s.list_analyses(owner)).await
    }

    /// Analyses belonging to someone else are reported exactly like missing ones.
    pub async fn get_analysis(&self, owner: Uuid, id: i64) -> Result<Analysis> {
        run_blocking(&self.store, move |s| s.get_analysis(owner, id))
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn last_analyzed_at(&self, owner: Uuid) -> Result<Option<DateTime<Utc>>> {
        run_blocking(&self.store, move |s| s.last_analyzed_at(owner)).await
    }

    /// Runs the whole workflow for `owner`.
    ///
    /// Nothing is written unless generation succeeds, and the commit is a
    /// single store transaction, so a failed run can be retried from scratch.
    pub async fn run(&self, owner: Uuid) -> Result<AnalysisOutcome> {
        let _guard = self.locks.lock(owner).await;

        let unanalyzed = self.count_unanalyzed(owner).await?;
        if unanalyzed < ANALYSIS_THRESHOLD {
            debug!(%owner, unanalyzed, "Analysis rejected, backlog below threshold");
            return Ok(AnalysisOutcome::InsufficientEntries {
                unanalyzed,
                threshold: ANALYSIS_THRESHOLD,
            });
        }

        let (entry_ids, batch) = run_blocking(&self.store, move |s| load_backlog(s, owner)).await?;
        if batch.len() < ANALYSIS_THRESHOLD {
            return Ok(AnalysisOutcome::InsufficientEntries {
                unanalyzed: batch.len(),
                threshold: ANALYSIS_THRESHOLD,
            });
        }

        info!(%owner, entries = batch.len(), "Generating analysis");
        let content = self.generate(&batch).await.map_err(|e| {
            warn!(%owner, "Analysis generation failed: {}", e);
            Error::GenerationFailed(e)
        })?;

        let now = Utc::now();
        let analysis = run_blocking(&self.store, move |s| {
            s.commit_analysis(owner, &content, &entry_ids, now)
        })
        .await
        .map_err(|e| {
            error!(%owner, "Failed to commit analysis: {}", e);
            e
        })?;

        info!(
            %owner,
            analysis_id = analysis.id,
            entry_count = analysis.entry_count,
            "Analysis committed"
        );
        Ok(AnalysisOutcome::Created(analysis))
    }

    async fn generate(&self, batch: &[BatchItem]) -> std::result::Result<String, GenerationError> {
        let content = tokio::time::timeout(self.generation_timeout, self.generator.generate(batch))
            .await
            .map_err(|_| GenerationError::Timeout(self.generation_timeout))??;

        if content.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(content)
    }
}

fn load_backlog<S: EntryStore + ?Sized>(
    store: &S,
    owner: Uuid,
) -> anyhow::Result<(Vec<i64>, Vec<BatchItem>)> {
    let entries = store.list_unanalyzed(owner)?;
    let mut ids = Vec::with_capacity(entries.len());
    let mut batch = Vec::with_capacity(entries.len());

    for entry in entries {
        let transcript = store.transcript(owner, entry.id)?;
        ids.push(entry.id);
        batch.push(BatchItem {
            question: entry.question_text,
            answer: entry.answer,
            written_at: entry.created_at,
            transcript,
        });
    }

    Ok((ids, batch))
}
