use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use daybook_types::models::{DailyQuestion, Question};

use super::{QuestionSource, fallback_question};
use crate::error::{Error, Result, SourceError};
use crate::store::{SequencerState, SequencerStore, ServedQuestion, run_blocking};

/// Walks the question source one ID per call, sharing a single cursor across
/// every user of the process.
///
/// The state lock is held for the whole read-fetch-write of
/// [`advance_and_get`](Self::advance_and_get), so two concurrent callers never
/// receive the same question. [`set_cursor`](Self::set_cursor) takes the same
/// lock.
pub struct QuestionSequencer<Q> {
    source: Q,
    state: Mutex<SequencerState>,
    store: Option<Arc<dyn SequencerStore>>,
}

impl<Q: QuestionSource> QuestionSequencer<Q> {
    /// In-memory cursor starting at 1.
    pub fn new(source: Q) -> Self {
        Self {
            source,
            state: Mutex::new(SequencerState::default()),
            store: None,
        }
    }

    /// State written through to `store` and restored from it on startup.
    pub async fn with_store(source: Q, store: Arc<dyn SequencerStore>) -> Result<Self> {
        let state = match run_blocking(&store, |s| s.load_sequencer()).await? {
            Some(state) if state.cursor >= 1 => state,
            Some(state) => {
                warn!("Stored question cursor {} is invalid, starting from 1", state.cursor);
                SequencerState { cursor: 1, ..state }
            }
            None => SequencerState::default(),
        };
        info!("Question sequencer starting at index {}", state.cursor);

        Ok(Self {
            source,
            state: Mutex::new(state),
            store: Some(store),
        })
    }

    pub fn source(&self) -> &Q {
        &self.source
    }

    /// Current cursor value.
    pub async fn cursor(&self) -> i64 {
        self.state.lock().await.cursor
    }

    /// The question the sequence served for `day`, if it served one.
    pub async fn served_on(&self, day: NaiveDate) -> Option<Question> {
        let state = self.state.lock().await;
        state
            .served
            .as_ref()
            .filter(|served| served.day == day)
            .map(|served| served.question.clone())
    }

    pub async fn advance_and_get(&self) -> Result<DailyQuestion> {
        self.advance_and_get_on(Utc::now().date_naive()).await
    }

    /// Returns the question at the cursor and moves the cursor past it.
    ///
    /// A missing row wraps the sequence back to 1. Any other source failure
    /// leaves the cursor where it was and serves the fallback prompt for
    /// `day`, so this only fails when the source is reachable but has no
    /// question 1.
    pub async fn advance_and_get_on(&self, day: NaiveDate) -> Result<DailyQuestion> {
        let mut state = self.state.lock().await;
        let index = state.cursor;

        match self.source.fetch_row(index).await {
            Ok(question) => {
                self.serve(&mut state, index + 1, day, &question).await;
                debug!("Question {} served, cursor now {}", question.id, state.cursor);
                Ok(DailyQuestion::sequence(question))
            }
            Err(SourceError::NotFound(_)) => {
                info!("No question at index {}, wrapping sequence to 1", index);
                match self.source.fetch_row(1).await {
                    Ok(question) => {
                        self.serve(&mut state, 2, day, &question).await;
                        Ok(DailyQuestion::sequence(question))
                    }
                    Err(SourceError::NotFound(_)) => {
                        let served = state.served.clone();
                        self.commit(&mut state, SequencerState { cursor: 1, served }).await;
                        warn!("Question source has no question 1; sequence exhausted");
                        Err(Error::SourceExhausted(index))
                    }
                    Err(e) => Ok(self.fallback(day, e)),
                }
            }
            Err(e) => Ok(self.fallback(day, e)),
        }
    }

    /// Looks up the question at the cursor without moving it. Source
    /// failures are returned, never replaced by a fallback prompt.
    pub async fn get_current(&self) -> Result<Question> {
        let index = self.cursor().await;

        match self.source.fetch_row(index).await {
            Ok(question) => Ok(question),
            Err(SourceError::NotFound(_)) => match self.source.fetch_row(1).await {
                Ok(question) => Ok(question),
                Err(SourceError::NotFound(_)) => Err(Error::SourceExhausted(index)),
                Err(e) => Err(Error::SourceUnavailable(e)),
            },
            Err(e) => Err(Error::SourceUnavailable(e)),
        }
    }

    /// Administrative override. The next [`advance_and_get`](Self::advance_and_get)
    /// serves question `index`, and the record of today's question is dropped.
    pub async fn set_cursor(&self, index: i64) -> Result<()> {
        if index < 1 {
            return Err(Error::InvalidArgument(format!(
                "question cursor must be at least 1, got {}",
                index
            )));
        }

        let mut state = self.state.lock().await;
        let previous = state.cursor;
        self.commit(&mut state, SequencerState { cursor: index, served: None }).await;
        info!("Question cursor set from {} to {}", previous, index);
        Ok(())
    }

    pub async fn reset_for_testing(&self) {
        let mut state = self.state.lock().await;
        self.commit(&mut state, SequencerState::default()).await;
    }

    async fn serve(&self, state: &mut SequencerState, cursor: i64, day: NaiveDate, question: &Question) {
        let served = Some(ServedQuestion { day, question: question.clone() });
        self.commit(state, SequencerState { cursor, served }).await;
    }

    async fn commit(&self, state: &mut SequencerState, next: SequencerState) {
        *state = next;
        let Some(store) = &self.store else {
            return;
        };

        // The in-memory value stays authoritative for this process.
        let snapshot = state.clone();
        if let Err(e) = run_blocking(store, move |s| s.save_sequencer(&snapshot)).await {
            warn!("Failed to persist question cursor {}: {}", state.cursor, e);
        }
    }

    fn fallback(&self, day: NaiveDate, cause: SourceError) -> DailyQuestion {
        let question = fallback_question(day);
        warn!(
            "Question source failed ({}), serving fallback prompt {} for {}",
            cause, question.id, day
        );
        DailyQuestion::fallback(question)
    }
}
