use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use daybook_types::models::DailyQuestion;

use super::{QuestionSequencer, QuestionSource};
use crate::error::Result;

/// How long a fallback prompt is reused before the source is tried again.
pub const FALLBACK_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Advances the sequencer at most once per UTC calendar day.
///
/// The first request of a day pulls the next question and every later
/// request that day gets the same one, across restarts too: the sequencer
/// persists what it served and for which day. A fallback prompt is reused
/// for [`FALLBACK_RETRY_AFTER`], so requests queued behind a failed attempt
/// are answered from memory and the source is retried once the window ends.
pub struct TodaysQuestion<Q> {
    sequencer: Arc<QuestionSequencer<Q>>,
    cached: Mutex<Option<Cached>>,
    retry_after: Duration,
}

struct Cached {
    day: NaiveDate,
    question: DailyQuestion,
    /// Set for fallbacks only.
    expires: Option<Instant>,
}

impl Cached {
    fn serves(&self, day: NaiveDate, now: Instant) -> bool {
        self.day == day && self.expires.is_none_or(|at| now < at)
    }
}

impl<Q: QuestionSource> TodaysQuestion<Q> {
    pub fn new(sequencer: Arc<QuestionSequencer<Q>>) -> Self {
        Self {
            sequencer,
            cached: Mutex::new(None),
            retry_after: FALLBACK_RETRY_AFTER,
        }
    }

    #[cfg(test)]
    fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn sequencer(&self) -> &Arc<QuestionSequencer<Q>> {
        &self.sequencer
    }

    pub async fn get(&self) -> Result<DailyQuestion> {
        self.get_on(Utc::now().date_naive()).await
    }

    pub async fn get_on(&self, day: NaiveDate) -> Result<DailyQuestion> {
        let mut cached = self.cached.lock().await;
        if let Some(hit) = cached.as_ref().filter(|c| c.serves(day, Instant::now())) {
            return Ok(hit.question.clone());
        }

        if let Some(question) = self.sequencer.served_on(day).await {
            debug!("Question {} already served for {}", question.id, day);
            let question = DailyQuestion::sequence(question);
            *cached = Some(Cached { day, question: question.clone(), expires: None });
            return Ok(question);
        }

        let question = self.sequencer.advance_and_get_on(day).await?;
        let expires = if question.is_fallback() {
            Some(Instant::now() + self.retry_after)
        } else {
            info!("Question {} selected for {}", question.question.id, day);
            None
        };
        *cached = Some(Cached { day, question: question.clone(), expires });
        Ok(question)
    }

    /// Forgets the cached question so an administrative cursor change shows
    /// up on the next request.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
