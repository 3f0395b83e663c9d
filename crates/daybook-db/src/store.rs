use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use daybook_core::store::{AnalysisStore, EntryStore, SequencerState, SequencerStore};
use daybook_types::models::{Analysis, ChatMessage, Entry};

use crate::Database;

impl EntryStore for Database {
    fn count_unanalyzed(&self, owner: Uuid) -> Result<usize> {
        Database::count_unanalyzed(self, owner)
    }

    fn list_unanalyzed(&self, owner: Uuid) -> Result<Vec<Entry>> {
        Database::list_unanalyzed(self, owner)
    }

    fn transcript(&self, owner: Uuid, entry_id: i64) -> Result<Vec<ChatMessage>> {
        self.list_messages(owner, entry_id)?
            .ok_or_else(|| anyhow::anyhow!("Entry {} not found for {}", entry_id, owner))
    }

    fn mark_analyzed(&self, owner: Uuid, entry_ids: &[i64], at: DateTime<Utc>) -> Result<usize> {
        Database::mark_analyzed(self, owner, entry_ids, at)
    }
}

impl AnalysisStore for Database {
    fn create_analysis(&self, owner: Uuid, content: &str, entry_count: i64) -> Result<Analysis> {
        Database::create_analysis(self, owner, content, entry_count)
    }

    fn list_analyses(&self, owner: Uuid) -> Result<Vec<Analysis>> {
        Database::list_analyses(self, owner)
    }

    fn get_analysis(&self, owner: Uuid, id: i64) -> Result<Option<Analysis>> {
        Database::get_analysis(self, owner, id)
    }

    fn set_last_analyzed_at(&self, owner: Uuid, at: DateTime<Utc>) -> Result<()> {
        Database::set_last_analyzed_at(self, owner, at)
    }

    fn last_analyzed_at(&self, owner: Uuid) -> Result<Option<DateTime<Utc>>> {
        Database::last_analyzed_at(self, owner)
    }

    fn commit_analysis(
        &self,
        owner: Uuid,
        content: &str,
        entry_ids: &[i64],
        at: DateTime<Utc>,
    ) -> Result<Analysis> {
        Database::commit_analysis(self, owner, content, entry_ids, at)
    }
}

impl SequencerStore for Database {
    fn load_sequencer(&self) -> Result<Option<SequencerState>> {
        self.load_sequencer_state()
    }

    fn save_sequencer(&self, state: &SequencerState) -> Result<()> {
        self.save_sequencer_state(state)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;
    use daybook_core::analysis::{AnalysisGenerator, AnalysisOutcome, AnalysisPipeline, BatchItem};
    use daybook_core::error::{GenerationError, SourceError};
    use daybook_core::question::{QuestionSequencer, QuestionSource, TodaysQuestion};
    use daybook_types::models::Question;

    use super::*;

    struct Echo;

    impl AnalysisGenerator for Echo {
        async fn generate(&self, batch: &[BatchItem]) -> Result<String, GenerationError> {
            Ok(format!("{} entries", batch.len()))
        }
    }

    struct Numbered;

    impl QuestionSource for Numbered {
        async fn fetch_row(&self, id: i64) -> Result<Question, SourceError> {
            if (1..=3).contains(&id) {
                Ok(Question { id, text: format!("Question {}", id) })
            } else {
                Err(SourceError::NotFound(id))
            }
        }

        async fn fetch_all(&self) -> Result<Vec<Question>, SourceError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn pipeline_over_sqlite() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let owner = Uuid::new_v4();
        for i in 0..8 {
            db.create_entry(owner, i + 1, "q", "a", Utc::now()).unwrap();
        }

        let pipeline = AnalysisPipeline::new(db.clone(), Arc::new(Echo), Duration::from_secs(5));
        match pipeline.run(owner).await.unwrap() {
            AnalysisOutcome::Created(a) => {
                assert_eq!(a.entry_count, 8);
                assert_eq!(a.content, "8 entries");
            }
            other => panic!("expected an analysis, got {:?}", other),
        }
        assert_eq!(pipeline.count_unanalyzed(owner).await.unwrap(), 0);
        assert!(pipeline.last_analyzed_at(owner).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sequencer_cursor_persists_in_sqlite() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let day = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();

        let seq = QuestionSequencer::with_store(Numbered, db.clone()).await.unwrap();
        assert_eq!(seq.advance_and_get_on(day).await.unwrap().question.id, 1);
        assert_eq!(seq.advance_and_get_on(day).await.unwrap().question.id, 2);
        assert_eq!(db.load_sequencer_state().unwrap().map(|s| s.cursor), Some(3));

        let restarted = QuestionSequencer::with_store(Numbered, db.clone()).await.unwrap();
        assert_eq!(restarted.advance_and_get_on(day).await.unwrap().question.id, 3);
        assert_eq!(restarted.advance_and_get_on(day).await.unwrap().question.id, 1);
        assert_eq!(db.load_sequencer_state().unwrap().map(|s| s.cursor), Some(2));
    }

    #[tokio::test]
    async fn todays_question_survives_restart_in_sqlite() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let day = NaiveDate::from_ymd_opt(2026, 8, 2).unwrap();

        let seq = QuestionSequencer::with_store(Numbered, db.clone()).await.unwrap();
        let today = TodaysQuestion::new(Arc::new(seq));
        assert_eq!(today.get_on(day).await.unwrap().question.id, 1);
        drop(today);

        let seq = QuestionSequencer::with_store(Numbered, db.clone()).await.unwrap();
        let today = TodaysQuestion::new(Arc::new(seq));
        assert_eq!(today.get_on(day).await.unwrap().question.id, 1);
        assert_eq!(today.sequencer().cursor().await, 2);

        let next = day.succ_opt().unwrap();
        assert_eq!(today.get_on(next).await.unwrap().question.id, 2);
    }
}
