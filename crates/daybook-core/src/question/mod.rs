pub mod daily;
pub mod fallback;
pub mod sequencer;
pub mod sheets;

use std::future::Future;

use daybook_types::models::Question;

use crate::error::SourceError;

pub use daily::TodaysQuestion;
pub use fallback::{fallback_question, is_fallback_id};
pub use sequencer::QuestionSequencer;
pub use sheets::{SheetConfig, SheetQuestionSource};

/// Remote table of questions keyed by sequential integer IDs starting at 1.
///
/// Implementations must report "no such row" as [`SourceError::NotFound`]
/// and everything else (transport, auth, bad payload) as one of the other
/// variants. The sequencer treats the two very differently.
pub trait QuestionSource: Send + Sync + 'static {
    fn fetch_row(&self, id: i64) -> impl Future<Output = Result<Question, SourceError>> + Send;

    fn fetch_all(&self) -> impl Future<Output = Result<Vec<Question>, SourceError>> + Send;
}
