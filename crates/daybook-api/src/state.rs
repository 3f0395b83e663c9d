use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use tracing::error;

use daybook_core::analysis::{AnalysisPipeline, ChatCompletionClient};
use daybook_core::question::{QuestionSequencer, SheetQuestionSource, TodaysQuestion};
use daybook_db::Database;

pub type Sequencer = QuestionSequencer<SheetQuestionSource>;
pub type Pipeline = AnalysisPipeline<Database, ChatCompletionClient>;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub today: TodaysQuestion<SheetQuestionSource>,
    pub pipeline: Pipeline,
    pub companion: Arc<ChatCompletionClient>,
    pub companion_timeout: Duration,
    pub jwt_secret: String,
}

impl AppStateInner {
    /// Wires the sequencer (cursor persisted in `db`), the analysis pipeline
    /// and the companion around shared clients.
    pub async fn build(
        db: Arc<Database>,
        source: SheetQuestionSource,
        generator: Arc<ChatCompletionClient>,
        generation_timeout: Duration,
        jwt_secret: String,
    ) -> anyhow::Result<AppState> {
        let sequencer = Arc::new(QuestionSequencer::with_store(source, db.clone()).await?);

        Ok(Arc::new(Self {
            today: TodaysQuestion::new(sequencer),
            pipeline: AnalysisPipeline::new(db.clone(), generator.clone(), generation_timeout),
            companion: generator,
            companion_timeout: generation_timeout,
            db,
            jwt_secret,
        }))
    }

    pub fn sequencer(&self) -> &Sequencer {
        self.today.sequencer()
    }
}

/// Run a blocking DB call off the async runtime.
pub(crate) async fn with_db<T, F>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Database error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
