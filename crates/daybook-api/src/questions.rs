use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::info;

use daybook_core::Error;
use daybook_core::question::QuestionSource;
use daybook_types::api::{Claims, CursorResponse, SetCursorRequest};

use crate::error::ApiError;
use crate::middleware::require_admin;
use crate::state::AppState;

/// GET /questions/today returns the same question for every user on a given day.
pub async fn today(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.today.get().await?))
}

/// GET /admin/questions/current: question at the cursor, without advancing.
pub async fn current(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;
    Ok(Json(state.sequencer().get_current().await?))
}

/// GET /admin/questions: every question the source holds.
pub async fn list_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;
    let questions = state
        .sequencer()
        .source()
        .fetch_all()
        .await
        .map_err(Error::SourceUnavailable)?;
    Ok(Json(questions))
}

/// GET /admin/questions/cursor
pub async fn get_cursor(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;
    Ok(Json(CursorResponse { index: state.sequencer().cursor().await }))
}

/// PUT /admin/questions/cursor: override the sequence. Today's cached
/// question is dropped so the override is visible immediately.
pub async fn set_cursor(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetCursorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;
    state.sequencer().set_cursor(req.index).await?;
    state.today.invalidate().await;
    info!("Question cursor overridden to {} by {}", req.index, claims.username);

    Ok(Json(CursorResponse { index: req.index }))
}
