use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, info};

use daybook_core::analysis::{Companion, CompanionContext};
use daybook_core::{Error, GenerationError};
use daybook_types::api::{Claims, ConversationTurnResponse, PostMessageRequest};

use crate::error::ApiError;
use crate::state::{AppState, with_db};

const MAX_MESSAGE_LEN: usize = 4_000;

/// GET /entries/{id}/messages: companion conversation on an entry, oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(entry_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let owner = claims.sub;
    let messages = with_db(&state, move |db| db.list_messages(owner, entry_id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(messages))
}

/// POST /entries/{id}/messages: ask the companion about an entry.
///
/// Nothing is stored unless the companion replies; a failed turn leaves the
/// transcript as it was so the user can simply resend.
pub async fn post_message(
    State(state): State<AppState>,
    Path(entry_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() || content.chars().count() > MAX_MESSAGE_LEN {
        return Err(StatusCode::BAD_REQUEST.into());
    }

    let owner = claims.sub;
    let (entry, transcript) = with_db(&state, move |db| {
        let Some(entry) = db.get_entry(owner, entry_id)? else {
            return Ok(None);
        };
        let transcript = db.list_messages(owner, entry_id)?.unwrap_or_default();
        Ok(Some((entry, transcript)))
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    let context = CompanionContext {
        question: entry.question_text,
        answer: entry.answer,
        transcript,
        message: content.clone(),
    };

    debug!("Companion turn on entry {} ({} prior messages)", entry_id, context.transcript.len());
    let reply = tokio::time::timeout(state.companion_timeout, state.companion.reply(&context))
        .await
        .map_err(|_| Error::GenerationFailed(GenerationError::Timeout(state.companion_timeout)))?
        .map_err(Error::GenerationFailed)?;

    let (message, reply) = with_db(&state, move |db| {
        db.insert_conversation_turn(owner, entry_id, &content, &reply, chrono::Utc::now())
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    info!("Companion replied on entry {} for {}", entry_id, claims.username);
    Ok((StatusCode::CREATED, Json(ConversationTurnResponse { message, reply })))
}
