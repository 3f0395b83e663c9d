use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::info;

use daybook_core::question::is_fallback_id;
use daybook_types::api::{Claims, CreateEntryRequest, ShareRequest, SharedEntryResponse};

use crate::state::{AppState, with_db};

/// Longest answer accepted, in characters.
const MAX_ANSWER_LEN: usize = 10_000;

/// POST /entries: record the caller's answer to a question.
///
/// One entry per user per day is a client convention; duplicates are stored.
pub async fn create_entry(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateEntryRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let answer = req.answer.trim().to_string();
    if answer.is_empty() || answer.chars().count() > MAX_ANSWER_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    let known_id = req.question_id >= 1 || is_fallback_id(req.question_id);
    if !known_id || req.question_text.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let owner = claims.sub;
    let entry = with_db(&state, move |db| {
        db.create_entry(owner, req.question_id, &req.question_text, &answer, chrono::Utc::now())
    })
    .await?;

    info!("Entry {} created by {}", entry.id, claims.username);
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /entries: caller's entries, newest first.
pub async fn list_entries(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let owner = claims.sub;
    let entries = with_db(&state, move |db| db.list_entries(owner)).await?;
    Ok(Json(entries))
}

pub async fn get_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let owner = claims.sub;
    let entry = with_db(&state, move |db| db.get_entry(owner, entry_id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(entry))
}

/// PUT /entries/{id}/share: toggle the public link for an entry.
pub async fn set_sharing(
    State(state): State<AppState>,
    Path(entry_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ShareRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let owner = claims.sub;
    let token = mint_share_token();
    let entry = with_db(&state, move |db| db.set_entry_sharing(owner, entry_id, req.public, &token))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(entry))
}

/// GET /shared/{token}: public, unauthenticated view of a shared entry.
pub async fn get_shared(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let entry = with_db(&state, move |db| db.get_shared_entry(&token))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(SharedEntryResponse {
        question_text: entry.question_text,
        answer: entry.answer,
        created_at: entry.created_at,
    }))
}

fn mint_share_token() -> String {
    let bytes: [u8; 18] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_tokens_are_url_safe_and_distinct() {
        let a = mint_share_token();
        let b = mint_share_token();
        assert_eq!(a.len(), 24);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
