use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use daybook_core::analysis::AnalysisOutcome;
use daybook_types::api::{AnalysisStatusResponse, Claims, InsufficientEntriesResponse};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /analyses/status: backlog size and whether a run would be accepted.
pub async fn status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let unanalyzed = state.pipeline.count_unanalyzed(claims.sub).await?;
    let last_analyzed_at = state.pipeline.last_analyzed_at(claims.sub).await?;
    let threshold = state.pipeline.threshold();

    Ok(Json(AnalysisStatusResponse {
        unanalyzed,
        threshold,
        eligible: unanalyzed >= threshold,
        last_analyzed_at,
    }))
}

/// POST /analyses: generate an analysis over the caller's whole backlog.
pub async fn run(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ApiError> {
    match state.pipeline.run(claims.sub).await? {
        AnalysisOutcome::Created(analysis) => {
            Ok((StatusCode::CREATED, Json(analysis)).into_response())
        }
        AnalysisOutcome::InsufficientEntries { unanalyzed, threshold } => Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(InsufficientEntriesResponse {
                error: format!("{} of {} entries needed before an analysis", unanalyzed, threshold),
                unanalyzed,
                threshold,
            }),
        )
            .into_response()),
    }
}

/// GET /analyses: caller's analyses, newest first.
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.pipeline.list_analyses(claims.sub).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(analysis_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.pipeline.get_analysis(claims.sub, analysis_id).await?))
}
