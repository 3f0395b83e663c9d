use axum::{
    Json, Router, middleware,
    routing::{get, post, put},
};
use serde_json::{Value, json};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{analyses, conversation, entries, questions};

/// Full HTTP surface. `/health` and `/shared/{token}` are public, everything
/// else needs a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/shared/{token}", get(entries::get_shared))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/questions/today", get(questions::today))
        .route("/admin/questions", get(questions::list_all))
        .route("/admin/questions/current", get(questions::current))
        .route(
            "/admin/questions/cursor",
            get(questions::get_cursor).put(questions::set_cursor),
        )
        .route("/entries", post(entries::create_entry).get(entries::list_entries))
        .route("/entries/{entry_id}", get(entries::get_entry))
        .route("/entries/{entry_id}/share", put(entries::set_sharing))
        .route(
            "/entries/{entry_id}/messages",
            get(conversation::list_messages).post(conversation::post_message),
        )
        .route("/analyses/status", get(analyses::status))
        .route("/analyses", post(analyses::run).get(analyses::list))
        .route("/analyses/{analysis_id}", get(analyses::get))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
