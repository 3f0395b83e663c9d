use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ChatMessage;

// -- JWT Claims --

/// Claims issued by the external identity provider. Daybook only verifies
/// them; it never mints tokens for end users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
    #[serde(default)]
    pub admin: bool,
}

// -- Questions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetCursorRequest {
    pub index: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CursorResponse {
    pub index: i64,
}

// -- Entries --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateEntryRequest {
    pub question_id: i64,
    pub question_text: String,
    pub answer: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShareRequest {
    pub public: bool,
}

/// Public view of a shared entry. Owner identity and watermark stay private.
#[derive(Debug, Serialize, Deserialize)]
pub struct SharedEntryResponse {
    pub question_text: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

// -- Conversation --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationTurnResponse {
    pub message: ChatMessage,
    pub reply: ChatMessage,
}

// -- Analyses --

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisStatusResponse {
    pub unanalyzed: usize,
    pub threshold: usize,
    pub eligible: bool,
    pub last_analyzed_at: Option<DateTime<Utc>>,
}

/// Body returned when an analysis is requested before the backlog is large enough.
#[derive(Debug, Serialize, Deserialize)]
pub struct InsufficientEntriesResponse {
    pub error: String,
    pub unanalyzed: usize,
    pub threshold: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
