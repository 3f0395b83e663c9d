use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A journaling prompt. Identity is the integer ID assigned by the question source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
}

/// Where today's prompt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionOrigin {
    /// Read from the external question source at the cursor position.
    Sequence,
    /// Produced locally because the question source was unreachable.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyQuestion {
    #[serde(flatten)]
    pub question: Question,
    pub origin: QuestionOrigin,
}

impl DailyQuestion {
    pub fn sequence(question: Question) -> Self {
        Self { question, origin: QuestionOrigin::Sequence }
    }

    pub fn fallback(question: Question) -> Self {
        Self { question, origin: QuestionOrigin::Fallback }
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == QuestionOrigin::Fallback
    }
}

/// One user's answer to one day's question.
///
/// `analyzed_at == None` means the entry is still part of the user's backlog.
/// Once set it never goes back to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub owner_id: Uuid,
    pub question_id: i64,
    pub question_text: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
    pub share_public: bool,
    pub share_token: Option<String>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Companion,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Companion => "companion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "companion" => Some(Self::Companion),
            _ => None,
        }
    }
}

/// A single turn of the conversation attached to an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub entry_id: i64,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Immutable narrative produced over a batch of entries.
/// `entry_count` is a snapshot taken when the analysis was committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: i64,
    pub owner_id: Uuid,
    pub content: String,
    pub entry_count: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_question_serializes_flat() {
        let q = DailyQuestion::fallback(Question { id: 2, text: "What surprised you?".into() });
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["id"], 2);
        assert_eq!(json["text"], "What surprised you?");
        assert_eq!(json["origin"], "fallback");
    }

    #[test]
    fn chat_role_round_trips_through_str() {
        for role in [ChatRole::User, ChatRole::Companion] {
            assert_eq!(ChatRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(ChatRole::parse("assistant"), None);
    }
}
