//! Database row types: these map directly to SQLite rows.
//! Distinct from daybook-types models to keep the DB layer independent.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::Row;
use uuid::Uuid;

use daybook_types::models::{Analysis, ChatMessage, ChatRole, Entry};

pub struct EntryRow {
    pub id: i64,
    pub owner_id: String,
    pub question_id: i64,
    pub question_text: String,
    pub answer: String,
    pub created_at: String,
    pub share_public: bool,
    pub share_token: Option<String>,
    pub analyzed_at: Option<String>,
}

pub struct MessageRow {
    pub id: i64,
    pub entry_id: i64,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

pub struct AnalysisRow {
    pub id: i64,
    pub owner_id: String,
    pub content: String,
    pub entry_count: i64,
    pub created_at: String,
}

pub(crate) const ENTRY_COLUMNS: &str = "id, owner_id, question_id, question_text, answer, created_at, \
     share_public, share_token, analyzed_at";

pub(crate) const MESSAGE_COLUMNS: &str = "id, entry_id, role, content, created_at";

pub(crate) const ANALYSIS_COLUMNS: &str = "id, owner_id, content, entry_count, created_at";

impl EntryRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            question_id: row.get(2)?,
            question_text: row.get(3)?,
            answer: row.get(4)?,
            created_at: row.get(5)?,
            share_public: row.get(6)?,
            share_token: row.get(7)?,
            analyzed_at: row.get(8)?,
        })
    }
}

impl MessageRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            entry_id: row.get(1)?,
            role: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl AnalysisRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            content: row.get(2)?,
            entry_count: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl TryFrom<EntryRow> for Entry {
    type Error = anyhow::Error;

    fn try_from(row: EntryRow) -> Result<Self> {
        Ok(Entry {
            id: row.id,
            owner_id: parse_uuid(&row.owner_id)?,
            question_id: row.question_id,
            question_text: row.question_text,
            answer: row.answer,
            created_at: parse_ts(&row.created_at)?,
            share_public: row.share_public,
            share_token: row.share_token,
            analyzed_at: row.analyzed_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(ChatMessage {
            id: row.id,
            entry_id: row.entry_id,
            role: ChatRole::parse(&row.role)
                .ok_or_else(|| anyhow!("Corrupt role '{}' on message {}", row.role, row.id))?,
            content: row.content,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

impl TryFrom<AnalysisRow> for Analysis {
    type Error = anyhow::Error;

    fn try_from(row: AnalysisRow) -> Result<Self> {
        Ok(Analysis {
            id: row.id,
            owner_id: parse_uuid(&row.owner_id)?,
            content: row.content,
            entry_count: row.entry_count,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
pub(crate) fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone. Parse as naive UTC.
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("Corrupt timestamp '{}'", s))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    s.parse().with_context(|| format!("Corrupt user id '{}'", s))
}

pub(crate) fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = anyhow::Error>,
{
    rows.into_iter().map(T::try_from).collect()
}
