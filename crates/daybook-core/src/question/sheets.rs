use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use daybook_types::models::Question;

use super::QuestionSource;
use crate::error::SourceError;

#[derive(Debug, Clone)]
pub struct SheetConfig {
    pub base_url: String,
    /// Empty when no sheet is configured; every fetch then reports the
    /// source as unavailable and callers fall back.
    pub sheet_id: String,
    /// A1 range holding `id | text` rows, header excluded.
    pub range: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Question source backed by a spreadsheet values API
/// (`GET {base}/spreadsheets/{id}/values/{range}`).
pub struct SheetQuestionSource {
    client: reqwest::Client,
    config: SheetConfig,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl SheetQuestionSource {
    pub fn new(config: SheetConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn values_url(&self) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| SourceError::Unavailable(format!("invalid base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Unavailable("base url cannot carry a path".into()))?
            .pop_if_empty()
            .extend([
                "spreadsheets",
                self.config.sheet_id.as_str(),
                "values",
                self.config.range.as_str(),
            ]);
        if let Some(key) = &self.config.api_key {
            url.query_pairs_mut().append_pair("key", key);
        }
        Ok(url)
    }
}

impl QuestionSource for SheetQuestionSource {
    async fn fetch_row(&self, id: i64) -> Result<Question, SourceError> {
        self.fetch_all()
            .await?
            .into_iter()
            .find(|q| q.id == id)
            .ok_or(SourceError::NotFound(id))
    }

    async fn fetch_all(&self) -> Result<Vec<Question>, SourceError> {
        if self.config.sheet_id.is_empty() {
            return Err(SourceError::Unavailable("no question sheet configured".into()));
        }

        let resp = self.client.get(self.values_url()?).send().await?;
        match resp.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SourceError::Unavailable(format!(
                    "question sheet rejected credentials ({})",
                    resp.status()
                )));
            }
            s => {
                return Err(SourceError::Unavailable(format!("question sheet returned {}", s)));
            }
        }

        let body: ValueRange = resp.json().await?;
        let questions = parse_rows(&body.values)?;
        debug!("Fetched {} questions from sheet", questions.len());
        Ok(questions)
    }
}

/// Turns positional `[id, text]` rows into typed questions. Blank rows are
/// skipped; anything else that does not parse is rejected.
pub(crate) fn parse_rows(rows: &[Vec<Value>]) -> Result<Vec<Question>, SourceError> {
    let mut questions = Vec::with_capacity(rows.len());

    for (row, cells) in rows.iter().enumerate() {
        if cells.iter().all(is_blank) {
            continue;
        }
        let malformed = |reason: &str| SourceError::Malformed {
            row,
            reason: reason.to_string(),
        };

        let id = match cells.first() {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| malformed("id is not an integer"))?;
        if id < 1 {
            return Err(malformed("id must be at least 1"));
        }

        let text = match cells.get(1) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(malformed("question text is missing")),
        };

        questions.push(Question { id, text });
    }

    Ok(questions)
}

fn is_blank(cell: &Value) -> bool {
    match cell {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
