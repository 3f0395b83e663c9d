use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use daybook_types::models::{ChatMessage, ChatRole};

use super::{AnalysisGenerator, BatchItem, Companion, CompanionContext};
use crate::error::GenerationError;

const ANALYSIS_SYSTEM_PROMPT: &str = "You are a thoughtful journaling companion. \
Read the user's recent journal entries and the conversations attached to them, \
then write a warm, honest reflection in the second person. Point out recurring \
themes, shifts in mood, and small signs of growth. Do not diagnose. \
Finish with one gentle question the user could carry into the next week.";

const COMPANION_SYSTEM_PROMPT: &str = "You are a supportive journaling companion. \
The user has answered today's prompt and wants to talk about it. Reply briefly, \
reflect back what you hear, and ask at most one follow-up question.";

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Transport timeout. The pipeline applies its own, usually shorter, bound.
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: String,
}

impl PromptMessage {
    fn system(content: &str) -> Self {
        Self { role: "system", content: content.to_string() }
    }

    fn user(content: String) -> Self {
        Self { role: "user", content }
    }

    fn assistant(content: String) -> Self {
        Self { role: "assistant", content }
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionClient {
    client: reqwest::Client,
    config: ChatConfig,
}

impl ChatCompletionClient {
    pub fn new(config: ChatConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    pub async fn complete(&self, messages: &[PromptMessage]) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": 0.7,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GenerationError::Request(format!("generator returned {}", status)));
        }

        let json: Value = resp.json().await?;
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .map(str::trim)
            .unwrap_or_default();

        if content.is_empty() {
            return Err(GenerationError::Empty);
        }
        debug!("Generator returned {} bytes", content.len());
        Ok(content.to_string())
    }
}

impl AnalysisGenerator for ChatCompletionClient {
    async fn generate(&self, batch: &[BatchItem]) -> Result<String, GenerationError> {
        self.complete(&analysis_prompt(batch)).await
    }
}

impl Companion for ChatCompletionClient {
    async fn reply(&self, context: &CompanionContext) -> Result<String, GenerationError> {
        self.complete(&companion_prompt(context)).await
    }
}

pub(crate) fn analysis_prompt(batch: &[BatchItem]) -> Vec<PromptMessage> {
    let mut body = format!("Here are my last {} journal entries, oldest first.\n", batch.len());

    for (n, item) in batch.iter().enumerate() {
        let _ = write!(
            body,
            "\nEntry {} ({})\nQuestion: {}\nAnswer: {}\n",
            n + 1,
            item.written_at.format("%Y-%m-%d"),
            item.question,
            item.answer,
        );
        if !item.transcript.is_empty() {
            body.push_str("Conversation:\n");
            for message in &item.transcript {
                let _ = writeln!(body, "  {}: {}", speaker(message), message.content);
            }
        }
    }

    vec![PromptMessage::system(ANALYSIS_SYSTEM_PROMPT), PromptMessage::user(body)]
}

pub(crate) fn companion_prompt(context: &CompanionContext) -> Vec<PromptMessage> {
    let mut messages = vec![
        PromptMessage::system(COMPANION_SYSTEM_PROMPT),
        PromptMessage::user(format!(
            "Today's question: {}\nMy answer: {}",
            context.question, context.answer
        )),
    ];

    for message in &context.transcript {
        messages.push(match message.role {
            ChatRole::User => PromptMessage::user(message.content.clone()),
            ChatRole::Companion => PromptMessage::assistant(message.content.clone()),
        });
    }
    messages.push(PromptMessage::user(context.message.clone()));
    messages
}

fn speaker(message: &ChatMessage) -> &'static str {
    match message.role {
        ChatRole::User => "Me",
        ChatRole::Companion => "Companion",
    }
}
