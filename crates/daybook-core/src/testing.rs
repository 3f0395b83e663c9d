//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail, ensure};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use daybook_types::models::{Analysis, ChatMessage, ChatRole, Entry, Question};

use crate::analysis::{AnalysisGenerator, BatchItem};
use crate::error::{GenerationError, SourceError};
use crate::question::QuestionSource;
use crate::store::{AnalysisStore, EntryStore, SequencerState, SequencerStore};

// -- Question source --

#[derive(Clone, Default)]
pub struct StaticSource {
    inner: Arc<StaticSourceInner>,
}

#[derive(Default)]
struct StaticSourceInner {
    questions: Vec<Question>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    fetches: AtomicUsize,
}

impl StaticSource {
    /// Questions 1..=n.
    pub fn numbered(n: i64) -> Self {
        let questions = (1..=n)
            .map(|id| Question { id, text: format!("Question {}", id) })
            .collect();
        Self {
            inner: Arc::new(StaticSourceInner { questions, ..Default::default() }),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Every fetch waits this long before answering, like a slow remote.
    pub fn set_delay(&self, delay: Duration) {
        self.inner.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of requests that reached the source.
    pub fn fetches(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }
}

impl QuestionSource for StaticSource {
    async fn fetch_row(&self, id: i64) -> Result<Question, SourceError> {
        self.fetch_all()
            .await?
            .into_iter()
            .find(|q| q.id == id)
            .ok_or(SourceError::NotFound(id))
    }

    async fn fetch_all(&self) -> Result<Vec<Question>, SourceError> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = self.inner.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("connection refused".into()));
        }
        Ok(self.inner.questions.clone())
    }
}

// -- Generator --

pub struct ScriptedGenerator {
    reply: Option<String>,
    hang: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_batch: Mutex<Vec<BatchItem>>,
}

impl ScriptedGenerator {
    fn build(reply: Option<String>, hang: bool) -> Self {
        Self {
            reply,
            hang,
            delay: None,
            calls: AtomicUsize::new(0),
            last_batch: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(reply: &str) -> Self {
        Self::build(Some(reply.to_string()), false)
    }

    pub fn failing() -> Self {
        Self::build(None, false)
    }

    pub fn hanging() -> Self {
        Self::build(None, true)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_batch(&self) -> Vec<BatchItem> {
        self.last_batch.lock().unwrap().clone()
    }
}

impl AnalysisGenerator for ScriptedGenerator {
    async fn generate(&self, batch: &[BatchItem]) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_batch.lock().unwrap() = batch.to_vec();

        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply
            .clone()
            .ok_or_else(|| GenerationError::Request("503 Service Unavailable".into()))
    }
}

// -- Store --

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failing: AtomicBool,
}

#[derive(Default)]
struct MemoryState {
    entries: Vec<Entry>,
    messages: Vec<ChatMessage>,
    analyses: Vec<Analysis>,
    last_analyzed: HashMap<Uuid, DateTime<Utc>>,
    sequencer: Option<SequencerState>,
}

impl MemoryStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Adds `n` unanalyzed entries, one minute apart, and returns their IDs.
    pub fn seed_entries(&self, owner: Uuid, n: usize) -> Vec<i64> {
        let mut state = self.state.lock().unwrap();
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let id = state.entries.len() as i64 + 1;
                state.entries.push(Entry {
                    id,
                    owner_id: owner,
                    question_id: i as i64 + 1,
                    question_text: format!("question {}", i),
                    answer: format!("answer {}", i),
                    created_at: base + chrono::Duration::minutes(i as i64),
                    share_public: false,
                    share_token: None,
                    analyzed_at: None,
                });
                id
            })
            .collect()
    }

    pub fn seed_message(&self, entry_id: i64, content: &str) {
        let mut state = self.state.lock().unwrap();
        let id = state.messages.len() as i64 + 1;
        state.messages.push(ChatMessage {
            id,
            entry_id,
            role: ChatRole::User,
            content: content.to_string(),
            created_at: Utc::now(),
        });
    }

    pub fn entries(&self, owner: Uuid) -> Vec<Entry> {
        let state = self.state.lock().unwrap();
        state.entries.iter().filter(|e| e.owner_id == owner).cloned().collect()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("database is locked");
        }
        Ok(())
    }
}

impl EntryStore for MemoryStore {
    fn count_unanalyzed(&self, owner: Uuid) -> Result<usize> {
        Ok(self.list_unanalyzed(owner)?.len())
    }

    fn list_unanalyzed(&self, owner: Uuid) -> Result<Vec<Entry>> {
        self.check()?;
        let state = self.state.lock().unwrap();
        let mut entries: Vec<Entry> = state
            .entries
            .iter()
            .filter(|e| e.owner_id == owner && e.analyzed_at.is_none())
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.created_at, e.id));
        Ok(entries)
    }

    fn transcript(&self, owner: Uuid, entry_id: i64) -> Result<Vec<ChatMessage>> {
        self.check()?;
        let state = self.state.lock().unwrap();
        ensure!(
            state.entries.iter().any(|e| e.id == entry_id && e.owner_id == owner),
            "entry {} not owned by {}",
            entry_id,
            owner
        );
        Ok(state.messages.iter().filter(|m| m.entry_id == entry_id).cloned().collect())
    }

    fn mark_analyzed(&self, owner: Uuid, entry_ids: &[i64], at: DateTime<Utc>) -> Result<usize> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        Ok(mark(&mut state, owner, entry_ids, at))
    }
}

impl AnalysisStore for MemoryStore {
    fn create_analysis(&self, owner: Uuid, content: &str, entry_count: i64) -> Result<Analysis> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        Ok(insert_analysis(&mut state, owner, content, entry_count, Utc::now()))
    }

    fn list_analyses(&self, owner: Uuid) -> Result<Vec<Analysis>> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state.analyses.iter().rev().filter(|a| a.owner_id == owner).cloned().collect())
    }

    fn get_analysis(&self, owner: Uuid, id: i64) -> Result<Option<Analysis>> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state.analyses.iter().find(|a| a.id == id && a.owner_id == owner).cloned())
    }

    fn set_last_analyzed_at(&self, owner: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.check()?;
        self.state.lock().unwrap().last_analyzed.insert(owner, at);
        Ok(())
    }

    fn last_analyzed_at(&self, owner: Uuid) -> Result<Option<DateTime<Utc>>> {
        self.check()?;
        Ok(self.state.lock().unwrap().last_analyzed.get(&owner).copied())
    }

    fn commit_analysis(
        &self,
        owner: Uuid,
        content: &str,
        entry_ids: &[i64],
        at: DateTime<Utc>,
    ) -> Result<Analysis> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let eligible = entry_ids
            .iter()
            .filter(|id| {
                state
                    .entries
                    .iter()
                    .any(|e| e.id == **id && e.owner_id == owner && e.analyzed_at.is_none())
            })
            .count();
        ensure!(eligible == entry_ids.len(), "backlog changed during analysis");

        let analysis = insert_analysis(&mut state, owner, content, entry_ids.len() as i64, at);
        mark(&mut state, owner, entry_ids, at);
        state.last_analyzed.insert(owner, at);
        Ok(analysis)
    }
}

impl SequencerStore for MemoryStore {
    fn load_sequencer(&self) -> Result<Option<SequencerState>> {
        self.check()?;
        Ok(self.state.lock().unwrap().sequencer.clone())
    }

    fn save_sequencer(&self, state: &SequencerState) -> Result<()> {
        self.check()?;
        self.state.lock().unwrap().sequencer = Some(state.clone());
        Ok(())
    }
}

fn mark(state: &mut MemoryState, owner: Uuid, entry_ids: &[i64], at: DateTime<Utc>) -> usize {
    let mut changed = 0;
    for entry in state.entries.iter_mut() {
        if entry.owner_id == owner && entry.analyzed_at.is_none() && entry_ids.contains(&entry.id) {
            entry.analyzed_at = Some(at);
            changed += 1;
        }
    }
    changed
}

fn insert_analysis(
    state: &mut MemoryState,
    owner: Uuid,
    content: &str,
    entry_count: i64,
    at: DateTime<Utc>,
) -> Analysis {
    let analysis = Analysis {
        id: state.analyses.len() as i64 + 1,
        owner_id: owner,
        content: content.to_string(),
        entry_count,
        created_at: at,
    };
    state.analyses.push(analysis.clone());
    analysis
}
