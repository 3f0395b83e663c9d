use crate::Database;
use crate::models::{ENTRY_COLUMNS, EntryRow, MESSAGE_COLUMNS, MessageRow, collect, format_ts};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, ToSql};
use uuid::Uuid;

use daybook_core::store::{SequencerState, ServedQuestion};
use daybook_types::models::{ChatMessage, ChatRole, Entry, Question};

const DAY_FORMAT: &str = "%Y-%m-%d";

impl Database {
    // -- Entries --

    pub fn create_entry(
        &self,
        owner: Uuid,
        question_id: i64,
        question_text: &str,
        answer: &str,
        at: DateTime<Utc>,
    ) -> Result<Entry> {
        self.with_conn(|conn| {
            ensure_user(conn, owner)?;
            conn.execute(
                "INSERT INTO entries (owner_id, question_id, question_text, answer, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![owner.to_string(), question_id, question_text, answer, format_ts(at)],
            )?;
            let id = conn.last_insert_rowid();
            query_entry(conn, owner, id)?.ok_or_else(|| anyhow::anyhow!("Entry {} vanished after insert", id))
        })
    }

    /// Newest first.
    pub fn list_entries(&self, owner: Uuid) -> Result<Vec<Entry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM entries
                 WHERE owner_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([owner.to_string()], EntryRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            collect(rows)
        })
    }

    pub fn get_entry(&self, owner: Uuid, id: i64) -> Result<Option<Entry>> {
        self.with_conn(|conn| query_entry(conn, owner, id))
    }

    /// Turns public sharing on or off. The first time sharing is enabled the
    /// entry takes `new_token`; later toggles keep the token it already has.
    pub fn set_entry_sharing(
        &self,
        owner: Uuid,
        id: i64,
        public: bool,
        new_token: &str,
    ) -> Result<Option<Entry>> {
        self.with_conn(|conn| {
            let changed = if public {
                conn.execute(
                    "UPDATE entries SET share_public = 1, share_token = COALESCE(share_token, ?3)
                     WHERE owner_id = ?1 AND id = ?2",
                    rusqlite::params![owner.to_string(), id, new_token],
                )?
            } else {
                conn.execute(
                    "UPDATE entries SET share_public = 0 WHERE owner_id = ?1 AND id = ?2",
                    rusqlite::params![owner.to_string(), id],
                )?
            };

            if changed == 0 {
                return Ok(None);
            }
            query_entry(conn, owner, id)
        })
    }

    /// Looks up an entry by share token. Entries with sharing switched off
    /// are not returned.
    pub fn get_shared_entry(&self, token: &str) -> Result<Option<Entry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM entries WHERE share_token = ?1 AND share_public = 1"
            ))?;
            let row = stmt.query_row([token], EntryRow::from_row).optional()?;
            row.map(Entry::try_from).transpose()
        })
    }

    // -- Backlog --

    pub fn count_unanalyzed(&self, owner: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entries WHERE owner_id = ?1 AND analyzed_at IS NULL",
                [owner.to_string()],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
    }

    /// Oldest first.
    pub fn list_unanalyzed(&self, owner: Uuid) -> Result<Vec<Entry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM entries
                 WHERE owner_id = ?1 AND analyzed_at IS NULL
                 ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt
                .query_map([owner.to_string()], EntryRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            collect(rows)
        })
    }

    pub fn mark_analyzed(&self, owner: Uuid, entry_ids: &[i64], at: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| mark_entries(conn, owner, entry_ids, at, None))
    }

    // -- Conversation --

    /// Transcript of one of the owner's entries. Unknown or foreign entries
    /// yield `None`.
    pub fn list_messages(&self, owner: Uuid, entry_id: i64) -> Result<Option<Vec<ChatMessage>>> {
        self.with_conn(|conn| {
            if query_entry(conn, owner, entry_id)?.is_none() {
                return Ok(None);
            }
            query_messages(conn, entry_id).map(Some)
        })
    }

    /// Stores a user message and the companion's reply together.
    pub fn insert_conversation_turn(
        &self,
        owner: Uuid,
        entry_id: i64,
        message: &str,
        reply: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<(ChatMessage, ChatMessage)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_entry(&tx, owner, entry_id)?.is_none() {
                return Ok(None);
            }

            let ts = format_ts(at);
            for (role, content) in [(ChatRole::User, message), (ChatRole::Companion, reply)] {
                tx.execute(
                    "INSERT INTO entry_messages (entry_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![entry_id, role.as_str(), content, ts],
                )?;
            }

            let mut recent = query_messages(&tx, entry_id)?;
            tx.commit()?;

            match (recent.pop(), recent.pop()) {
                (Some(reply), Some(message)) => Ok(Some((message, reply))),
                _ => bail!("Conversation turn on entry {} vanished after insert", entry_id),
            }
        })
    }

    // -- Sequencer --

    pub fn load_sequencer_state(&self) -> Result<Option<SequencerState>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT cursor, served_on, question_id, question_text FROM sequencer_state WHERE id = 1",
                    [],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<i64>>(2)?,
                            row.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .optional()?;

            let Some((cursor, served_on, question_id, question_text)) = row else {
                return Ok(None);
            };
            let served = match (served_on, question_id, question_text) {
                (Some(day), Some(id), Some(text)) => Some(ServedQuestion {
                    day: NaiveDate::parse_from_str(&day, DAY_FORMAT)
                        .with_context(|| format!("invalid served_on {:?}", day))?,
                    question: Question { id, text },
                }),
                _ => None,
            };
            Ok(Some(SequencerState { cursor, served }))
        })
    }

    pub fn save_sequencer_state(&self, state: &SequencerState) -> Result<()> {
        let served_on = state.served.as_ref().map(|s| s.day.format(DAY_FORMAT).to_string());
        let question_id = state.served.as_ref().map(|s| s.question.id);
        let question_text = state.served.as_ref().map(|s| s.question.text.as_str());

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sequencer_state (id, cursor, served_on, question_id, question_text)
                 VALUES (1, ?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    cursor = excluded.cursor,
                    served_on = excluded.served_on,
                    question_id = excluded.question_id,
                    question_text = excluded.question_text",
                rusqlite::params![state.cursor, served_on, question_id, question_text],
            )?;
            Ok(())
        })
    }
}

pub(crate) fn ensure_user(conn: &Connection, owner: Uuid) -> Result<()> {
    conn.execute("INSERT OR IGNORE INTO users (id) VALUES (?1)", [owner.to_string()])?;
    Ok(())
}

pub(crate) fn query_entry(conn: &Connection, owner: Uuid, id: i64) -> Result<Option<Entry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM entries WHERE owner_id = ?1 AND id = ?2"
    ))?;
    let row = stmt
        .query_row(rusqlite::params![owner.to_string(), id], EntryRow::from_row)
        .optional()?;
    row.map(Entry::try_from).transpose()
}

pub(crate) fn query_messages(conn: &Connection, entry_id: i64) -> Result<Vec<ChatMessage>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM entry_messages WHERE entry_id = ?1 ORDER BY id ASC"
    ))?;
    let rows = stmt
        .query_map([entry_id], MessageRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    collect(rows)
}

/// Watermarks the listed entries that belong to `owner` and are still
/// unanalyzed. Returns how many rows changed.
pub(crate) fn mark_entries(
    conn: &Connection,
    owner: Uuid,
    entry_ids: &[i64],
    at: DateTime<Utc>,
    analysis_id: Option<i64>,
) -> Result<usize> {
    if entry_ids.is_empty() {
        return Ok(0);
    }

    let placeholders: Vec<String> = (4..4 + entry_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "UPDATE entries SET analyzed_at = ?1, analysis_id = ?3
         WHERE owner_id = ?2 AND analyzed_at IS NULL AND id IN ({})",
        placeholders.join(", ")
    );

    let ts = format_ts(at);
    let owner = owner.to_string();
    let mut params: Vec<&dyn ToSql> = vec![&ts, &owner, &analysis_id];
    params.extend(entry_ids.iter().map(|id| id as &dyn ToSql));

    Ok(conn.execute(&sql, params.as_slice())?)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 7, minute, 0).unwrap()
    }

    fn seed(db: &Database, owner: Uuid, n: u32) -> Vec<i64> {
        (0..n)
            .map(|i| {
                db.create_entry(owner, i as i64 + 1, "How are you?", &format!("answer {}", i), at(i))
                    .unwrap()
                    .id
            })
            .collect()
    }

    #[test]
    fn entries_are_owner_scoped() {
        let db = Database::open_in_memory().unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let ids = seed(&db, alice, 2);

        assert!(db.get_entry(alice, ids[0]).unwrap().is_some());
        assert!(db.get_entry(bob, ids[0]).unwrap().is_none());
        assert!(db.list_entries(bob).unwrap().is_empty());

        let listed: Vec<i64> = db.list_entries(alice).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(listed, vec![ids[1], ids[0]]);
    }

    #[test]
    fn backlog_is_oldest_first_and_shrinks_when_marked() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let ids = seed(&db, owner, 4);

        let backlog: Vec<i64> = db.list_unanalyzed(owner).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(backlog, ids);

        assert_eq!(db.mark_analyzed(owner, &ids[..2], at(30)).unwrap(), 2);
        assert_eq!(db.count_unanalyzed(owner).unwrap(), 2);
        assert_eq!(db.get_entry(owner, ids[0]).unwrap().unwrap().analyzed_at, Some(at(30)));
    }

    #[test]
    fn marking_is_idempotent_and_never_rewrites_the_watermark() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let ids = seed(&db, owner, 2);

        assert_eq!(db.mark_analyzed(owner, &ids, at(10)).unwrap(), 2);
        assert_eq!(db.mark_analyzed(owner, &ids, at(20)).unwrap(), 0);
        assert_eq!(db.get_entry(owner, ids[1]).unwrap().unwrap().analyzed_at, Some(at(10)));

        let reverted = db.with_conn(|conn| {
            conn.execute("UPDATE entries SET analyzed_at = NULL WHERE id = ?1", [ids[0]])?;
            Ok(())
        });
        assert!(reverted.is_err());
    }

    #[test]
    fn marking_ignores_foreign_entries() {
        let db = Database::open_in_memory().unwrap();
        let alice = Uuid::new_v4();
        let ids = seed(&db, alice, 1);

        assert_eq!(db.mark_analyzed(Uuid::new_v4(), &ids, at(5)).unwrap(), 0);
        assert_eq!(db.count_unanalyzed(alice).unwrap(), 1);
    }

    #[test]
    fn sharing_keeps_its_token() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let id = seed(&db, owner, 1)[0];

        let shared = db.set_entry_sharing(owner, id, true, "tok-1").unwrap().unwrap();
        assert!(shared.share_public);
        assert_eq!(shared.share_token.as_deref(), Some("tok-1"));
        assert!(db.get_shared_entry("tok-1").unwrap().is_some());

        db.set_entry_sharing(owner, id, false, "tok-2").unwrap();
        assert!(db.get_shared_entry("tok-1").unwrap().is_none());

        let again = db.set_entry_sharing(owner, id, true, "tok-3").unwrap().unwrap();
        assert_eq!(again.share_token.as_deref(), Some("tok-1"));

        assert!(db.set_entry_sharing(Uuid::new_v4(), id, true, "tok-4").unwrap().is_none());
    }

    #[test]
    fn conversation_turns_are_stored_in_order() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let id = seed(&db, owner, 1)[0];

        let (message, reply) = db
            .insert_conversation_turn(owner, id, "I felt tired.", "What wore you out?", at(40))
            .unwrap()
            .unwrap();
        assert_eq!(message.role, ChatRole::User);
        assert_eq!(reply.role, ChatRole::Companion);
        assert_eq!(reply.content, "What wore you out?");

        let transcript = db.list_messages(owner, id).unwrap().unwrap();
        assert_eq!(transcript, vec![message, reply]);

        assert!(db.list_messages(Uuid::new_v4(), id).unwrap().is_none());
        assert!(
            db.insert_conversation_turn(Uuid::new_v4(), id, "hi", "hello", at(41))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn sequencer_state_round_trip() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.load_sequencer_state().unwrap(), None);

        let served = ServedQuestion {
            day: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            question: Question { id: 4, text: "What did you notice?".into() },
        };
        db.save_sequencer_state(&SequencerState { cursor: 5, served: Some(served.clone()) })
            .unwrap();
        let loaded = db.load_sequencer_state().unwrap().unwrap();
        assert_eq!(loaded.cursor, 5);
        assert_eq!(loaded.served, Some(served));

        db.save_sequencer_state(&SequencerState { cursor: 6, served: None }).unwrap();
        assert_eq!(
            db.load_sequencer_state().unwrap(),
            Some(SequencerState { cursor: 6, served: None })
        );

        assert!(db.save_sequencer_state(&SequencerState { cursor: 0, served: None }).is_err());
    }
}
