use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use daybook_types::models::Analysis;

use crate::Database;
use crate::models::{ANALYSIS_COLUMNS, AnalysisRow, collect, format_ts, parse_ts};
use crate::queries::{OptionalExt, ensure_user, mark_entries};

impl Database {
    pub fn create_analysis(&self, owner: Uuid, content: &str, entry_count: i64) -> Result<Analysis> {
        self.with_conn(|conn| {
            ensure_user(conn, owner)?;
            insert_analysis(conn, owner, content, entry_count, Utc::now())
        })
    }

    /// Newest first.
    pub fn list_analyses(&self, owner: Uuid) -> Result<Vec<Analysis>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ANALYSIS_COLUMNS} FROM analyses
                 WHERE owner_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([owner.to_string()], AnalysisRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            collect(rows)
        })
    }

    pub fn get_analysis(&self, owner: Uuid, id: i64) -> Result<Option<Analysis>> {
        self.with_conn(|conn| query_analysis(conn, owner, id))
    }

    pub fn set_last_analyzed_at(&self, owner: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| upsert_last_analyzed(conn, owner, at))
    }

    pub fn last_analyzed_at(&self, owner: Uuid) -> Result<Option<DateTime<Utc>>> {
        self.with_conn(|conn| {
            let value: Option<Option<String>> = conn
                .query_row(
                    "SELECT last_analyzed_at FROM users WHERE id = ?1",
                    [owner.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            value.flatten().as_deref().map(parse_ts).transpose()
        })
    }

    /// Inserts the analysis, watermarks its entries and records the owner's
    /// last-analysis time in one transaction. Rolls back if any listed entry
    /// is missing, foreign or already analyzed.
    pub fn commit_analysis(
        &self,
        owner: Uuid,
        content: &str,
        entry_ids: &[i64],
        at: DateTime<Utc>,
    ) -> Result<Analysis> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            upsert_last_analyzed(&tx, owner, at)?;
            let analysis = insert_analysis(&tx, owner, content, entry_ids.len() as i64, at)?;
            let marked = mark_entries(&tx, owner, entry_ids, at, Some(analysis.id))?;
            if marked != entry_ids.len() {
                bail!(
                    "Expected to mark {} entries for analysis, marked {}; backlog changed",
                    entry_ids.len(),
                    marked
                );
            }

            tx.commit()?;
            debug!("Committed analysis {} over {} entries", analysis.id, marked);
            Ok(analysis)
        })
    }
}

fn insert_analysis(
    conn: &Connection,
    owner: Uuid,
    content: &str,
    entry_count: i64,
    at: DateTime<Utc>,
) -> Result<Analysis> {
    conn.execute(
        "INSERT INTO analyses (owner_id, content, entry_count, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![owner.to_string(), content, entry_count, format_ts(at)],
    )?;
    let id = conn.last_insert_rowid();
    query_analysis(conn, owner, id)?.ok_or_else(|| anyhow::anyhow!("Analysis {} vanished after insert", id))
}

fn query_analysis(conn: &Connection, owner: Uuid, id: i64) -> Result<Option<Analysis>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ANALYSIS_COLUMNS} FROM analyses WHERE owner_id = ?1 AND id = ?2"
    ))?;
    let row = stmt
        .query_row(rusqlite::params![owner.to_string(), id], AnalysisRow::from_row)
        .optional()?;
    row.map(Analysis::try_from).transpose()
}

fn upsert_last_analyzed(conn: &Connection, owner: Uuid, at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, last_analyzed_at) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET last_analyzed_at = excluded.last_analyzed_at",
        rusqlite::params![owner.to_string(), format_ts(at)],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, day, 21, 0, 0).unwrap()
    }

    fn seed(db: &Database, owner: Uuid, n: u32) -> Vec<i64> {
        (0..n)
            .map(|i| db.create_entry(owner, 1, "q", "a", at(i + 1)).unwrap().id)
            .collect()
    }

    #[test]
    fn commit_applies_all_three_effects() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let ids = seed(&db, owner, 7);

        let analysis = db.commit_analysis(owner, "insight", &ids, at(20)).unwrap();

        assert_eq!(analysis.entry_count, 7);
        assert_eq!(db.count_unanalyzed(owner).unwrap(), 0);
        assert_eq!(db.last_analyzed_at(owner).unwrap(), Some(at(20)));
        assert_eq!(db.get_analysis(owner, analysis.id).unwrap(), Some(analysis));

        let linked: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE analysis_id IS NOT NULL",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(linked, 7);
    }

    #[test]
    fn commit_rolls_back_when_an_entry_was_already_consumed() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let ids = seed(&db, owner, 7);
        db.mark_analyzed(owner, &ids[..1], at(10)).unwrap();

        assert!(db.commit_analysis(owner, "dup", &ids, at(20)).is_err());

        assert!(db.list_analyses(owner).unwrap().is_empty());
        assert_eq!(db.count_unanalyzed(owner).unwrap(), 6);
        assert_eq!(db.last_analyzed_at(owner).unwrap(), None);
    }

    #[test]
    fn commit_rejects_foreign_entries() {
        let db = Database::open_in_memory().unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let ids = seed(&db, alice, 7);

        assert!(db.commit_analysis(bob, "not yours", &ids, at(20)).is_err());
        assert_eq!(db.count_unanalyzed(alice).unwrap(), 7);
        assert!(db.list_analyses(bob).unwrap().is_empty());
    }

    #[test]
    fn analyses_list_newest_first_and_stay_private() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let first = db.create_analysis(owner, "one", 7).unwrap();
        let second = db.create_analysis(owner, "two", 9).unwrap();

        let ids: Vec<i64> = db.list_analyses(owner).unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert!(db.get_analysis(Uuid::new_v4(), first.id).unwrap().is_none());
    }

    #[test]
    fn last_analyzed_is_none_for_unknown_user() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        assert_eq!(db.last_analyzed_at(owner).unwrap(), None);

        db.set_last_analyzed_at(owner, at(3)).unwrap();
        assert_eq!(db.last_analyzed_at(owner).unwrap(), Some(at(3)));
    }
}
