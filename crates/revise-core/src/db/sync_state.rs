//! Sync watermark and round history

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{from_millis, to_millis};

const WATERMARK_KEY: &str = "last_synced_ms";

/// One recorded sync round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRoundRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pushed: usize,
    pub pulled: usize,
    /// `succeeded` or `failed`
    pub outcome: String,
    pub error: Option<String>,
}

pub struct SyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SyncStateRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Timestamp up to which remote changes have been pulled.
    pub fn watermark(&self) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?",
                params![WATERMARK_KEY],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|raw| {
            raw.parse::<i64>()
                .ok()
                .and_then(from_millis)
                .ok_or_else(|| Error::InvalidInput(format!("Stored watermark is invalid: {raw}")))
        })
        .transpose()
    }

    /// Advance the watermark. Never moves it backwards; returns the stored value.
    pub fn advance_watermark(&self, candidate: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let next = match self.watermark()? {
            Some(current) if current > candidate => current,
            _ => candidate,
        };
        self.conn
            .execute(
                "INSERT INTO sync_state (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![WATERMARK_KEY, to_millis(next).to_string()],
            )
            .map_err(Error::local_storage)?;
        Ok(next)
    }

    /// Forget the watermark so the next round pulls everything.
    pub fn reset_watermark(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_state WHERE key = ?", params![WATERMARK_KEY])?;
        Ok(())
    }

    pub fn record_round(
        &self,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        pushed: usize,
        pulled: usize,
        error: Option<&str>,
    ) -> Result<()> {
        let outcome = if error.is_some() { "failed" } else { "succeeded" };
        self.conn.execute(
            "INSERT INTO sync_rounds (started_at, finished_at, pushed, pulled, outcome, error)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                to_millis(started_at),
                to_millis(finished_at),
                pushed as i64,
                pulled as i64,
                outcome,
                error
            ],
        )?;
        Ok(())
    }

    /// Most recent rounds first.
    pub fn recent_rounds(&self, limit: usize) -> Result<Vec<SyncRoundRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, pushed, pulled, outcome, error
             FROM sync_rounds
             ORDER BY id DESC
             LIMIT ?",
        )?;
        let rounds = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SyncRoundRecord {
                    id: row.get(0)?,
                    started_at: from_millis(row.get(1)?).unwrap_or_default(),
                    finished_at: from_millis(row.get(2)?).unwrap_or_default(),
                    pushed: row.get::<_, i64>(3)? as usize,
                    pulled: row.get::<_, i64>(4)? as usize,
                    outcome: row.get(5)?,
                    error: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::util::now_millis;
    use chrono::Duration;

    #[test]
    fn watermark_starts_absent() {
        let db = Database::open_in_memory().unwrap();
        let repo = SyncStateRepository::new(db.connection());
        assert!(repo.watermark().unwrap().is_none());
    }

    #[test]
    fn watermark_never_moves_backwards() {
        let db = Database::open_in_memory().unwrap();
        let repo = SyncStateRepository::new(db.connection());
        let t1 = now_millis();
        let t0 = t1 - Duration::minutes(1);

        assert_eq!(repo.advance_watermark(t1).unwrap(), t1);
        assert_eq!(repo.advance_watermark(t0).unwrap(), t1);
        assert_eq!(repo.watermark().unwrap(), Some(t1));

        repo.reset_watermark().unwrap();
        assert!(repo.watermark().unwrap().is_none());
    }

    #[test]
    fn rounds_are_listed_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let repo = SyncStateRepository::new(db.connection());
        let now = now_millis();
        repo.record_round(now, now, 2, 5, None).unwrap();
        repo.record_round(now, now, 1, 0, Some("HTTP 500")).unwrap();

        let rounds = repo.recent_rounds(10).unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].outcome, "failed");
        assert_eq!(rounds[0].error.as_deref(), Some("HTTP 500"));
        assert_eq!(rounds[1].pulled, 5);
    }
}
