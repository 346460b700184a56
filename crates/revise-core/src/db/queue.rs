//! Durable pending-change queue

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)] // SQLite counts are i64

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{EntityChange, PendingChange};
use crate::util::{from_millis, now_millis, to_millis};

/// The queue as read at the start of a sync round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSnapshot {
    pub changes: Vec<PendingChange>,
}

impl QueueSnapshot {
    /// Highest `seq` captured; clearing through it removes exactly this snapshot.
    pub fn max_seq(&self) -> Option<i64> {
        self.changes.last().map(|change| change.seq)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Split into `(dirty_decks, dirty_knowledge_states)`, keeping queue order.
    pub fn partition(&self) -> (Vec<Value>, Vec<Value>) {
        let mut decks = Vec::new();
        let mut states = Vec::new();
        for pending in &self.changes {
            match &pending.change {
                EntityChange::Deck(data) => decks.push(data.clone()),
                EntityChange::KnowledgeState(data) => states.push(data.clone()),
            }
        }
        (decks, states)
    }
}

/// Queue operations over a borrowed connection (or transaction).
pub struct PendingQueue<'a> {
    conn: &'a Connection,
}

impl<'a> PendingQueue<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append a change. Persisted before returning; a failed write is
    /// reported as [`Error::LocalStorage`].
    pub fn enqueue(&self, change: &EntityChange) -> Result<PendingChange> {
        let entity_key = change.entity_key()?;
        let payload = serde_json::to_string(change)?;
        let enqueued_at = now_millis();

        self.conn
            .execute(
                "INSERT INTO pending_changes (kind, entity_key, payload, enqueued_at)
                 VALUES (?, ?, ?, ?)",
                params![
                    change.kind().as_str(),
                    entity_key,
                    payload,
                    to_millis(enqueued_at)
                ],
            )
            .map_err(Error::local_storage)?;

        Ok(PendingChange {
            seq: self.conn.last_insert_rowid(),
            change: change.clone(),
            enqueued_at,
        })
    }

    /// Read the whole queue in insertion order without modifying it.
    pub fn drain_snapshot(&self) -> Result<QueueSnapshot> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, payload, enqueued_at FROM pending_changes ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut changes = Vec::with_capacity(rows.len());
        for (seq, payload, enqueued_at) in rows {
            let change = serde_json::from_str::<EntityChange>(&payload)?;
            let enqueued_at = from_millis(enqueued_at).ok_or_else(|| {
                Error::InvalidInput(format!("Queue entry {seq} has an invalid timestamp"))
            })?;
            changes.push(PendingChange {
                seq,
                change,
                enqueued_at,
            });
        }

        Ok(QueueSnapshot { changes })
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM pending_changes", [])
            .map_err(Error::local_storage)?;
        Ok(removed)
    }

    /// Remove entries up to and including `seq`; later entries stay queued.
    pub fn clear_through(&self, seq: i64) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM pending_changes WHERE seq <= ?", params![seq])
            .map_err(Error::local_storage)?;
        Ok(removed)
    }

    /// Remove every entry for one entity, wherever it sits in the queue.
    pub fn discard_entity(&self, entity_key: &str) -> Result<usize> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM pending_changes WHERE entity_key = ?",
                params![entity_key],
            )
            .map_err(Error::local_storage)?;
        Ok(removed)
    }

    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pending_changes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether `entity_key` has entries newer than `seq` (or any, when `None`).
    pub fn has_pending_after(&self, entity_key: &str, seq: Option<i64>) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM pending_changes WHERE entity_key = ? AND seq > ? LIMIT 1",
                params![entity_key, seq.unwrap_or(0)],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn deck(id: &str, name: &str) -> EntityChange {
        EntityChange::deck(json!({ "id": id, "name": name })).unwrap()
    }

    fn state(card: &str) -> EntityChange {
        EntityChange::knowledge_state(json!({ "cardID": card, "box": 1 })).unwrap()
    }

    #[test]
    fn enqueue_preserves_order_and_duplicates() {
        let db = Database::open_in_memory().unwrap();
        let queue = PendingQueue::new(db.connection());

        queue.enqueue(&deck("d1", "first")).unwrap();
        queue.enqueue(&state("c1")).unwrap();
        queue.enqueue(&deck("d1", "second")).unwrap();

        let snapshot = queue.drain_snapshot().unwrap();
        assert_eq!(snapshot.len(), 3);
        let names = snapshot
            .changes
            .iter()
            .map(|pending| pending.change.data().get("name").cloned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec![Some(json!("first")), None, Some(json!("second"))]);
        assert!(snapshot.changes.windows(2).all(|pair| pair[0].seq < pair[1].seq));
    }

    #[test]
    fn discard_entity_leaves_other_entries() {
        let db = Database::open_in_memory().unwrap();
        let queue = PendingQueue::new(db.connection());
        queue.enqueue(&deck("d1", "first")).unwrap();
        queue.enqueue(&deck("d2", "other")).unwrap();
        queue.enqueue(&deck("d1", "second")).unwrap();

        assert_eq!(queue.discard_entity("deck:d1").unwrap(), 2);
        assert_eq!(queue.discard_entity("deck:missing").unwrap(), 0);

        let snapshot = queue.drain_snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.changes[0].change.entity_id().unwrap(), "d2");
    }

    #[test]
    fn drain_snapshot_does_not_mutate() {
        let db = Database::open_in_memory().unwrap();
        let queue = PendingQueue::new(db.connection());
        queue.enqueue(&deck("d1", "x")).unwrap();

        let first = queue.drain_snapshot().unwrap();
        let second = queue.drain_snapshot().unwrap();
        assert_eq!(first, second);
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn partition_splits_by_kind() {
        let db = Database::open_in_memory().unwrap();
        let queue = PendingQueue::new(db.connection());
        queue.enqueue(&deck("d1", "x")).unwrap();
        queue.enqueue(&state("c1")).unwrap();
        queue.enqueue(&deck("d2", "y")).unwrap();

        let (decks, states) = queue.drain_snapshot().unwrap().partition();
        assert_eq!(decks.len(), 2);
        assert_eq!(decks[1]["id"], "d2");
        assert_eq!(states, vec![json!({ "cardID": "c1", "box": 1 })]);
    }

    #[test]
    fn clear_through_keeps_later_entries() {
        let db = Database::open_in_memory().unwrap();
        let queue = PendingQueue::new(db.connection());
        queue.enqueue(&deck("d1", "x")).unwrap();
        let snapshot = queue.drain_snapshot().unwrap();
        let late = queue.enqueue(&deck("d2", "late")).unwrap();

        let removed = queue.clear_through(snapshot.max_seq().unwrap()).unwrap();
        assert_eq!(removed, 1);

        let rest = queue.drain_snapshot().unwrap();
        assert_eq!(rest.changes, vec![late]);
    }

    #[test]
    fn clear_removes_everything() {
        let db = Database::open_in_memory().unwrap();
        let queue = PendingQueue::new(db.connection());
        queue.enqueue(&deck("d1", "x")).unwrap();
        queue.enqueue(&state("c1")).unwrap();

        assert_eq!(queue.clear().unwrap(), 2);
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn has_pending_after_checks_entity_and_seq() {
        let db = Database::open_in_memory().unwrap();
        let queue = PendingQueue::new(db.connection());
        let first = queue.enqueue(&deck("d1", "x")).unwrap();

        assert!(queue.has_pending_after("deck:d1", None).unwrap());
        assert!(!queue.has_pending_after("deck:d1", Some(first.seq)).unwrap());
        assert!(!queue.has_pending_after("deck:d2", None).unwrap());

        queue.enqueue(&deck("d1", "y")).unwrap();
        assert!(queue.has_pending_after("deck:d1", Some(first.seq)).unwrap());
    }

    #[test]
    fn seq_keeps_increasing_after_clear() {
        let db = Database::open_in_memory().unwrap();
        let queue = PendingQueue::new(db.connection());
        let first = queue.enqueue(&deck("d1", "x")).unwrap();
        queue.clear().unwrap();
        let second = queue.enqueue(&deck("d1", "x")).unwrap();
        assert!(second.seq > first.seq);
    }
}
