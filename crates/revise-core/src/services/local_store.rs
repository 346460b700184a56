//! Thread-safe local store shared by the UI side and the sync client.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::db::{
    Database, DeckRepository, KnowledgeRepository, PendingQueue, QueueSnapshot,
    SqliteCacheRepository, SyncRoundRecord, SyncStateRepository,
};
use crate::error::{Error, Result};
use crate::models::{entity_key, Deck, DeckId, EntityChange, EntityKind, KnowledgeState};
use crate::PendingChange;

/// What merging one round's remote records did to the local cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Records written to the cache
    pub applied: usize,
    /// Records older than the cached version
    pub stale: usize,
    /// Records skipped because the entity was edited again during the round
    pub deferred: usize,
    /// Queue entries removed
    pub cleared: usize,
    pub watermark: Option<DateTime<Utc>>,
}

/// Local deck cache, pending-change queue, and sync bookkeeping behind one lock.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the store at the given filesystem path.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path)?;
        tracing::debug!("Opened local store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Arc::new(Mutex::new(Database::open_in_memory()?)),
            db_path: None,
        })
    }

    pub fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Save a deck edit: cache row and queue entry are written together or not at all.
    pub async fn save_deck(&self, deck: &Deck) -> Result<PendingChange> {
        let change = EntityChange::deck(deck.data.clone())?;
        let mut db = self.db.lock().await;
        let tx = db
            .connection_mut()
            .transaction()
            .map_err(Error::local_storage)?;
        SqliteCacheRepository::new(&tx).save_local_deck(deck)?;
        let pending = PendingQueue::new(&tx).enqueue(&change)?;
        tx.commit().map_err(Error::local_storage)?;
        Ok(pending)
    }

    /// Save a knowledge state edit, cached and queued atomically.
    pub async fn save_knowledge_state(&self, state: &KnowledgeState) -> Result<PendingChange> {
        let change = EntityChange::knowledge_state(state.data.clone())?;
        let mut db = self.db.lock().await;
        let tx = db
            .connection_mut()
            .transaction()
            .map_err(Error::local_storage)?;
        SqliteCacheRepository::new(&tx).save_local_state(state)?;
        let pending = PendingQueue::new(&tx).enqueue(&change)?;
        tx.commit().map_err(Error::local_storage)?;
        Ok(pending)
    }

    /// Queue a change without touching the cache.
    pub async fn enqueue(&self, change: &EntityChange) -> Result<PendingChange> {
        let db = self.db.lock().await;
        PendingQueue::new(db.connection()).enqueue(change)
    }

    pub async fn get_deck(&self, id: &DeckId) -> Result<Option<Deck>> {
        let db = self.db.lock().await;
        SqliteCacheRepository::new(db.connection()).get_deck(id)
    }

    pub async fn list_decks(&self, limit: usize) -> Result<Vec<Deck>> {
        let db = self.db.lock().await;
        SqliteCacheRepository::new(db.connection()).list_decks(limit)
    }

    pub async fn get_knowledge_state(&self, card_id: &str) -> Result<Option<KnowledgeState>> {
        let db = self.db.lock().await;
        SqliteCacheRepository::new(db.connection()).get_state(card_id)
    }

    pub async fn list_knowledge_states(&self, limit: usize) -> Result<Vec<KnowledgeState>> {
        let db = self.db.lock().await;
        SqliteCacheRepository::new(db.connection()).list_states(limit)
    }

    pub async fn pending_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        PendingQueue::new(db.connection()).len()
    }

    /// Current queue contents, unmodified.
    pub async fn snapshot(&self) -> Result<QueueSnapshot> {
        let db = self.db.lock().await;
        PendingQueue::new(db.connection()).drain_snapshot()
    }

    /// Drop every queued change.
    pub async fn clear_queue(&self) -> Result<usize> {
        let db = self.db.lock().await;
        PendingQueue::new(db.connection()).clear()
    }

    /// Drop the queued changes for one entity. The cached copy stays.
    pub async fn discard_pending(&self, kind: EntityKind, id: &str) -> Result<usize> {
        let db = self.db.lock().await;
        PendingQueue::new(db.connection()).discard_entity(&entity_key(kind, id))
    }

    pub async fn watermark(&self) -> Result<Option<DateTime<Utc>>> {
        let db = self.db.lock().await;
        SyncStateRepository::new(db.connection()).watermark()
    }

    pub async fn reset_watermark(&self) -> Result<()> {
        let db = self.db.lock().await;
        SyncStateRepository::new(db.connection()).reset_watermark()
    }

    /// Finish a successful round in one transaction: merge remote records,
    /// advance the watermark, and drop the drained queue prefix.
    ///
    /// Entities queued again after `snapshot_max_seq` keep their local
    /// version; the next round pushes it.
    pub async fn commit_round(
        &self,
        snapshot_max_seq: Option<i64>,
        decks: &[Deck],
        states: &[KnowledgeState],
        new_timestamp: DateTime<Utc>,
    ) -> Result<MergeReport> {
        let mut db = self.db.lock().await;
        let tx = db
            .connection_mut()
            .transaction()
            .map_err(Error::local_storage)?;
        let mut report = MergeReport::default();

        {
            let cache = SqliteCacheRepository::new(&tx);
            let queue = PendingQueue::new(&tx);

            for deck in decks {
                let key = entity_key(EntityKind::Deck, deck.id.as_str());
                if queue.has_pending_after(&key, snapshot_max_seq)? {
                    report.deferred += 1;
                } else if cache.apply_remote_deck(deck)? {
                    report.applied += 1;
                } else {
                    report.stale += 1;
                }
            }

            for state in states {
                let key = entity_key(EntityKind::KnowledgeState, &state.card_id);
                if queue.has_pending_after(&key, snapshot_max_seq)? {
                    report.deferred += 1;
                } else if cache.apply_remote_state(state)? {
                    report.applied += 1;
                } else {
                    report.stale += 1;
                }
            }

            report.watermark =
                Some(SyncStateRepository::new(&tx).advance_watermark(new_timestamp)?);

            if let Some(seq) = snapshot_max_seq {
                report.cleared = queue.clear_through(seq)?;
            }
        }

        tx.commit().map_err(Error::local_storage)?;
        Ok(report)
    }

    /// Append a round to the history table. Best effort for callers.
    pub async fn record_round(
        &self,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        pushed: usize,
        pulled: usize,
        error: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        SyncStateRepository::new(db.connection()).record_round(
            started_at,
            finished_at,
            pushed,
            pulled,
            error,
        )
    }

    pub async fn recent_rounds(&self, limit: usize) -> Result<Vec<SyncRoundRecord>> {
        let db = self.db.lock().await;
        SyncStateRepository::new(db.connection()).recent_rounds(limit)
    }
}
