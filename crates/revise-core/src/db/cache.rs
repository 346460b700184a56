//! Local cache of decks and knowledge states

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{Deck, DeckId, KnowledgeState};
use crate::util::{from_millis, to_millis};

/// Trait for deck cache operations
pub trait DeckRepository {
    /// Store a locally edited deck, keeping the server stamp of its base version
    fn save_local_deck(&self, deck: &Deck) -> Result<()>;

    /// Get a deck by ID
    fn get_deck(&self, id: &DeckId) -> Result<Option<Deck>>;

    /// List decks ordered by name
    fn list_decks(&self, limit: usize) -> Result<Vec<Deck>>;

    /// Apply a server version. Returns `false` when the cached row already
    /// carries a newer stamp (last-write-wins).
    fn apply_remote_deck(&self, deck: &Deck) -> Result<bool>;
}

/// Trait for knowledge state cache operations
pub trait KnowledgeRepository {
    fn save_local_state(&self, state: &KnowledgeState) -> Result<()>;

    fn get_state(&self, card_id: &str) -> Result<Option<KnowledgeState>>;

    fn list_states(&self, limit: usize) -> Result<Vec<KnowledgeState>>;

    fn apply_remote_state(&self, state: &KnowledgeState) -> Result<bool>;
}

/// `SQLite` implementation of the cache repositories
pub struct SqliteCacheRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteCacheRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_deck(row: &Row<'_>) -> rusqlite::Result<Deck> {
        let id: String = row.get(0)?;
        Ok(Deck {
            id: id.parse().map_err(|error| conversion_failure(0, error))?,
            owner_id: row.get(1)?,
            data: json_column(row, 2)?,
            last_modified: row.get::<_, Option<i64>>(3)?.and_then(from_millis),
        })
    }

    fn parse_state(row: &Row<'_>) -> rusqlite::Result<KnowledgeState> {
        Ok(KnowledgeState {
            card_id: row.get(0)?,
            user_id: row.get(1)?,
            data: json_column(row, 2)?,
            last_modified: row.get::<_, Option<i64>>(3)?.and_then(from_millis),
        })
    }
}

/// Decode a JSON document column; a corrupt row is an error, never `null`.
fn json_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Value> {
    let raw: String = row.get(index)?;
    serde_json::from_str(&raw).map_err(|error| conversion_failure(index, error))
}

fn conversion_failure(
    index: usize,
    error: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
}

impl DeckRepository for SqliteCacheRepository<'_> {
    fn save_local_deck(&self, deck: &Deck) -> Result<()> {
        let data = serde_json::to_string(&deck.data)?;
        self.conn
            .execute(
                "INSERT INTO decks (id, owner_id, data, last_modified) VALUES (?, ?, ?, NULL)
                 ON CONFLICT(id) DO UPDATE SET
                    owner_id = COALESCE(excluded.owner_id, decks.owner_id),
                    data = excluded.data",
                params![deck.id.as_str(), deck.owner_id, data],
            )
            .map_err(Error::local_storage)?;
        Ok(())
    }

    fn get_deck(&self, id: &DeckId) -> Result<Option<Deck>> {
        let deck = self
            .conn
            .query_row(
                "SELECT id, owner_id, data, last_modified FROM decks WHERE id = ?",
                params![id.as_str()],
                Self::parse_deck,
            )
            .optional()?;
        Ok(deck)
    }

    fn list_decks(&self, limit: usize) -> Result<Vec<Deck>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner_id, data, last_modified
             FROM decks
             ORDER BY COALESCE(json_extract(data, '$.name'), id) ASC
             LIMIT ?",
        )?;
        let decks = stmt
            .query_map(params![limit as i64], Self::parse_deck)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(decks)
    }

    fn apply_remote_deck(&self, deck: &Deck) -> Result<bool> {
        let data = serde_json::to_string(&deck.data)?;
        let changed = self.conn.execute(
            "INSERT INTO decks (id, owner_id, data, last_modified) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                data = excluded.data,
                last_modified = excluded.last_modified
             WHERE decks.last_modified IS NULL
                OR excluded.last_modified IS NULL
                OR excluded.last_modified >= decks.last_modified",
            params![
                deck.id.as_str(),
                deck.owner_id,
                data,
                deck.last_modified.map(to_millis)
            ],
        )?;
        Ok(changed > 0)
    }
}

impl KnowledgeRepository for SqliteCacheRepository<'_> {
    fn save_local_state(&self, state: &KnowledgeState) -> Result<()> {
        let data = serde_json::to_string(&state.data)?;
        self.conn
            .execute(
                "INSERT INTO knowledge_states (card_id, user_id, data, last_modified)
                 VALUES (?, ?, ?, NULL)
                 ON CONFLICT(card_id) DO UPDATE SET
                    user_id = COALESCE(excluded.user_id, knowledge_states.user_id),
                    data = excluded.data",
                params![state.card_id, state.user_id, data],
            )
            .map_err(Error::local_storage)?;
        Ok(())
    }

    fn get_state(&self, card_id: &str) -> Result<Option<KnowledgeState>> {
        let state = self
            .conn
            .query_row(
                "SELECT card_id, user_id, data, last_modified FROM knowledge_states WHERE card_id = ?",
                params![card_id],
                Self::parse_state,
            )
            .optional()?;
        Ok(state)
    }

    fn list_states(&self, limit: usize) -> Result<Vec<KnowledgeState>> {
        let mut stmt = self.conn.prepare(
            "SELECT card_id, user_id, data, last_modified
             FROM knowledge_states
             ORDER BY card_id ASC
             LIMIT ?",
        )?;
        let states = stmt
            .query_map(params![limit as i64], Self::parse_state)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(states)
    }

    fn apply_remote_state(&self, state: &KnowledgeState) -> Result<bool> {
        let data = serde_json::to_string(&state.data)?;
        let changed = self.conn.execute(
            "INSERT INTO knowledge_states (card_id, user_id, data, last_modified) VALUES (?, ?, ?, ?)
             ON CONFLICT(card_id) DO UPDATE SET
                user_id = excluded.user_id,
                data = excluded.data,
                last_modified = excluded.last_modified
             WHERE knowledge_states.last_modified IS NULL
                OR excluded.last_modified IS NULL
                OR excluded.last_modified >= knowledge_states.last_modified",
            params![
                state.card_id,
                state.user_id,
                data,
                state.last_modified.map(to_millis)
            ],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::util::now_millis;
    use chrono::Duration;
    use serde_json::json;

    fn remote_deck(id: &str, name: &str, stamp: chrono::DateTime<chrono::Utc>) -> Deck {
        let mut deck = Deck::from_data(json!({ "id": id, "name": name })).unwrap();
        deck.owner_id = Some("user-1".to_string());
        deck.last_modified = Some(stamp);
        deck
    }

    #[test]
    fn corrupt_cached_document_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteCacheRepository::new(db.connection());
        db.connection()
            .execute(
                "INSERT INTO decks (id, owner_id, data, last_modified) VALUES ('d1', NULL, '{broken', NULL)",
                [],
            )
            .unwrap();
        db.connection()
            .execute(
                "INSERT INTO knowledge_states (card_id, user_id, data, last_modified)
                 VALUES ('c1', NULL, 'not json', NULL)",
                [],
            )
            .unwrap();

        assert!(repo.get_deck(&"d1".parse().unwrap()).is_err());
        assert!(repo.list_decks(10).is_err());
        assert!(repo.get_state("c1").is_err());
    }

    #[test]
    fn save_and_get_local_deck() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteCacheRepository::new(db.connection());

        let deck = Deck::from_data(json!({ "id": "d1", "name": "Verbs" })).unwrap();
        repo.save_local_deck(&deck).unwrap();

        let fetched = repo.get_deck(&deck.id).unwrap().unwrap();
        assert_eq!(fetched, deck);
    }

    #[test]
    fn local_edit_keeps_server_stamp() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteCacheRepository::new(db.connection());
        let stamp = now_millis();
        repo.apply_remote_deck(&remote_deck("d1", "v1", stamp)).unwrap();

        let edited = Deck::from_data(json!({ "id": "d1", "name": "v2" })).unwrap();
        repo.save_local_deck(&edited).unwrap();

        let fetched = repo.get_deck(&edited.id).unwrap().unwrap();
        assert_eq!(fetched.name(), "v2");
        assert_eq!(fetched.last_modified, Some(stamp));
        assert_eq!(fetched.owner_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn apply_remote_deck_is_last_write_wins() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteCacheRepository::new(db.connection());
        let newer = now_millis();
        let older = newer - Duration::seconds(5);

        assert!(repo.apply_remote_deck(&remote_deck("d1", "newer", newer)).unwrap());
        assert!(!repo.apply_remote_deck(&remote_deck("d1", "older", older)).unwrap());
        // Re-applying the same version is a no-op merge, not a conflict
        assert!(repo.apply_remote_deck(&remote_deck("d1", "newer", newer)).unwrap());

        let fetched = repo.get_deck(&"d1".parse().unwrap()).unwrap().unwrap();
        assert_eq!(fetched.name(), "newer");
    }

    #[test]
    fn list_decks_orders_by_name() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteCacheRepository::new(db.connection());
        let stamp = now_millis();
        repo.apply_remote_deck(&remote_deck("d2", "Zoology", stamp)).unwrap();
        repo.apply_remote_deck(&remote_deck("d1", "Anatomy", stamp)).unwrap();

        let names = repo
            .list_decks(10)
            .unwrap()
            .iter()
            .map(|deck| deck.name().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Anatomy", "Zoology"]);
    }

    #[test]
    fn knowledge_states_round_trip_and_lww() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteCacheRepository::new(db.connection());

        let local = KnowledgeState::from_data(json!({ "cardID": "c1", "box": 2 })).unwrap();
        repo.save_local_state(&local).unwrap();
        assert_eq!(repo.get_state("c1").unwrap().unwrap().data["box"], 2);

        let stamp = now_millis();
        let mut remote = KnowledgeState::from_data(json!({ "cardID": "c1", "box": 4 })).unwrap();
        remote.user_id = Some("user-1".to_string());
        remote.last_modified = Some(stamp);
        assert!(repo.apply_remote_state(&remote).unwrap());

        let mut stale = remote.clone();
        stale.data = json!({ "cardID": "c1", "box": 1 });
        stale.last_modified = Some(stamp - Duration::seconds(1));
        assert!(!repo.apply_remote_state(&stale).unwrap());

        let states = repo.list_states(10).unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].data["box"], 4);
    }
}
