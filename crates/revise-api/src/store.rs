//! Authoritative deck and knowledge state storage behind the sync endpoint.

#![allow(clippy::cast_possible_wrap)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use revise_core::models::{
    split_last_modified, string_field, CARD_ID_FIELD, DECK_ID_FIELD, LAST_MODIFIED_FIELD,
};
use revise_core::sync::{SyncRequest, SyncResponse};
use revise_core::util::{from_millis, now_millis, to_millis};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS decks (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    data TEXT NOT NULL,
    last_modified INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_decks_owner_modified ON decks(owner_id, last_modified);

CREATE TABLE IF NOT EXISTS knowledge_states (
    user_id TEXT NOT NULL,
    card_id TEXT NOT NULL,
    data TEXT NOT NULL,
    last_modified INTEGER NOT NULL,
    PRIMARY KEY (user_id, card_id)
);
CREATE INDEX IF NOT EXISTS idx_knowledge_user_modified ON knowledge_states(user_id, last_modified);

-- Last stamp handed out; keeps stamps strictly increasing across rounds
CREATE TABLE IF NOT EXISTS sync_clock (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_stamp INTEGER NOT NULL
);
";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// `SQLite`-backed remote store. Blocking work runs on the blocking pool.
#[derive(Clone)]
pub struct SyncStore {
    conn: Arc<Mutex<Connection>>,
}

impl SyncStore {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|error| {
                AppError::Config(format!("Cannot create database directory: {error}"))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, AppError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Upsert the caller's dirty records and return everything of theirs
    /// stamped after `last_synced`, all in one immediate transaction.
    pub async fn apply_sync(
        &self,
        user_id: &str,
        request: SyncRequest,
    ) -> Result<SyncResponse, AppError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| apply_sync_blocking(conn, &user_id, request))
            .await
    }

    /// Fetch the caller's profile, creating it on first use.
    pub async fn get_or_create_profile(
        &self,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<UserProfile, AppError> {
        let user_id = user_id.to_string();
        let email = email.map(ToString::to_string);
        self.with_conn(move |conn| {
            let created = conn.execute(
                "INSERT INTO users (id, email, created_at) VALUES (?, ?, ?)
                 ON CONFLICT(id) DO NOTHING",
                params![user_id, email, to_millis(now_millis())],
            )?;
            if created > 0 {
                tracing::info!("Created user profile");
            }
            let profile = conn.query_row(
                "SELECT id, email, created_at FROM users WHERE id = ?",
                params![user_id],
                |row| {
                    Ok(UserProfile {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        created_at: from_millis(row.get(2)?).unwrap_or_default(),
                    })
                },
            )?;
            Ok(profile)
        })
        .await
    }

    async fn with_conn<T, F>(&self, work: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, AppError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| AppError::internal("Database lock poisoned"))?;
            work(&mut guard)
        })
        .await
        .map_err(|error| AppError::internal(format!("Database task failed: {error}")))?
    }
}

fn apply_sync_blocking(
    conn: &mut Connection,
    user_id: &str,
    request: SyncRequest,
) -> Result<SyncResponse, AppError> {
    let decks = keyed_documents(request.dirty_decks, DECK_ID_FIELD, "deck")?;
    let states = keyed_documents(request.dirty_knowledge_states, CARD_ID_FIELD, "knowledge state")?;
    let since = request.last_synced.map_or(0, to_millis);

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let stamp = next_stamp(&tx)?;

    for (id, data) in &decks {
        let owner: Option<String> = tx
            .query_row(
                "SELECT owner_id FROM decks WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if owner.as_deref().is_some_and(|owner| owner != user_id) {
            // Dropping the transaction rolls back earlier upserts
            return Err(AppError::conflict(format!(
                "Deck {id} belongs to another user"
            )));
        }
        tx.execute(
            "INSERT INTO decks (id, owner_id, data, last_modified) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                last_modified = excluded.last_modified",
            params![id, user_id, data, stamp],
        )?;
    }

    for (card_id, data) in &states {
        tx.execute(
            "INSERT INTO knowledge_states (user_id, card_id, data, last_modified) VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id, card_id) DO UPDATE SET
                data = excluded.data,
                last_modified = excluded.last_modified",
            params![user_id, card_id, data, stamp],
        )?;
    }

    let updated_decks = select_delta(
        &tx,
        "SELECT data, last_modified FROM decks
         WHERE owner_id = ? AND last_modified > ?
         ORDER BY last_modified, id",
        user_id,
        since,
    )?;
    let updated_knowledge_states = select_delta(
        &tx,
        "SELECT data, last_modified FROM knowledge_states
         WHERE user_id = ? AND last_modified > ?
         ORDER BY last_modified, card_id",
        user_id,
        since,
    )?;

    tx.commit()?;

    Ok(SyncResponse {
        success: true,
        new_timestamp: from_millis(stamp)
            .ok_or_else(|| AppError::internal("Sync stamp out of range"))?,
        updated_decks,
        updated_knowledge_states,
    })
}

/// Validate each document's key and serialize it for storage, dropping any
/// client-supplied `lastModified`.
fn keyed_documents(
    documents: Vec<Value>,
    key_field: &str,
    label: &str,
) -> Result<Vec<(String, String)>, AppError> {
    documents
        .into_iter()
        .map(|document| {
            let (document, _) = split_last_modified(document);
            let key = string_field(&document, key_field)
                .ok_or_else(|| {
                    AppError::bad_request(format!("Each {label} needs a string `{key_field}`"))
                })?
                .to_string();
            let data = serde_json::to_string(&document).map_err(|error| {
                AppError::internal(format!("Failed to encode {label}: {error}"))
            })?;
            Ok((key, data))
        })
        .collect()
}

/// Next stamp: the current time, or one past the last stamp if the clock
/// has not moved past it.
fn next_stamp(conn: &Connection) -> Result<i64, AppError> {
    let last: Option<i64> = conn
        .query_row("SELECT last_stamp FROM sync_clock WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    let now = to_millis(now_millis());
    let stamp = last.map_or(now, |last| now.max(last + 1));
    conn.execute(
        "INSERT INTO sync_clock (id, last_stamp) VALUES (1, ?)
         ON CONFLICT(id) DO UPDATE SET last_stamp = excluded.last_stamp",
        params![stamp],
    )?;
    Ok(stamp)
}

fn select_delta(
    conn: &Connection,
    sql: &str,
    user_id: &str,
    since: i64,
) -> Result<Vec<Value>, AppError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![user_id, since], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(data, stamp)| {
            let mut document: Value = serde_json::from_str(&data).map_err(|error| {
                AppError::internal(format!("Stored document is not JSON: {error}"))
            })?;
            let stamp = from_millis(stamp)
                .ok_or_else(|| AppError::internal("Stored stamp out of range"))?;
            if let Some(object) = document.as_object_mut() {
                object.insert(
                    LAST_MODIFIED_FIELD.to_string(),
                    Value::String(stamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
                );
            }
            Ok(document)
        })
        .collect()
}
