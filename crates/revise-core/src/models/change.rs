//! Queued local mutations

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{string_field, CARD_ID_FIELD, DECK_ID_FIELD};
use crate::error::{Error, Result};

/// Which remote table a change targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Deck,
    KnowledgeState,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deck => "deck",
            Self::KnowledgeState => "knowledge_state",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A full document to upsert remotely.
///
/// Constructors validate the key field, so every queued change can be
/// partitioned and keyed without re-checking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EntityChange {
    Deck(Value),
    KnowledgeState(Value),
}

impl EntityChange {
    pub fn deck(data: Value) -> Result<Self> {
        if string_field(&data, DECK_ID_FIELD).is_none() {
            return Err(Error::InvalidInput(
                "Deck change must have a string `id`".into(),
            ));
        }
        Ok(Self::Deck(data))
    }

    pub fn knowledge_state(data: Value) -> Result<Self> {
        if string_field(&data, CARD_ID_FIELD).is_none() {
            return Err(Error::InvalidInput(
                "Knowledge state change must have a string `cardID`".into(),
            ));
        }
        Ok(Self::KnowledgeState(data))
    }

    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Deck(_) => EntityKind::Deck,
            Self::KnowledgeState(_) => EntityKind::KnowledgeState,
        }
    }

    pub const fn data(&self) -> &Value {
        match self {
            Self::Deck(data) | Self::KnowledgeState(data) => data,
        }
    }

    pub fn into_data(self) -> Value {
        match self {
            Self::Deck(data) | Self::KnowledgeState(data) => data,
        }
    }

    /// The entity's id within its kind (`id` for decks, `cardID` for states).
    pub fn entity_id(&self) -> Result<&str> {
        let field = match self.kind() {
            EntityKind::Deck => DECK_ID_FIELD,
            EntityKind::KnowledgeState => CARD_ID_FIELD,
        };
        string_field(self.data(), field)
            .ok_or_else(|| Error::InvalidInput(format!("{} change is missing `{field}`", self.kind())))
    }

    /// Key used to find queued changes for the same entity, e.g. `deck:d1`.
    pub fn entity_key(&self) -> Result<String> {
        Ok(entity_key(self.kind(), self.entity_id()?))
    }
}

/// Key shared by queue rows and cache lookups.
pub fn entity_key(kind: EntityKind, id: &str) -> String {
    format!("{kind}:{id}")
}

/// One entry of the durable pending-change queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    /// Position in the queue; strictly increasing in insertion order
    pub seq: i64,
    pub change: EntityChange,
    pub enqueued_at: DateTime<Utc>,
}
