//! Deck model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{string_field, DECK_ID_FIELD};
use crate::error::{Error, Result};

/// Stable deck identifier.
///
/// New decks get a UUID v7 string, but ids created by other installations
/// are accepted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeckId(String);

impl DeckId {
    /// Create a new unique deck ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DeckId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeckId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("Deck id must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A single question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}

impl Flashcard {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// A deck cached locally.
///
/// `data` is the opaque document the UI owns; only its `id` field is
/// interpreted. `last_modified` is the server stamp of the version held
/// here, `None` until the deck has been through a successful sync round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    pub id: DeckId,
    pub owner_id: Option<String>,
    pub data: Value,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Deck {
    /// Build a deck from its data document, which must carry a string `id`.
    pub fn from_data(data: Value) -> Result<Self> {
        let id = string_field(&data, DECK_ID_FIELD)
            .ok_or_else(|| Error::InvalidInput("Deck document must have a string `id`".into()))?
            .parse()?;
        Ok(Self {
            id,
            owner_id: None,
            data,
            last_modified: None,
        })
    }

    /// Build a new deck document from generated or typed cards.
    ///
    /// Each card gets its own id so knowledge states can reference it.
    #[must_use]
    pub fn with_cards(name: &str, cards: &[Flashcard]) -> Self {
        let id = DeckId::new();
        let cards = cards
            .iter()
            .map(|card| {
                json!({
                    "id": Uuid::now_v7().to_string(),
                    "question": card.question,
                    "answer": card.answer,
                })
            })
            .collect::<Vec<_>>();
        let data = json!({
            "id": id.as_str(),
            "name": name,
            "cards": cards,
        });
        Self {
            id,
            owner_id: None,
            data,
            last_modified: None,
        }
    }

    /// Display name from the document, falling back to the id.
    pub fn name(&self) -> &str {
        string_field(&self.data, "name").unwrap_or_else(|| self.id.as_str())
    }

    /// Number of cards in the document's `cards` array.
    pub fn card_count(&self) -> usize {
        self.data
            .get("cards")
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }
}
