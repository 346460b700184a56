//! Data models for Revise

mod change;
mod deck;
mod knowledge;

pub use change::{entity_key, EntityChange, EntityKind, PendingChange};
pub use deck::{Deck, DeckId, Flashcard};
pub use knowledge::KnowledgeState;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Field carrying a deck's stable id inside its data document.
pub const DECK_ID_FIELD: &str = "id";
/// Field carrying a knowledge state's card id inside its data document.
pub const CARD_ID_FIELD: &str = "cardID";
/// Field the sync endpoint injects into returned records.
pub const LAST_MODIFIED_FIELD: &str = "lastModified";

/// Read a non-empty string field from a JSON object.
pub fn string_field<'a>(data: &'a Value, field: &str) -> Option<&'a str> {
    data.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Remove the server stamp from a returned record, leaving the stored document.
///
/// Records without a parseable `lastModified` come back with `None`.
pub fn split_last_modified(mut data: Value) -> (Value, Option<DateTime<Utc>>) {
    let stamp = data
        .as_object_mut()
        .and_then(|object| object.remove(LAST_MODIFIED_FIELD))
        .and_then(|value| value.as_str().map(ToString::to_string))
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|stamp| stamp.with_timezone(&Utc));
    (data, stamp)
}
