//! Per-card knowledge state model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{string_field, CARD_ID_FIELD};
use crate::error::{Error, Result};

/// Study progress for one card, owned by one user.
///
/// The local cache holds a single user's states, so it is keyed by
/// `card_id`; the remote store keys by `(user_id, card_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeState {
    pub card_id: String,
    pub user_id: Option<String>,
    pub data: Value,
    pub last_modified: Option<DateTime<Utc>>,
}

impl KnowledgeState {
    /// Build a knowledge state from its document, which must carry a string `cardID`.
    pub fn from_data(data: Value) -> Result<Self> {
        let card_id = string_field(&data, CARD_ID_FIELD)
            .ok_or_else(|| {
                Error::InvalidInput("Knowledge state document must have a string `cardID`".into())
            })?
            .to_string();
        Ok(Self {
            card_id,
            user_id: None,
            data,
            last_modified: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_data_reads_card_id() {
        let state = KnowledgeState::from_data(json!({ "cardID": "c1", "box": 3 })).unwrap();
        assert_eq!(state.card_id, "c1");
        assert_eq!(state.data["box"], 3);
    }

    #[test]
    fn from_data_rejects_missing_card_id() {
        let error = KnowledgeState::from_data(json!({ "card_id": "c1" })).unwrap_err();
        assert!(error.to_string().contains("cardID"));
    }
}
