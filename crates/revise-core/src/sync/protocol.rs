//! Wire format of the sync call

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SyncError;
use crate::models::{split_last_modified, Deck, KnowledgeState};

/// Body of `POST /v1/sync`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dirty_decks: Vec<Value>,
    #[serde(default)]
    pub dirty_knowledge_states: Vec<Value>,
}

impl SyncRequest {
    pub fn pushed(&self) -> usize {
        self.dirty_decks.len() + self.dirty_knowledge_states.len()
    }
}

/// Successful response of `POST /v1/sync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    pub new_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub updated_decks: Vec<Value>,
    #[serde(default)]
    pub updated_knowledge_states: Vec<Value>,
}

const fn default_success() -> bool {
    true
}

/// Remote records decoded into cache rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteDelta {
    pub decks: Vec<Deck>,
    pub knowledge_states: Vec<KnowledgeState>,
}

impl RemoteDelta {
    pub fn len(&self) -> usize {
        self.decks.len() + self.knowledge_states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SyncResponse {
    /// Decode every returned record for `user_id`.
    ///
    /// One malformed record rejects the whole response so nothing is merged
    /// from a body the client does not fully understand.
    pub fn into_delta(self, user_id: &str) -> Result<RemoteDelta, SyncError> {
        if !self.success {
            return Err(SyncError::Rejected(
                "Server reported success: false".to_string(),
            ));
        }

        let decks = self
            .updated_decks
            .into_iter()
            .map(|record| {
                let (data, stamp) = split_last_modified(record);
                let mut deck = Deck::from_data(data).map_err(reject_record)?;
                deck.owner_id = Some(user_id.to_string());
                deck.last_modified = stamp;
                Ok(deck)
            })
            .collect::<Result<Vec<_>, SyncError>>()?;

        let knowledge_states = self
            .updated_knowledge_states
            .into_iter()
            .map(|record| {
                let (data, stamp) = split_last_modified(record);
                let mut state = KnowledgeState::from_data(data).map_err(reject_record)?;
                state.user_id = Some(user_id.to_string());
                state.last_modified = stamp;
                Ok(state)
            })
            .collect::<Result<Vec<_>, SyncError>>()?;

        Ok(RemoteDelta {
            decks,
            knowledge_states,
        })
    }
}

fn reject_record(error: crate::Error) -> SyncError {
    SyncError::Rejected(format!("Malformed remote record: {error}"))
}
