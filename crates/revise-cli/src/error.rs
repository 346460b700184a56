use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] revise_core::Error),
    #[error(transparent)]
    Sync(#[from] revise_core::sync::SyncError),
    #[error(transparent)]
    Generation(#[from] revise_core::ai::GenerationError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Deck name cannot be empty")]
    EmptyDeckName,
    #[error("Deck not found: {0}")]
    DeckNotFound(String),
    #[error("Invalid card '{0}': expected \"question::answer\"")]
    InvalidCard(String),
    #[error("Knowledge state must be a JSON object")]
    InvalidKnowledgeState,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(#[from] revise_core::auth::AuthError),
    #[error("Not signed in. Run `revise auth login` first.")]
    NotSignedIn,
}
