//! Database layer for Revise

mod cache;
mod connection;
mod migrations;
mod queue;
mod sync_state;

pub use cache::{DeckRepository, KnowledgeRepository, SqliteCacheRepository};
pub use connection::Database;
pub use queue::{PendingQueue, QueueSnapshot};
pub use sync_state::{SyncRoundRecord, SyncStateRepository};
