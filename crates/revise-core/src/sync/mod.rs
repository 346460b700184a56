//! Sync protocol between the local store and the Revise API.
//!
//! A round snapshots the pending queue, pushes it together with the local
//! watermark, and merges the returned delta. The queue prefix is cleared only
//! after the merge commits.

mod client;
mod error;
mod protocol;
mod transport;

pub use client::{SkipReason, SyncClient, SyncOutcome, SyncReport};
pub use error::SyncError;
pub use protocol::{RemoteDelta, SyncRequest, SyncResponse};
pub use transport::{HttpSyncTransport, PushPullReply, SyncTransport, SYNC_PATH};

#[cfg(test)]
pub(crate) use client::tests::FakeTransport;
