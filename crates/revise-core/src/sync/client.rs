//! One sync round at a time against a [`SyncTransport`]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};

use super::{PushPullReply, SyncError, SyncRequest, SyncTransport};
use crate::auth::Credential;
use crate::services::LocalStore;
use crate::state::SyncState;
use crate::util::now_millis;

/// Why a round did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoCredential,
    Unauthorized,
}

/// Counts from a completed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: usize,
    pub pulled: usize,
    pub applied: usize,
    pub stale: usize,
    /// Remote records held back because the entity was edited mid-round
    pub deferred: usize,
    pub watermark: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped(SkipReason),
    /// Another round was already running
    Coalesced,
}

/// Pushes the pending queue and pulls the remote delta.
///
/// Built once per process and shared behind an `Arc`. The local store lock
/// is only held to snapshot and to commit, never across the network call.
pub struct SyncClient<T: SyncTransport> {
    store: LocalStore,
    transport: T,
    credentials: watch::Receiver<Option<Credential>>,
    round: Mutex<()>,
    state: Arc<watch::Sender<SyncState>>,
}

impl<T: SyncTransport> SyncClient<T> {
    pub fn new(
        store: LocalStore,
        transport: T,
        credentials: watch::Receiver<Option<Credential>>,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            store,
            transport,
            credentials,
            round: Mutex::new(()),
            state: Arc::new(state),
        }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Run a round unless one is already in flight.
    ///
    /// On any error the queue and watermark are left exactly as they were,
    /// so the next round resends the same batch.
    pub async fn sync_now(&self) -> Result<SyncOutcome, SyncError> {
        let Ok(_round) = self.round.try_lock() else {
            tracing::debug!("Sync round already in flight; coalescing");
            return Ok(SyncOutcome::Coalesced);
        };

        let credential = self.credentials.borrow().clone();
        let Some(credential) = credential else {
            tracing::info!("No credential available; skipping sync");
            return Ok(SyncOutcome::Skipped(SkipReason::NoCredential));
        };

        self.state.send_replace(SyncState::InFlight);
        let started_at = now_millis();
        let result = self.run_round(&credential).await;
        let finished_at = now_millis();

        match &result {
            Ok(SyncOutcome::Completed(report)) => {
                tracing::info!(
                    pushed = report.pushed,
                    pulled = report.pulled,
                    deferred = report.deferred,
                    watermark = %report.watermark,
                    "Sync round completed"
                );
                self.record(started_at, finished_at, report.pushed, report.pulled, None)
                    .await;
                self.state.send_replace(SyncState::Succeeded);
            }
            Ok(_) => {
                self.state.send_replace(SyncState::Idle);
            }
            Err(error) => {
                tracing::warn!(retryable = error.is_retryable(), "Sync round failed: {error}");
                self.record(started_at, finished_at, 0, 0, Some(&error.to_string()))
                    .await;
                self.state.send_replace(SyncState::Failed);
            }
        }

        result
    }

    async fn run_round(&self, credential: &Credential) -> Result<SyncOutcome, SyncError> {
        let snapshot = self.store.snapshot().await?;
        let last_synced = self.store.watermark().await?;
        let (dirty_decks, dirty_knowledge_states) = snapshot.partition();
        let request = SyncRequest {
            last_synced,
            dirty_decks,
            dirty_knowledge_states,
        };
        tracing::debug!(
            pending = snapshot.len(),
            last_synced = ?last_synced,
            "Starting sync round"
        );

        let response = match self.transport.push_pull(&credential.token, &request).await? {
            PushPullReply::Accepted(response) => response,
            PushPullReply::Unauthorized => {
                tracing::warn!("Sync credential was rejected; keeping queue for next sign-in");
                return Ok(SyncOutcome::Skipped(SkipReason::Unauthorized));
            }
        };

        let new_timestamp = response.new_timestamp;
        let delta = response.into_delta(&credential.user_id)?;
        let merge = self
            .store
            .commit_round(
                snapshot.max_seq(),
                &delta.decks,
                &delta.knowledge_states,
                new_timestamp,
            )
            .await?;

        Ok(SyncOutcome::Completed(SyncReport {
            pushed: request.pushed(),
            pulled: delta.len(),
            applied: merge.applied,
            stale: merge.stale,
            deferred: merge.deferred,
            watermark: merge.watermark.unwrap_or(new_timestamp),
        }))
    }

    async fn record(
        &self,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        pushed: usize,
        pulled: usize,
        error: Option<&str>,
    ) {
        if let Err(record_error) = self
            .store
            .record_round(started_at, finished_at, pushed, pulled, error)
            .await
        {
            tracing::warn!("Failed to record sync round: {record_error}");
        }
    }
}
