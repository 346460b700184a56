//! Turns "the server answers again" into a network-restored trigger.
//!
//! After a failed round the [`ConnectivityWatcher`] probes the API. If the
//! first probe already succeeds the failure had nothing to do with the
//! network and no retry is forced. Otherwise it keeps probing with
//! exponential backoff and fires [`TriggerHandle::network_restored`] once the
//! server is reachable.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::state::SyncState;
use crate::sync::SyncError;
use crate::trigger::TriggerHandle;

pub const HEALTH_PATH: &str = "/healthz";

/// Answers whether the sync endpoint can be reached right now.
pub trait ReachabilityProbe: Send + Sync + 'static {
    fn reachable(&self) -> impl Future<Output = bool> + Send;
}

/// Probes the API health route over HTTP.
#[derive(Clone)]
pub struct HttpHealthProbe {
    url: String,
    client: Client,
}

impl HttpHealthProbe {
    pub fn new(config: &ClientConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(SyncError::Network)?;
        Ok(Self {
            url: config.endpoint(HEALTH_PATH),
            client,
        })
    }
}

impl ReachabilityProbe for HttpHealthProbe {
    async fn reachable(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                tracing::debug!("Health probe failed: {error}");
                false
            }
        }
    }
}

/// Delay schedule between probes while the server is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(60),
        }
    }
}

pub struct ConnectivityWatcher<P: ReachabilityProbe> {
    probe: P,
    state: watch::Receiver<SyncState>,
    trigger: TriggerHandle,
    backoff: Backoff,
}

impl<P: ReachabilityProbe> ConnectivityWatcher<P> {
    pub const fn new(
        probe: P,
        state: watch::Receiver<SyncState>,
        trigger: TriggerHandle,
        backoff: Backoff,
    ) -> Self {
        Self {
            probe,
            state,
            trigger,
            backoff,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Watch until the sync client or the scheduler goes away.
    pub async fn run(mut self) {
        loop {
            if self.state.wait_for(|state| *state == SyncState::Failed).await.is_err() {
                return;
            }

            if self.probe.reachable().await {
                tracing::debug!("Server reachable after failed round; not retrying early");
            } else if self.wait_until_reachable().await {
                tracing::info!("Server reachable again; triggering sync");
                self.trigger.network_restored();
            } else {
                return;
            }

            if self.state.wait_for(|state| *state != SyncState::Failed).await.is_err() {
                return;
            }
        }
    }

    /// Returns `false` if the scheduler stopped while waiting.
    async fn wait_until_reachable(&self) -> bool {
        let mut delay = self.backoff.initial;
        loop {
            tokio::time::sleep(delay).await;
            if self.trigger.is_closed() {
                return false;
            }
            if self.probe.reachable().await {
                return true;
            }
            delay = delay.saturating_mul(2).min(self.backoff.max);
        }
    }
}
