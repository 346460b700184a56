//! Decides when sync rounds run.
//!
//! A [`SyncScheduler`] owns the loop; front ends talk to it through a
//! cloneable [`TriggerHandle`]. Triggers that arrive while a round is running
//! collapse into a single follow-up round.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::auth::Credential;
use crate::sync::{SyncClient, SyncTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Startup,
    SignedIn,
    NetworkRestored,
    Interval,
    Manual,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Startup => "startup",
            Self::SignedIn => "sign-in",
            Self::NetworkRestored => "network-restored",
            Self::Interval => "interval",
            Self::Manual => "manual",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Sync(TriggerSource),
    Shutdown,
}

/// Cloneable handle for asking the scheduler to act.
#[derive(Clone)]
pub struct TriggerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl TriggerHandle {
    pub fn sync_now(&self) {
        self.send(Command::Sync(TriggerSource::Manual));
    }

    /// Connectivity came back; flush whatever queued up offline.
    pub fn network_restored(&self) {
        self.send(Command::Sync(TriggerSource::NetworkRestored));
    }

    /// Stop the loop after any in-flight round. Queued changes stay on disk.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    /// Whether the scheduler has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            tracing::debug!(?command, "Sync scheduler already stopped");
        }
    }
}

pub struct SyncScheduler<T: SyncTransport> {
    client: Arc<SyncClient<T>>,
    credentials: watch::Receiver<Option<Credential>>,
    interval: Option<Duration>,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl<T: SyncTransport> SyncScheduler<T> {
    pub fn new(
        client: Arc<SyncClient<T>>,
        credentials: watch::Receiver<Option<Credential>>,
        interval: Option<Duration>,
    ) -> (Self, TriggerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                client,
                credentials,
                interval,
                rx,
            },
            TriggerHandle { tx },
        )
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until shut down or every handle is dropped.
    pub async fn run(mut self) {
        let mut ticker = self.interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut signed_in = self.credentials.borrow_and_update().is_some();
        let mut credentials_open = true;

        let mut running = !signed_in || self.run_with_follow_up(TriggerSource::Startup).await;

        while running {
            let source = tokio::select! {
                changed = self.credentials.changed(), if credentials_open => {
                    if changed.is_err() {
                        credentials_open = false;
                        continue;
                    }
                    let now_signed_in = self.credentials.borrow_and_update().is_some();
                    let became_available = now_signed_in && !signed_in;
                    signed_in = now_signed_in;
                    if !became_available {
                        continue;
                    }
                    TriggerSource::SignedIn
                }
                command = self.rx.recv() => match command {
                    Some(Command::Sync(source)) => source,
                    Some(Command::Shutdown) | None => break,
                },
                () = tick(&mut ticker) => TriggerSource::Interval,
            };

            running = self.run_with_follow_up(source).await;
        }

        match self.client.store().pending_count().await {
            Ok(pending) => tracing::info!(pending, "Sync scheduler stopped"),
            Err(error) => tracing::warn!("Sync scheduler stopped; pending count unavailable: {error}"),
        }
    }

    /// Run a round, then fold every trigger that arrived meanwhile into a
    /// single follow-up. Returns `false` once shutdown was requested.
    async fn run_with_follow_up(&mut self, source: TriggerSource) -> bool {
        self.run_round(source).await;
        match self.drain_pending_triggers() {
            Drained::Shutdown => false,
            Drained::Sync(count) => {
                tracing::debug!(count, "Coalescing triggers into one follow-up round");
                self.run_round(TriggerSource::Manual).await;
                true
            }
            Drained::Nothing => true,
        }
    }

    async fn run_round(&self, source: TriggerSource) {
        match self.client.sync_now().await {
            Ok(outcome) => tracing::debug!(%source, ?outcome, "Sync trigger handled"),
            Err(error) => {
                tracing::warn!(%source, "Sync failed; will retry on next trigger: {error}");
            }
        }
    }

    fn drain_pending_triggers(&mut self) -> Drained {
        let mut count = 0;
        while let Ok(command) = self.rx.try_recv() {
            match command {
                Command::Sync(_) => count += 1,
                Command::Shutdown => return Drained::Shutdown,
            }
        }
        if count == 0 {
            Drained::Nothing
        } else {
            Drained::Sync(count)
        }
    }
}

enum Drained {
    Nothing,
    Sync(usize),
    Shutdown,
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
