use std::sync::Arc;
use std::time::Duration;

use revise_core::connectivity::{Backoff, ConnectivityWatcher, HttpHealthProbe};
use revise_core::trigger::SyncScheduler;

use crate::commands::common::CommandContext;
use crate::error::CliError;

/// Run the trigger layer until ctrl-c. Queued changes stay on disk.
pub async fn run_daemon(interval: Option<u64>, ctx: &CommandContext) -> Result<(), CliError> {
    let config = ctx.client_config()?;
    let interval = interval
        .map(Duration::from_secs)
        .or_else(|| config.sync_interval());
    let probe = HttpHealthProbe::new(&config)?;
    let (client, credentials) = ctx.sync_client()?;
    if !credentials.is_signed_in() {
        println!("Not signed in; rounds are skipped until `revise auth login` is run.");
    }

    let client = Arc::new(client);
    let mut state = client.subscribe_state();
    let watcher_state = client.subscribe_state();
    let (scheduler, trigger) = SyncScheduler::new(client, credentials.subscribe(), interval);
    let worker = scheduler.spawn();
    let watcher =
        ConnectivityWatcher::new(probe, watcher_state, trigger.clone(), Backoff::default()).spawn();

    println!(
        "Sync daemon running for profile '{}'{}. Press Ctrl-C to stop.",
        ctx.profile_name,
        interval.map_or_else(String::new, |every| format!(" every {}s", every.as_secs()))
    );

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                tracing::info!(state = %current, "Sync state changed");
            }
        }
    }

    trigger.shutdown();
    if let Err(error) = worker.await {
        tracing::warn!("Sync scheduler task failed: {error}");
    }
    watcher.abort();
    println!("Sync daemon stopped.");
    Ok(())
}
