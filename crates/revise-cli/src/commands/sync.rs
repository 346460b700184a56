use revise_core::models::EntityKind;
use revise_core::services::LocalStore;
use revise_core::sync::{SkipReason, SyncError, SyncOutcome};

use crate::cli::SyncCommands;
use crate::commands::common::{format_round_lines, format_sync_timestamp, CommandContext};
use crate::error::CliError;

pub async fn run_sync(command: Option<SyncCommands>, ctx: &CommandContext) -> Result<(), CliError> {
    match command {
        None => run_sync_once(ctx).await,
        Some(SyncCommands::Status) => run_sync_status(ctx).await,
        Some(SyncCommands::History { limit, json }) => run_sync_history(limit, json, ctx).await,
        Some(SyncCommands::Reset) => {
            ctx.open_store()?.reset_watermark().await?;
            println!("Watermark cleared; the next sync pulls everything.");
            Ok(())
        }
        Some(SyncCommands::Discard { decks, cards, all }) => {
            let store = ctx.open_store()?;
            let removed = if all {
                store.clear_queue().await?
            } else {
                discard_entities(&store, &decks, &cards).await?
            };
            println!("Discarded {removed} queued changes.");
            Ok(())
        }
    }
}

/// Drop the queued entries of the named decks and cards.
pub async fn discard_entities(
    store: &LocalStore,
    decks: &[String],
    cards: &[String],
) -> Result<usize, CliError> {
    let targets = decks
        .iter()
        .map(|id| (EntityKind::Deck, id))
        .chain(cards.iter().map(|id| (EntityKind::KnowledgeState, id)));
    let mut removed = 0;
    for (kind, id) in targets {
        let dropped = store.discard_pending(kind, id.trim()).await?;
        if dropped == 0 {
            println!("Nothing queued for {kind} {id}");
        }
        removed += dropped;
    }
    Ok(removed)
}

pub async fn run_sync_once(ctx: &CommandContext) -> Result<(), CliError> {
    let (client, _credentials) = ctx.sync_client()?;
    let outcome = client.sync_now().await.inspect_err(|error| {
        if matches!(error, SyncError::Conflict(_)) {
            eprintln!(
                "The server refused part of the queue. Drop the refused entry with \
                 `revise sync discard --deck <id>` and sync again."
            );
        }
    })?;
    match outcome {
        SyncOutcome::Completed(report) => {
            println!(
                "Sync completed: pushed {}, pulled {}, applied {}",
                report.pushed, report.pulled, report.applied
            );
            if report.deferred > 0 {
                println!(
                    "{} remote changes deferred; local edits will be pushed next round",
                    report.deferred
                );
            }
            Ok(())
        }
        SyncOutcome::Skipped(SkipReason::NoCredential) => Err(CliError::NotSignedIn),
        SyncOutcome::Skipped(SkipReason::Unauthorized) => {
            println!("Credential was rejected. Run `revise auth login` and sync again.");
            Ok(())
        }
        SyncOutcome::Coalesced => {
            println!("A sync round is already running.");
            Ok(())
        }
    }
}

async fn run_sync_status(ctx: &CommandContext) -> Result<(), CliError> {
    let store = ctx.open_store()?;
    let pending = store.pending_count().await?;
    let watermark = store.watermark().await?;
    let signed_in = ctx.credentials()?.current();

    println!("Profile:   {}", ctx.profile_name);
    println!("Database:  {}", ctx.db_path.display());
    match signed_in {
        Some(credential) => println!("Signed in: {}", credential.user_id),
        None => println!("Signed in: no"),
    }
    println!("Pending:   {pending}");
    println!(
        "Last pull: {}",
        watermark.map_or_else(|| "never".to_string(), format_sync_timestamp)
    );
    Ok(())
}

async fn run_sync_history(limit: usize, as_json: bool, ctx: &CommandContext) -> Result<(), CliError> {
    let rounds = ctx.open_store()?.recent_rounds(limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&rounds)?);
        return Ok(());
    }
    if rounds.is_empty() {
        println!("No sync rounds recorded.");
        return Ok(());
    }
    for line in format_round_lines(&rounds) {
        println!("{line}");
    }
    Ok(())
}
