use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{Duration, TimeZone, Utc};
use clap::Parser;
use pretty_assertions::assert_eq;
use revise_core::auth::{AuthError, AuthHandshake};
use revise_core::db::SyncRoundRecord;

use crate::cli::{Cli, Commands, CompletionShell, DeckCommands, SyncCommands};
use crate::commands::auth_cmd::forward_signals;
use crate::commands::common::{
    format_relative_time, format_round_lines, format_sync_timestamp, parse_card, resolve_db_path,
    CommandContext,
};
use crate::commands::completions::render_completions;
use crate::commands::config::{apply_profile_update, ProfileUpdate};
use crate::commands::deck::run_deck_add;
use crate::commands::generate::read_document;
use crate::commands::sync::discard_entities;
use crate::commands::knowledge::build_knowledge_state;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

fn temp_context(dir: &tempfile::TempDir) -> CommandContext {
    CommandContext {
        profile_name: "test".to_string(),
        profile: CliProfile::default(),
        db_path: dir.path().join("data").join("test.db"),
    }
}

#[test]
fn parse_card_splits_on_separator() {
    let card = parse_card(" ¿Qué? :: What? ").unwrap();
    assert_eq!(card.question, "¿Qué?");
    assert_eq!(card.answer, "What?");
}

#[test]
fn parse_card_rejects_missing_side() {
    assert!(matches!(parse_card("no separator"), Err(CliError::InvalidCard(_))));
    assert!(matches!(parse_card("question::  "), Err(CliError::InvalidCard(_))));
}

#[test]
fn knowledge_state_gets_card_id_from_argument() {
    let state = build_knowledge_state(" c1 ", r#"{"box": 2, "cardID": "ignored"}"#).unwrap();
    assert_eq!(state.card_id, "c1");
    assert_eq!(state.data["cardID"], "c1");
    assert_eq!(state.data["box"], 2);
}

#[test]
fn knowledge_state_must_be_object() {
    assert!(matches!(
        build_knowledge_state("c1", "[1, 2]"),
        Err(CliError::InvalidKnowledgeState)
    ));
    assert!(matches!(
        build_knowledge_state("c1", "{not json"),
        Err(CliError::Serialization(_))
    ));
}

#[test]
fn format_relative_time_units() {
    let now = Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap();
    assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
    assert_eq!(format_relative_time(now - Duration::minutes(2), now), "2m ago");
    assert_eq!(format_relative_time(now - Duration::hours(2), now), "2h ago");
    assert_eq!(format_relative_time(now - Duration::days(3), now), "3d ago");
    assert_eq!(format_relative_time(now + Duration::minutes(5), now), "just now");
}

#[test]
fn format_sync_timestamp_returns_utc_label() {
    let epoch = Utc.timestamp_millis_opt(0).unwrap();
    assert_eq!(format_sync_timestamp(epoch), "1970-01-01 00:00:00 UTC");
}

#[test]
fn format_round_lines_include_counts_and_error() {
    let at = Utc.timestamp_millis_opt(0).unwrap();
    let rounds = vec![SyncRoundRecord {
        id: 1,
        started_at: at,
        finished_at: at,
        pushed: 3,
        pulled: 0,
        outcome: "failed".to_string(),
        error: Some("Server error (500): boom".to_string()),
    }];

    let rendered = format_round_lines(&rounds);
    assert_eq!(rendered.len(), 1);
    assert!(rendered[0].contains("failed"));
    assert!(rendered[0].contains("pushed=3 pulled=0"));
    assert!(rendered[0].contains("error=Server error (500): boom"));
}

#[test]
fn resolve_db_path_prefers_explicit_path() {
    let explicit = PathBuf::from("/tmp/revise-explicit.db");
    assert_eq!(
        resolve_db_path(Some(explicit.clone()), "default").unwrap(),
        explicit
    );
}

#[test]
fn apply_profile_update_merges_and_activates() {
    let mut config = CliProfilesConfig::default();
    let name = apply_profile_update(
        &mut config,
        Some("work"),
        ProfileUpdate {
            api_base_url: Some("https://api.example.com/".to_string()),
            sync_interval_secs: Some(120),
            ..ProfileUpdate::default()
        },
        true,
    )
    .unwrap();
    assert_eq!(name, "work");
    assert_eq!(config.active_profile.as_deref(), Some("work"));

    apply_profile_update(
        &mut config,
        Some("work"),
        ProfileUpdate {
            request_timeout_secs: Some(9),
            ..ProfileUpdate::default()
        },
        false,
    )
    .unwrap();

    let profile = config.profile("work").unwrap();
    assert_eq!(profile.api_base_url.as_deref(), Some("https://api.example.com"));
    assert_eq!(profile.request_timeout_secs, Some(9));
    assert_eq!(profile.sync_interval_secs, Some(120));
}

#[test]
fn apply_profile_update_rejects_invalid_url_without_saving() {
    let mut config = CliProfilesConfig {
        version: 1,
        active_profile: None,
        profiles: BTreeMap::new(),
    };
    let result = apply_profile_update(
        &mut config,
        Some("broken"),
        ProfileUpdate {
            api_base_url: Some("api.example.com".to_string()),
            ..ProfileUpdate::default()
        },
        true,
    );

    assert!(matches!(result, Err(CliError::Config(_))));
    assert!(config.profiles.is_empty());
    assert_eq!(config.active_profile, None);
}

#[test]
fn cli_parses_global_profile_after_subcommand() {
    let cli = Cli::try_parse_from([
        "revise", "deck", "add", "Verbs", "--card", "ser::to be", "--profile", "work",
    ])
    .unwrap();
    assert_eq!(cli.profile.as_deref(), Some("work"));
    match cli.command {
        Commands::Deck {
            command: DeckCommands::Add { name, cards },
        } => {
            assert_eq!(name, "Verbs");
            assert_eq!(cards, vec!["ser::to be".to_string()]);
        }
        _ => panic!("expected deck add"),
    }
}

#[test]
fn bare_sync_runs_one_round() {
    let cli = Cli::try_parse_from(["revise", "sync"]).unwrap();
    assert!(matches!(cli.command, Commands::Sync { command: None }));

    let cli = Cli::try_parse_from(["revise", "sync", "history", "--limit", "3"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Sync {
            command: Some(SyncCommands::History { limit: 3, json: false })
        }
    ));
}

#[test]
fn sync_discard_needs_a_target() {
    assert!(Cli::try_parse_from(["revise", "sync", "discard"]).is_err());
    assert!(Cli::try_parse_from(["revise", "sync", "discard", "--all", "--deck", "d1"]).is_err());

    let cli = Cli::try_parse_from(["revise", "sync", "discard", "--card", "c1"]).unwrap();
    match cli.command {
        Commands::Sync {
            command: Some(SyncCommands::Discard { decks, cards, all }),
        } => {
            assert!(decks.is_empty());
            assert_eq!(cards, vec!["c1".to_string()]);
            assert!(!all);
        }
        _ => panic!("expected sync discard"),
    }
}

#[test]
fn completions_name_the_binary() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("revise"));
}

#[test]
fn read_document_uses_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chapter-1.txt");
    std::fs::write(&path, "Mitochondria make ATP.").unwrap();

    let document = read_document(&path).unwrap();
    assert_eq!(document.name, "chapter-1.txt");
    assert_eq!(document.content, "Mitochondria make ATP.");
}

#[tokio::test(flavor = "multi_thread")]
async fn deck_add_caches_and_queues() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = temp_context(&dir);

    run_deck_add(
        "Spanish verbs",
        &["ser::to be".to_string(), "tener::to have".to_string()],
        &ctx,
    )
    .await
    .unwrap();

    let store = ctx.open_store().unwrap();
    let decks = store.list_decks(10).await.unwrap();
    assert_eq!(decks.len(), 1);
    assert_eq!(decks[0].name(), "Spanish verbs");
    assert_eq!(decks[0].card_count(), 2);
    assert_eq!(store.pending_count().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn discard_drops_only_named_entries() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = temp_context(&dir);
    run_deck_add("Refused", &[], &ctx).await.unwrap();
    run_deck_add("Mine", &[], &ctx).await.unwrap();

    let store = ctx.open_store().unwrap();
    let refused = store
        .list_decks(10)
        .await
        .unwrap()
        .into_iter()
        .find(|deck| deck.name() == "Refused")
        .unwrap();

    let removed = discard_entities(
        &store,
        &[refused.id.as_str().to_string(), "unknown".to_string()],
        &[],
    )
    .await
    .unwrap();

    assert_eq!(removed, 1);
    assert_eq!(store.pending_count().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn deck_add_rejects_blank_name_without_queueing() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = temp_context(&dir);

    let result = run_deck_add("   ", &[], &ctx).await;

    assert!(matches!(result, Err(CliError::EmptyDeckName)));
    assert!(!ctx.db_path.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn login_signals_from_input_yield_credential() {
    let (handshake, surface) = AuthHandshake::new();
    let input = "{\"type\":\"ready\"}\n\n{\"type\":\"success\",\"token\":\"tok\",\"id\":\"user-1\",\"email\":\"a@b.c\"}\n";
    tokio::spawn(forward_signals(input.as_bytes(), surface));

    let credential = handshake
        .acquire(std::time::Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(credential.user_id, "user-1");
    assert_eq!(credential.email.as_deref(), Some("a@b.c"));
}

#[tokio::test(flavor = "multi_thread")]
async fn login_reports_unparseable_input() {
    let (handshake, surface) = AuthHandshake::new();
    tokio::spawn(forward_signals("not json\n".as_bytes(), surface));

    let error = handshake
        .acquire(std::time::Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(error, AuthError::Surface { ref code, .. } if code == "INVALID_MESSAGE"));
}

#[tokio::test(flavor = "multi_thread")]
async fn login_input_ending_early_cancels() {
    let (handshake, surface) = AuthHandshake::new();
    tokio::spawn(forward_signals("{\"type\":\"ready\"}\n".as_bytes(), surface));

    let error = handshake
        .acquire(std::time::Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(error, AuthError::Cancelled));
}
