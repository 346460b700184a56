use std::env;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use revise_core::auth::CredentialStore;
use revise_core::config::ClientConfig;
use revise_core::db::SyncRoundRecord;
use revise_core::models::Flashcard;
use revise_core::services::LocalStore;
use revise_core::sync::{HttpSyncTransport, SyncClient};
use revise_core::Deck;
use serde::Serialize;

use crate::auth::{credential_store, KeyringCredentials};
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub const DB_PATH_ENV: &str = "REVISE_DB_PATH";
const CARD_SEPARATOR: &str = "::";

/// Profile, configuration, and database location for one invocation.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub profile_name: String,
    pub profile: CliProfile,
    pub db_path: PathBuf,
}

impl CommandContext {
    pub fn resolve(
        global_profile: Option<&str>,
        cli_db_path: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load()?;
        let profile_name = config.resolve_profile_name(global_profile);
        let profile = config.profile(&profile_name).cloned().unwrap_or_default();
        let db_path = resolve_db_path(cli_db_path, &profile_name)?;
        Ok(Self {
            profile_name,
            profile,
            db_path,
        })
    }

    pub fn client_config(&self) -> Result<ClientConfig, CliError> {
        self.profile.client_config()
    }

    pub fn open_store(&self) -> Result<LocalStore, CliError> {
        Ok(LocalStore::open_path(&self.db_path)?)
    }

    pub fn credentials(&self) -> Result<CredentialStore<KeyringCredentials>, CliError> {
        Ok(credential_store(&self.profile_name)?)
    }

    /// The one sync client for this process, plus the credential store it watches.
    pub fn sync_client(
        &self,
    ) -> Result<
        (
            SyncClient<HttpSyncTransport>,
            CredentialStore<KeyringCredentials>,
        ),
        CliError,
    > {
        let config = self.client_config()?;
        let credentials = self.credentials()?;
        let transport = HttpSyncTransport::new(&config)?;
        let client = SyncClient::new(self.open_store()?, transport, credentials.subscribe());
        Ok((client, credentials))
    }
}

pub fn resolve_db_path(
    cli_db_path: Option<PathBuf>,
    profile_name: &str,
) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path(profile_name)
}

/// Each profile caches one user's data, so each gets its own file.
pub fn default_db_path(profile_name: &str) -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("revise").join(format!("{profile_name}.db")))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub fn parse_card(raw: &str) -> Result<Flashcard, CliError> {
    let (question, answer) = raw
        .split_once(CARD_SEPARATOR)
        .ok_or_else(|| CliError::InvalidCard(raw.to_string()))?;
    let (question, answer) = (question.trim(), answer.trim());
    if question.is_empty() || answer.is_empty() {
        return Err(CliError::InvalidCard(raw.to_string()));
    }
    Ok(Flashcard::new(question, answer))
}

#[derive(Debug, Serialize)]
pub struct DeckListItem {
    pub id: String,
    pub name: String,
    pub cards: usize,
    pub last_modified: Option<DateTime<Utc>>,
}

pub fn deck_to_list_item(deck: &Deck) -> DeckListItem {
    DeckListItem {
        id: deck.id.to_string(),
        name: deck.name().to_string(),
        cards: deck.card_count(),
        last_modified: deck.last_modified,
    }
}

pub fn format_deck_lines(decks: &[Deck], now: DateTime<Utc>) -> Vec<String> {
    decks
        .iter()
        .map(|deck| {
            let short_id = deck.id.as_str().chars().take(13).collect::<String>();
            let synced = deck.last_modified.map_or_else(
                || "not synced".to_string(),
                |stamp| format_relative_time(stamp, now),
            );
            format!(
                "{short_id:<13}  {:<32}  {:>4} cards  {synced}",
                truncate(deck.name(), 32),
                deck.card_count()
            )
        })
        .collect()
}

pub fn format_round_lines(rounds: &[SyncRoundRecord]) -> Vec<String> {
    rounds
        .iter()
        .map(|round| {
            let mut line = format!(
                "{}  {:<9}  pushed={} pulled={}",
                format_sync_timestamp(round.finished_at),
                round.outcome,
                round.pushed,
                round.pulled
            );
            if let Some(error) = &round.error {
                line.push_str("  error=");
                line.push_str(error);
            }
            line
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(timestamp).num_milliseconds().max(0);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let mut truncated = value
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}
