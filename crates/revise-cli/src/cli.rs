use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "revise")]
#[command(about = "Study flashcard decks offline and sync them across devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for API and credential configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create and inspect decks
    Deck {
        #[command(subcommand)]
        command: DeckCommands,
    },
    /// Record study progress for cards
    Knowledge {
        #[command(subcommand)]
        command: KnowledgeCommands,
    },
    /// Run one sync round, or inspect sync state
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Keep syncing in the background until interrupted
    Daemon {
        /// Seconds between periodic rounds (profile value when omitted)
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
    /// Generate flashcards or distractors with the AI endpoints
    Generate {
        #[command(subcommand)]
        command: GenerateCommands,
    },
    /// Sign in, inspect, or sign out the profile credential
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum DeckCommands {
    /// Create a deck and queue it for sync
    Add {
        /// Deck name
        name: String,
        /// Card as "question::answer" (repeatable)
        #[arg(short, long = "card", value_name = "CARD")]
        cards: Vec<String>,
    },
    /// List cached decks
    List {
        /// Number of decks to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a deck document
    Show {
        /// Deck ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum KnowledgeCommands {
    /// Replace a card's knowledge state and queue it for sync
    Set {
        /// Card ID
        card_id: String,
        /// State document as a JSON object
        #[arg(long, value_name = "JSON", default_value = "{}")]
        data: String,
    },
    /// List cached knowledge states
    List {
        /// Number of states to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show pending changes and the last pull watermark
    Status,
    /// List recent sync rounds
    History {
        /// Number of rounds to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget the watermark so the next round pulls everything
    Reset,
    /// Drop queued changes the server keeps refusing; cached copies stay
    Discard {
        /// Deck id whose queued edits should be dropped
        #[arg(
            long = "deck",
            value_name = "ID",
            required_unless_present_any = ["cards", "all"]
        )]
        decks: Vec<String>,
        /// Card id whose queued knowledge state should be dropped
        #[arg(long = "card", value_name = "CARD_ID")]
        cards: Vec<String>,
        /// Drop the whole queue
        #[arg(long, conflicts_with_all = ["decks", "cards"])]
        all: bool,
    },
}

#[derive(Subcommand)]
pub enum GenerateCommands {
    /// Build a deck from text documents
    Deck {
        /// Source documents
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
        /// Save the generated cards as a deck with this name
        #[arg(long, value_name = "NAME")]
        save: Option<String>,
    },
    /// Suggest wrong answers for a card
    Distractors {
        question: String,
        answer: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// API base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// HTTP request timeout in seconds
        #[arg(long, value_name = "SECS")]
        request_timeout_secs: Option<u64>,
        /// Seconds between daemon sync rounds
        #[arg(long, value_name = "SECS")]
        sync_interval_secs: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in by reading auth surface messages (JSON lines) from stdin
    Login {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Seconds to wait for the auth surface
        #[arg(long, value_name = "SECS", default_value = "300")]
        timeout: u64,
    },
    /// Show auth status for profile
    Status {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
    /// Logout profile and clear stored credential
    Logout {
        /// Optional profile override
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}
