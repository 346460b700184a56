use chrono::Utc;
use revise_core::Deck;

use crate::cli::DeckCommands;
use crate::commands::common::{
    deck_to_list_item, format_deck_lines, parse_card, CommandContext, DeckListItem,
};
use crate::error::CliError;

pub async fn run_deck(command: DeckCommands, ctx: &CommandContext) -> Result<(), CliError> {
    match command {
        DeckCommands::Add { name, cards } => run_deck_add(&name, &cards, ctx).await,
        DeckCommands::List { limit, json } => run_deck_list(limit, json, ctx).await,
        DeckCommands::Show { id } => run_deck_show(&id, ctx).await,
    }
}

pub async fn run_deck_add(
    name: &str,
    raw_cards: &[String],
    ctx: &CommandContext,
) -> Result<(), CliError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::EmptyDeckName);
    }
    let cards = raw_cards
        .iter()
        .map(|raw| parse_card(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let deck = Deck::with_cards(name, &cards);
    let store = ctx.open_store()?;
    let pending = store.save_deck(&deck).await?;
    tracing::debug!(seq = pending.seq, "Queued new deck");

    println!("{}", deck.id);
    Ok(())
}

async fn run_deck_list(limit: usize, as_json: bool, ctx: &CommandContext) -> Result<(), CliError> {
    let decks = ctx.open_store()?.list_decks(limit).await?;

    if as_json {
        let items = decks
            .iter()
            .map(deck_to_list_item)
            .collect::<Vec<DeckListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if decks.is_empty() {
        println!("No decks yet.");
    } else {
        for line in format_deck_lines(&decks, Utc::now()) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_deck_show(id: &str, ctx: &CommandContext) -> Result<(), CliError> {
    let deck_id = id
        .trim()
        .parse()
        .map_err(|_| CliError::DeckNotFound(id.to_string()))?;
    let deck = ctx
        .open_store()?
        .get_deck(&deck_id)
        .await?
        .ok_or_else(|| CliError::DeckNotFound(id.to_string()))?;
    println!("{}", serde_json::to_string_pretty(&deck.data)?);
    Ok(())
}
