use std::path::Path;

use revise_core::ai::{GenerationClient, SourceDocument};
use revise_core::Deck;

use crate::cli::GenerateCommands;
use crate::commands::common::CommandContext;
use crate::error::CliError;

pub async fn run_generate(command: GenerateCommands, ctx: &CommandContext) -> Result<(), CliError> {
    let client = GenerationClient::new(&ctx.client_config()?)?;
    let credential = ctx.credentials()?.current().ok_or(CliError::NotSignedIn)?;

    match command {
        GenerateCommands::Deck { files, save } => {
            let documents = files
                .iter()
                .map(|path| read_document(path))
                .collect::<Result<Vec<_>, _>>()?;
            let cards = client.generate_deck(&credential.token, documents).await?;

            for card in &cards {
                println!("{}\t{}", card.question, card.answer);
            }
            if let Some(name) = save {
                let deck = Deck::with_cards(name.trim(), &cards);
                ctx.open_store()?.save_deck(&deck).await?;
                println!("Saved {} cards as deck {}", cards.len(), deck.id);
            }
            Ok(())
        }
        GenerateCommands::Distractors { question, answer } => {
            let distractors = client
                .generate_distractors(&credential.token, &question, &answer)
                .await?;
            for distractor in distractors {
                println!("{distractor}");
            }
            Ok(())
        }
    }
}

pub fn read_document(path: &Path) -> Result<SourceDocument, CliError> {
    let content = std::fs::read_to_string(path)?;
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
    Ok(SourceDocument { name, content })
}
