use revise_core::models::CARD_ID_FIELD;
use revise_core::KnowledgeState;
use serde_json::Value;

use crate::cli::KnowledgeCommands;
use crate::commands::common::CommandContext;
use crate::error::CliError;

pub async fn run_knowledge(
    command: KnowledgeCommands,
    ctx: &CommandContext,
) -> Result<(), CliError> {
    match command {
        KnowledgeCommands::Set { card_id, data } => {
            let state = build_knowledge_state(&card_id, &data)?;
            ctx.open_store()?.save_knowledge_state(&state).await?;
            println!("{}", state.card_id);
            Ok(())
        }
        KnowledgeCommands::List { limit } => {
            let states = ctx.open_store()?.list_knowledge_states(limit).await?;
            if states.is_empty() {
                println!("No knowledge states yet.");
            }
            for state in states {
                println!("{}  {}", state.card_id, state.data);
            }
            Ok(())
        }
    }
}

/// Parse the state document and stamp it with the card id.
pub fn build_knowledge_state(card_id: &str, raw: &str) -> Result<KnowledgeState, CliError> {
    let card_id = card_id.trim();
    let Value::Object(mut document) = serde_json::from_str::<Value>(raw)? else {
        return Err(CliError::InvalidKnowledgeState);
    };
    document.insert(CARD_ID_FIELD.to_string(), Value::String(card_id.to_string()));
    Ok(KnowledgeState::from_data(Value::Object(document))?)
}
