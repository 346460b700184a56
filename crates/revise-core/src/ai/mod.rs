//! Client for the server-side flashcard generation endpoints.
//!
//! Generation runs remotely; this module only shapes requests and parses the
//! model's plain-text output. Failures are typed and never touch sync state.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ClientConfig;
use crate::models::Flashcard;
use crate::util::compact_text;

pub const DECK_PATH: &str = "/v1/ai/deck";
pub const DISTRACTORS_PATH: &str = "/v1/ai/distractors";

/// A source document to turn into flashcards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckGenerationRequest {
    pub documents: Vec<SourceDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckGenerationResponse {
    pub flashcard_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistractorRequest {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistractorResponse {
    pub distractors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid generation request: {0}")]
    InvalidConfiguration(String),
    #[error("Generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Generation API error: {0}")]
    Api(String),
    #[error("Generation returned no usable output")]
    EmptyResponse,
}

pub type GenerationResult<T> = Result<T, GenerationError>;

/// Parse `Question<TAB>Answer` lines, skipping anything malformed.
pub fn parse_flashcards(text: &str) -> Vec<Flashcard> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let question = parts.next()?.trim();
            let answer = parts.next()?.trim();
            if parts.next().is_some() || question.is_empty() || answer.is_empty() {
                return None;
            }
            Some(Flashcard::new(question, answer))
        })
        .collect()
}

/// One distractor per non-empty line.
pub fn parse_distractors(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[derive(Clone)]
pub struct GenerationClient {
    deck_endpoint: String,
    distractors_endpoint: String,
    client: Client,
}

impl GenerationClient {
    pub fn new(config: &ClientConfig) -> GenerationResult<Self> {
        Ok(Self {
            deck_endpoint: config.endpoint(DECK_PATH),
            distractors_endpoint: config.endpoint(DISTRACTORS_PATH),
            client: Client::builder().timeout(config.request_timeout()).build()?,
        })
    }

    pub async fn generate_deck(
        &self,
        token: &str,
        documents: Vec<SourceDocument>,
    ) -> GenerationResult<Vec<Flashcard>> {
        if documents.iter().all(|doc| doc.content.trim().is_empty()) {
            return Err(GenerationError::InvalidConfiguration(
                "at least one document with content is required".to_string(),
            ));
        }

        let response = self
            .client
            .post(&self.deck_endpoint)
            .bearer_auth(token)
            .json(&DeckGenerationRequest { documents })
            .send()
            .await?;
        let payload: DeckGenerationResponse = read_json(response).await?;

        let cards = parse_flashcards(&payload.flashcard_text);
        tracing::debug!(cards = cards.len(), "Parsed generated flashcards");
        if cards.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(cards)
    }

    pub async fn generate_distractors(
        &self,
        token: &str,
        question: &str,
        answer: &str,
    ) -> GenerationResult<Vec<String>> {
        if question.trim().is_empty() || answer.trim().is_empty() {
            return Err(GenerationError::InvalidConfiguration(
                "question and answer are required".to_string(),
            ));
        }

        let response = self
            .client
            .post(&self.distractors_endpoint)
            .bearer_auth(token)
            .json(&DistractorRequest {
                question: question.to_string(),
                answer: answer.to_string(),
            })
            .send()
            .await?;
        let payload: DistractorResponse = read_json(response).await?;

        let distractors = payload
            .distractors
            .into_iter()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty() && value != answer.trim())
            .collect::<Vec<_>>();
        if distractors.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(distractors)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> GenerationResult<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GenerationError::Api(describe_error(status, &body)))
}

fn describe_error(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|payload| payload.error)
        .unwrap_or_else(|| compact_text(body));
    if message.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{message} ({})", status.as_u16())
    }
}
