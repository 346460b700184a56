use std::fmt::Write as _;

use revise_core::ai::{parse_distractors, SourceDocument};
use serde::{Deserialize, Serialize};

use crate::config::GeminiConfig;
use crate::error::{sanitize, AppError};

/// Calls the Gemini `generateContent` REST API.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| AppError::internal(format!("HTTP client: {}", sanitize(&error))))?;
        Ok(Self { client, config })
    }

    /// Raw `Question<TAB>Answer` lines for the given documents.
    pub async fn generate_flashcard_text(
        &self,
        documents: &[SourceDocument],
    ) -> Result<String, AppError> {
        if documents.is_empty() {
            return Err(AppError::bad_request("At least one document is required"));
        }
        self.generate_text(&self.config.deck_model, &deck_prompt(documents))
            .await
    }

    pub async fn generate_distractors(
        &self,
        question: &str,
        answer: &str,
    ) -> Result<Vec<String>, AppError> {
        if question.trim().is_empty() || answer.trim().is_empty() {
            return Err(AppError::bad_request("Question and answer are required"));
        }
        let text = self
            .generate_text(
                &self.config.distractor_model,
                &distractor_prompt(question, answer),
            )
            .await?;
        Ok(parse_distractors(&text))
    }

    async fn generate_text(&self, model: &str, prompt: &str) -> Result<String, AppError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            AppError::Config("GEMINI_API_KEY is not configured on the backend".to_string())
        })?;
        let request_url = format!("{}/models/{model}:generateContent", self.config.api_url);
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
        };

        let response = self
            .client
            .post(&request_url)
            .header("x-goog-api-key", api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                AppError::external(format!("Gemini request failed: {}", sanitize(&error)))
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::external(format!(
                "Gemini request failed with HTTP {}: {}",
                status,
                compact_body(&body)
            )));
        }

        let payload = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|error| {
                AppError::external(format!("Gemini response parse failed: {}", sanitize(&error)))
            })?;
        payload
            .into_text()
            .ok_or_else(|| AppError::external("Gemini returned no text"))
    }
}

fn deck_prompt(documents: &[SourceDocument]) -> String {
    let combined = documents
        .iter()
        .map(|doc| format!("Title: {}\nContent: {}", doc.name, doc.content))
        .collect::<Vec<_>>()
        .join("\n---\n");

    let mut prompt = String::from(
        "You are an expert learning assistant. Generate high-quality flashcards from the following content.\n\
         RULES:\n\
         - Each card must be a concise, self-contained piece of knowledge.\n\
         - Extract only the most meaningful and testable information.\n\
         - Export in this exact format: TheQuestion<TAB>TheAnswer\n\
         - Each flashcard must be on a new line.\n\n\
         CONTENT TO PROCESS:\n",
    );
    prompt.push_str(&combined);
    prompt
}

fn distractor_prompt(question: &str, answer: &str) -> String {
    let mut prompt = String::from(
        "For the following flashcard, generate exactly three plausible but incorrect answer options (distractors).\n\n\
         RULES:\n\
         - The distractors must be in the same language and format as the correct answer.\n\
         - Do not include the correct answer in your response.\n\
         - Provide ONLY the distractors, each on a new line. Do not add any other text, labels, or numbers.\n\
         - Make sure the distractors are similar in length and complexity to the correct answer.\n\n",
    );
    let _ = write!(
        prompt,
        "Question: \"{question}\"\nCorrect Answer: \"{answer}\"\n\nIncorrect Options:\n"
    );
    prompt
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Option<String> {
        let text = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect::<String>();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

fn compact_body(body: &str) -> String {
    body.trim().chars().take(180).collect()
}
