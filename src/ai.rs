use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GenerationSettings;

const SYSTEM_PROMPT: &str = "You write concise, professional cover letters. \
    Never invent names, contact details, employers or achievements that are not given to you.";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no API key configured for text generation")]
    MissingCredential,

    #[error("request to generation service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("generation service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("could not parse generation response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("generation service returned no text")]
    Empty,
}

pub trait AIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ProviderError>;
    fn model_name(&self) -> &str;
}

/// Build the configured provider, or `None` when no credential is set.
pub fn create_provider(settings: &GenerationSettings) -> Option<Box<dyn AIProvider>> {
    match OpenAIProvider::new(settings) {
        Ok(provider) => Some(Box::new(provider)),
        Err(_) => None,
    }
}

// --- OpenAI-compatible chat completions ---

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug)]
pub struct OpenAIProvider {
    api_key: String,
    model_id: String,
    endpoint: String,
    temperature: f32,
    client: reqwest::blocking::Client,
}

impl OpenAIProvider {
    pub fn new(settings: &GenerationSettings) -> Result<Self, ProviderError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ProviderError::MissingCredential)?;
        Ok(Self {
            api_key,
            model_id: settings.model.clone(),
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            temperature: settings.temperature,
            client: reqwest::blocking::Client::new(),
        })
    }
}

impl AIProvider for OpenAIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: self.model_id.clone(),
            max_tokens,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ProviderError::Status { status, body });
        }

        parse_completion(&body)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

/// First non-blank message content from a chat completions response body.
fn parse_completion(body: &str) -> Result<String, ProviderError> {
    let response: ChatResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .filter_map(|choice| choice.message.content)
        .find(|text| !text.trim().is_empty())
        .ok_or(ProviderError::Empty)
}
