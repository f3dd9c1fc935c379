use crate::responses::{ApiErrorResponse, ChatMessage, ChatRequest, ChatResponse};
use async_trait::async_trait;
use configuration::LlmSettings;
use std::time::Duration;

pub mod error;
pub mod extract;
pub mod responses;
pub mod suggest;
pub mod transcript;
// --- Public API ---
pub use error::LlmError;
pub use extract::extract_json_object;
pub use suggest::{Suggester, proposal_from_text, proposal_from_value};
pub use transcript::TranscriptLog;

/// The abstract interface for a chat-completion backend.
/// The tuning loop only ever talks to this trait, so the real HTTP client can be
/// swapped for a scripted one in tests.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends one system + user exchange and returns the assistant's reply text.
    async fn chat(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

/// A `ChatClient` for any OpenAI-compatible `/chat/completions` endpoint
/// (OpenAI, LM Studio, Ollama, vLLM, ...).
#[derive(Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    transcript: Option<TranscriptLog>,
}

impl OpenAiCompatClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            top_p: settings.top_p,
            max_tokens: settings.max_tokens,
            transcript: None,
        })
    }

    pub fn with_transcript(mut self, transcript: TranscriptLog) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Caps the reply length, e.g. for cheap liveness checks.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(&self, system: &str, user: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorResponse>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Deserialization(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let request = self.build_request(system, user);
        if let Some(transcript) = &self.transcript {
            transcript.record_payload(&request).await;
        }

        let result = self.send(&request).await;

        if let Some(transcript) = &self.transcript {
            match &result {
                Ok(text) => transcript.record_exchange(system, user, Ok(text)).await,
                Err(e) => {
                    transcript
                        .record_exchange(system, user, Err(&e.to_string()))
                        .await
                }
            }
        }
        result
    }
}
