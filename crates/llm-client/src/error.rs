use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request to the chat endpoint failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("The chat endpoint returned an error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to deserialize the chat response: {0}")]
    Deserialization(String),

    #[error("The chat response contained no choices")]
    EmptyResponse,
}
