use serde::{Deserialize, Serialize};

/// Body of `POST {base_url}/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The subset of a chat-completion response we read.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    /// Some servers send `null` content for tool or refusal replies.
    #[serde(default)]
    pub content: Option<String>,
}

/// OpenAI-style error body: `{"error": {"message": "..."}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialises_expected_shape() {
        let request = ChatRequest {
            model: "local".into(),
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
            temperature: 0.4,
            top_p: 0.95,
            max_tokens: 128,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 128);
    }

    #[test]
    fn response_tolerates_null_content() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":null}}]}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert!(response.choices[0].message.content.is_none());
    }
}
