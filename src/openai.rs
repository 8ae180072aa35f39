use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::state::{Message, Role};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// Fixed request parameters; no streaming, no retry, no timeout.
const MODEL: &str = "gpt-3.5-turbo";
const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f64 = 0.7;

/// The one network seam. Tests substitute a stub implementation.
#[async_trait]
pub trait CompletionApi {
    /// One completion attempt: the prior log in order, then the new user
    /// turn. Returns the assistant's reply text.
    async fn complete(
        &self,
        history: &[Message],
        text: &str,
        api_key: &str,
    ) -> Result<String, ChatError>;
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    content: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: &'static str,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

fn build_request(history: &[Message], text: &str) -> CompletionRequest {
    let mut messages: Vec<WireMessage> = history
        .iter()
        .map(|m| WireMessage {
            role: m.role,
            content: m.content.clone(),
        })
        .collect();
    messages.push(WireMessage {
        role: Role::User,
        content: text.to_string(),
    });
    CompletionRequest {
        model: MODEL,
        messages,
        max_tokens: MAX_TOKENS,
        temperature: TEMPERATURE,
    }
}

fn extract_reply(response: CompletionResponse) -> Result<String, ChatError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or(ChatError::InvalidResponseShape)
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    base_url: String,
}

impl OpenAIClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Override the endpoint base, e.g. for a self-hosted gateway.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for OpenAIClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionApi for OpenAIClient {
    async fn complete(
        &self,
        history: &[Message],
        text: &str,
        api_key: &str,
    ) -> Result<String, ChatError> {
        let request = build_request(history, text);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::ApiRequestFailed {
                status: response.status().as_u16(),
            });
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|_| ChatError::InvalidResponseShape)?;

        extract_reply(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_keeps_history_order_then_new_turn() {
        let history = vec![
            Message::new(1, Role::User, "2+2?"),
            Message::new(2, Role::Assistant, "4"),
        ];
        let request = build_request(&history, "and 3+3?");
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].content, "2+2?");
        assert_eq!(request.messages[1].content, "4");
        assert_eq!(request.messages[2].content, "and 3+3?");
        assert_eq!(request.messages[2].role, Role::User);
    }

    #[test]
    fn request_serializes_to_wire_shape() {
        let request = build_request(&[], "hi");
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"model\":\"gpt-3.5-turbo\""));
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"max_tokens\":1000"));
        assert!(json.contains("\"temperature\":0.7"));
    }

    #[test]
    fn base_url_override_trims_trailing_slash() {
        let client = OpenAIClient::with_base_url("http://localhost:8080/v1/");
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn extract_reply_takes_first_choice() {
        let body: CompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"four"}},{"message":{"content":"4"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_reply(body).unwrap(), "four");
    }

    #[test]
    fn empty_choice_list_is_invalid_shape() {
        let body: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            extract_reply(body),
            Err(ChatError::InvalidResponseShape)
        ));
    }

    #[test]
    fn malformed_body_fails_to_parse() {
        let result = serde_json::from_str::<CompletionResponse>(r#"{"usage":{"total_tokens":3}}"#);
        assert!(result.is_err());
    }
}
