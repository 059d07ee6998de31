//! Chat-completion seam.
//!
//! [`ChatClient`] sends a role-tagged message list and returns the
//! assistant's text. [`HostedChatClient`] talks to an OpenAI-compatible
//! `/chat/completions` endpoint with a bearer key.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::ChatError;
use crate::models::ConversationTurn;

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, messages: &[ConversationTurn]) -> Result<String, ChatError>;
}

/// Masks an API key for logging: first 7 chars, `***`, last 4 chars.
/// Keys of 11 chars or fewer are fully masked.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 11 {
        return "***".to_string();
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", head, tail)
}

/// Reads the API key named by `llm.api_key_env`.
pub fn api_key_from_env(config: &LlmConfig) -> Result<String, ChatError> {
    std::env::var(&config.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ChatError::MissingApiKey(config.api_key_env.clone()))
}

pub struct HostedChatClient {
    client: reqwest::Client,
    url: String,
    model: String,
    max_tokens: u32,
    api_key: String,
}

impl HostedChatClient {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_key = api_key.into();
        tracing::info!(
            url = %config.url,
            model = %config.model,
            api_key = %mask_key(&api_key),
            "chat client configured"
        );
        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key,
        })
    }
}

#[async_trait]
impl ChatClient for HostedChatClient {
    async fn complete(&self, messages: &[ConversationTurn]) -> Result<String, ChatError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
        });
        tracing::debug!(payload = %body, "sending chat request");

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(status = status.as_u16(), body = %text, "chat response");

        if !status.is_success() {
            return Err(ChatError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| ChatError::Malformed(e.to_string()))?;
        parse_chat_response(&json)
    }
}

/// Extracts `choices[0].message.content`, trimmed.
pub fn parse_chat_response(json: &serde_json::Value) -> Result<String, ChatError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| ChatError::Malformed("missing choices[0].message.content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("short"), "***");
        assert_eq!(mask_key("12345678901"), "***");
        assert_eq!(mask_key("fanar-abcdefghijklmnop-1234"), "fanar-a***1234");
    }

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  - Keep your back straight\n"}}]
        });
        assert_eq!(
            parse_chat_response(&json).unwrap(),
            "- Keep your back straight"
        );
    }

    #[test]
    fn test_parse_chat_response_missing_content() {
        let err = parse_chat_response(&serde_json::json!({"choices": []})).unwrap_err();
        assert!(matches!(err, ChatError::Malformed(_)));
    }

    #[test]
    fn test_api_key_from_env_missing() {
        let config = LlmConfig {
            api_key_env: "FITRAG_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..LlmConfig::default()
        };
        let err = api_key_from_env(&config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "FITRAG_TEST_KEY_THAT_IS_NOT_SET environment variable not set"
        );
    }
}
