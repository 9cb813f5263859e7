//! Minimal OpenAI chat completions client.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::OpenAiConfig;

const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 3000;

/// Errors that can occur when calling the OpenAI API.
#[derive(Debug, Error)]
pub enum OpenAiError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("OpenAI API returned {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl OpenAiError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Network(e) => e.is_connect() || e.is_timeout(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions client with timeout and retries.
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    /// Creates a client from configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self, OpenAiError> {
        let client = Client::builder()
            .user_agent(format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    /// The configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Sends a system + user prompt and returns the first choice's text.
    ///
    /// `Ok(None)` means the API answered without content.
    pub async fn chat(&self, system: &str, user: &str) -> Result<Option<String>, OpenAiError> {
        let attempts = self.config.retry_count.saturating_add(1);
        let mut attempt = 1;

        loop {
            match self.chat_once(system, user).await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = Duration::from_secs(1 << attempt.min(5));
                    warn!(
                        "OpenAI request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempt, attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn chat_once(&self, system: &str, user: &str) -> Result<Option<String>, OpenAiError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let timeout = self.config.timeout();
        debug!("Requesting chat completion from {}", self.config.model);

        let send = async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Failed to read error body".to_owned());
                return Err(OpenAiError::Api { status, body });
            }

            Ok(response.json::<ChatResponse>().await?)
        };

        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| OpenAiError::Timeout(timeout))??;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty()))
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn config(base_url: String) -> OpenAiConfig {
        OpenAiConfig {
            base_url,
            timeout_secs: 1,
            retry_count: 0,
            ..OpenAiConfig::new("TEST-KEY".to_owned())
        }
    }

    #[tokio::test]
    async fn test_chat_returns_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("Authorization", "Bearer TEST-KEY")
                    .json_body_partial(r#"{"model": "gpt-4o-mini", "max_tokens": 3000}"#);
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "A summary"}}]
                }));
            })
            .await;

        let client = OpenAiClient::new(config(server.base_url())).unwrap();
        let text = client.chat("sys", "user").await.unwrap();

        mock.assert_async().await;
        assert_eq!(text.as_deref(), Some("A summary"));
    }

    #[tokio::test]
    async fn test_chat_empty_choices() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({"choices": []}));
            })
            .await;

        let client = OpenAiClient::new(config(server.base_url())).unwrap();
        assert_eq!(client.chat("sys", "user").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_chat_api_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(401).json_body(json!({"error": {"message": "bad key"}}));
            })
            .await;

        let client = OpenAiClient::new(config(server.base_url())).unwrap();
        let err = client.chat("sys", "user").await.unwrap_err();
        assert!(matches!(err, OpenAiError::Api { status, .. } if status == StatusCode::UNAUTHORIZED));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_chat_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200)
                    .delay(Duration::from_millis(1500))
                    .json_body(json!({"choices": []}));
            })
            .await;

        let client = OpenAiClient::new(config(server.base_url())).unwrap();
        let err = client.chat("sys", "user").await.unwrap_err();
        assert!(matches!(err, OpenAiError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_chat_retries_server_errors() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(503).body("unavailable");
            })
            .await;

        let cfg = OpenAiConfig {
            retry_count: 1,
            ..config(server.base_url())
        };
        let client = OpenAiClient::new(cfg).unwrap();
        let err = client.chat("sys", "user").await.unwrap_err();

        mock.assert_hits_async(2).await;
        assert!(err.is_transient());
    }
}
