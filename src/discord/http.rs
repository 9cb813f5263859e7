//! Discord REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, header};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use super::RateLimiter;
use super::model::{CHANNEL_GUILD_TEXT, Channel, ChannelId, Embed, GuildId};

/// Default REST API root.
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Minimum spacing between REST requests, in milliseconds.
const MIN_REQUEST_INTERVAL_MS: u64 = 250;

/// Errors that can occur during Discord REST operations.
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("Missing permissions: {0}")]
    Forbidden(String),

    #[error("Unknown resource: {0}")]
    NotFound(String),

    #[error("Rate limited, retry after {0:?}")]
    RateLimited(Duration),

    #[error("Discord API returned {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] header::InvalidHeaderValue),
}

/// The REST operations the bot needs.
#[async_trait]
pub trait DiscordApi: Send + Sync {
    /// Creates a text channel in a guild.
    async fn create_text_channel(
        &self,
        guild_id: GuildId,
        name: &str,
        topic: &str,
    ) -> Result<Channel, DiscordError>;

    /// Posts a plain text message.
    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<(), DiscordError>;

    /// Posts a single embed.
    async fn send_embed(&self, channel_id: ChannelId, embed: &Embed) -> Result<(), DiscordError>;
}

/// `reqwest`-backed implementation of [`DiscordApi`].
pub struct DiscordHttp {
    client: Client,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl DiscordHttp {
    /// Creates a client for the public Discord API.
    pub fn new(bot_token: &str) -> Result<Self, DiscordError> {
        Self::with_base_url(bot_token, DISCORD_API_BASE)
    }

    /// Creates a client against a custom API root.
    pub fn with_base_url(bot_token: &str, base_url: &str) -> Result<Self, DiscordError> {
        let user_agent = format!(
            "DiscordBot ({}, {})",
            env!("CARGO_PKG_REPOSITORY"),
            env!("CARGO_PKG_VERSION")
        );
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bot {bot_token}"))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            rate_limiter: RateLimiter::from_millis(MIN_REQUEST_INTERVAL_MS),
        })
    }

    /// Sends a JSON request, retrying once after a 429.
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, DiscordError> {
        let url = format!("{}{path}", self.base_url);
        let mut retried = false;

        loop {
            self.rate_limiter.wait_and_acquire().await;
            debug!("Discord {} {}", method, path);

            let response = self
                .client
                .request(method.clone(), &url)
                .json(body)
                .send()
                .await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response.json().await?);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after(response).await;
                self.rate_limiter.handle_retry_after(retry_after).await;
                if retried {
                    return Err(DiscordError::RateLimited(retry_after));
                }
                retried = true;
                continue;
            }

            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_owned());

            return Err(match status {
                StatusCode::FORBIDDEN => DiscordError::Forbidden(body),
                StatusCode::NOT_FOUND => DiscordError::NotFound(body),
                _ => DiscordError::Api { status, body },
            });
        }
    }
}

/// Reads the wait hint of a 429 response (body first, then header).
async fn retry_after(response: reqwest::Response) -> Duration {
    let header_secs = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok());

    let body_secs = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v.get("retry_after").and_then(serde_json::Value::as_f64));

    let secs = body_secs.or(header_secs).unwrap_or(1.0);
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs.min(300.0))
    } else {
        warn!("Ignoring invalid retry_after value: {}", secs);
        Duration::from_secs(1)
    }
}

#[async_trait]
impl DiscordApi for DiscordHttp {
    async fn create_text_channel(
        &self,
        guild_id: GuildId,
        name: &str,
        topic: &str,
    ) -> Result<Channel, DiscordError> {
        let body = json!({
            "name": name,
            "type": CHANNEL_GUILD_TEXT,
            "topic": topic,
        });
        self.execute(Method::POST, &format!("/guilds/{guild_id}/channels"), &body)
            .await
    }

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<(), DiscordError> {
        let body = json!({
            "content": content,
            "allowed_mentions": { "parse": [] },
        });
        self.execute::<IgnoredAny>(Method::POST, &format!("/channels/{channel_id}/messages"), &body)
            .await
            .map(|_| ())
    }

    async fn send_embed(&self, channel_id: ChannelId, embed: &Embed) -> Result<(), DiscordError> {
        let body = json!({ "embeds": [embed] });
        self.execute::<IgnoredAny>(Method::POST, &format!("/channels/{channel_id}/messages"), &body)
            .await
            .map(|_| ())
    }
}

impl std::fmt::Debug for DiscordHttp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordHttp")
            .field("base_url", &self.base_url)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}
