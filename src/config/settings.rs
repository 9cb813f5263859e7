//! Application settings and API credentials.

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Discord API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token from the Discord developer portal.
    pub bot_token: String,
}

impl DiscordConfig {
    /// Creates a new Discord configuration.
    #[must_use]
    pub const fn new(bot_token: String) -> Self {
        Self { bot_token }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `DISCORD_BOT_TOKEN` to be set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = required_var("DISCORD_BOT_TOKEN")?;
        Ok(Self { bot_token })
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &"<redacted>")
            .finish()
    }
}

/// OpenAI API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key.
    pub api_key: String,

    /// Chat model used for summaries.
    #[serde(default = "default_model")]
    pub model: String,

    /// API root, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,

    /// Extra attempts after a transient failure.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
}

fn default_model() -> String {
    "gpt-4o-mini".to_owned()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_owned()
}

fn default_api_timeout() -> u64 {
    60
}

fn default_retry_count() -> u32 {
    2
}

impl OpenAiConfig {
    /// Creates a configuration with default model, endpoint and timeouts.
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_api_timeout(),
            retry_count: default_retry_count(),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `OPENAI_API_KEY` to be set, everything else is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = required_var("OPENAI_API_KEY")?;

        Ok(Self {
            api_key,
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| default_model()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .map_or_else(|_| default_base_url(), |s| s.trim_end_matches('/').to_owned()),
            timeout_secs: parse_var("API_TIMEOUT").unwrap_or_else(default_api_timeout),
            retry_count: parse_var("API_RETRY_COUNT").unwrap_or_else(default_retry_count),
        })
    }

    /// Returns the request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}

/// Bot-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Command prefix for text commands.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Name of the channel summaries are posted to.
    #[serde(default = "default_bot_channel_name")]
    pub bot_channel_name: String,

    /// Messages per channel fed to the model (doubled for weekly summaries).
    #[serde(default = "default_max_messages")]
    pub max_messages_per_summary: usize,

    /// Hard cap of buffered messages per channel.
    #[serde(default = "default_max_buffer")]
    pub max_buffer_per_channel: usize,

    /// Summarize guilds concurrently.
    #[serde(default = "default_parallel")]
    pub parallel_summary: bool,

    /// Fixed UTC offset, in hours, of the schedule clock.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    /// Language the model is asked to write in.
    #[serde(default = "default_language")]
    pub summary_language: String,
}

fn default_command_prefix() -> String {
    "!".to_owned()
}

fn default_bot_channel_name() -> String {
    "🎀サマリちゃん🎀".to_owned()
}

fn default_max_messages() -> usize {
    100
}

fn default_max_buffer() -> usize {
    10_000
}

fn default_parallel() -> bool {
    true
}

fn default_utc_offset() -> i32 {
    9 // Japan Standard Time, no DST
}

fn default_language() -> String {
    "Japanese".to_owned()
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            bot_channel_name: default_bot_channel_name(),
            max_messages_per_summary: default_max_messages(),
            max_buffer_per_channel: default_max_buffer(),
            parallel_summary: default_parallel(),
            utc_offset_hours: default_utc_offset(),
            summary_language: default_language(),
        }
    }
}

impl BotSettings {
    /// Creates bot settings from environment variables with defaults.
    #[must_use]
    pub fn from_env_with_defaults() -> Self {
        Self {
            command_prefix: std::env::var("COMMAND_PREFIX")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(default_command_prefix),
            bot_channel_name: std::env::var("BOT_CHANNEL_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(default_bot_channel_name),
            max_messages_per_summary: parse_var("MAX_MESSAGES_PER_SUMMARY")
                .unwrap_or_else(default_max_messages),
            max_buffer_per_channel: parse_var("MAX_BUFFER_PER_CHANNEL")
                .unwrap_or_else(default_max_buffer),
            parallel_summary: std::env::var("PARALLEL_SUMMARY")
                .map_or_else(|_| default_parallel(), |s| parse_flag(&s)),
            utc_offset_hours: parse_var("SUMMARY_UTC_OFFSET_HOURS")
                .filter(|h: &i32| (-23..=23).contains(h))
                .unwrap_or_else(default_utc_offset),
            summary_language: std::env::var("SUMMARY_LANGUAGE")
                .unwrap_or_else(|_| default_language()),
        }
    }

    /// Returns the schedule clock's offset.
    #[must_use]
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix())
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingEnvVar(name))
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Only a literal `true` (any case) enables a flag.
fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0} (check your .env file)")]
    MissingEnvVar(&'static str),
}
