//! Summary generation with keyword fallback.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::fallback::simple_summary;
use super::openai::{OpenAiClient, OpenAiError};
use super::prompt::{build_conversation, daily_prompt, weekly_prompt};
use super::usage::ApiUsage;
use crate::buffer::ChannelMessages;
use crate::config::BotSettings;
use crate::discord::{Color, Embed};

/// Returned when there is nothing to summarize.
pub const NO_MESSAGES: &str = "There are no messages to summarize.";
/// Returned when the model answered without content.
pub const GENERATION_FAILED: &str = "Failed to generate a summary.";

/// Turns buffered conversations into summary text and embeds.
pub struct Summarizer {
    client: OpenAiClient,
    usage: Mutex<ApiUsage>,
    timezone: FixedOffset,
    max_messages_per_summary: usize,
    language: String,
}

impl Summarizer {
    /// Creates a summarizer.
    #[must_use]
    pub fn new(client: OpenAiClient, settings: &BotSettings) -> Self {
        let timezone = settings.timezone();
        Self {
            client,
            usage: Mutex::new(ApiUsage::new(Utc::now().with_timezone(&timezone).date_naive())),
            timezone,
            max_messages_per_summary: settings.max_messages_per_summary,
            language: settings.summary_language.clone(),
        }
    }

    /// The model used for summaries.
    #[must_use]
    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Model calls made today (local date).
    pub async fn calls_today(&self) -> u64 {
        let today = self.today();
        self.usage.lock().await.calls_on(today)
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// Summarizes all channels of a guild in one request.
    ///
    /// Never fails: API errors and timeouts fall back to a keyword summary.
    pub async fn summarize(
        &self,
        channels: &[ChannelMessages],
        weekly: bool,
        guild_name: &str,
    ) -> String {
        let today = self.today();
        self.usage.lock().await.rollover(today);

        if channels.iter().all(|c| c.messages.is_empty()) {
            return NO_MESSAGES.to_owned();
        }

        let max_messages = if weekly {
            self.max_messages_per_summary.saturating_mul(2)
        } else {
            self.max_messages_per_summary
        };
        let conversation = build_conversation(channels, max_messages);
        let prompt = if weekly {
            weekly_prompt(&conversation, guild_name, &self.language)
        } else {
            daily_prompt(&conversation, guild_name, &self.language)
        };
        debug!(
            "Summarizing {} channels for {} ({} chars)",
            channels.len(),
            guild_name,
            conversation.chars().count()
        );

        match self.client.chat(&prompt.system, &prompt.user).await {
            Ok(content) => {
                self.usage.lock().await.record(today);
                content.unwrap_or_else(|| GENERATION_FAILED.to_owned())
            }
            Err(OpenAiError::Timeout(after)) => {
                warn!("OpenAI API timed out after {:?}, using keyword summary", after);
                simple_summary(channels)
            }
            Err(e) => {
                error!("OpenAI API error: {}", e);
                simple_summary(channels)
            }
        }
    }

    /// Builds the complete summary embed for a guild.
    pub async fn summary_embed(
        &self,
        channels: &[ChannelMessages],
        title: &str,
        color: Color,
        weekly: bool,
        guild_name: &str,
    ) -> Embed {
        let summary = self.summarize(channels, weekly, guild_name).await;
        build_summary_embed(channels, title, color, weekly, &summary, Utc::now())
    }
}

/// Assembles the summary embed: stats, most active channels, summary text.
#[must_use]
pub fn build_summary_embed(
    channels: &[ChannelMessages],
    title: &str,
    color: Color,
    weekly: bool,
    summary: &str,
    now: DateTime<Utc>,
) -> Embed {
    let total: usize = channels.iter().map(|c| c.messages.len()).sum();
    let active = channels.iter().filter(|c| !c.messages.is_empty()).count();
    let authors: HashSet<&str> = channels
        .iter()
        .flat_map(|c| c.messages.iter().map(|m| m.author.as_str()))
        .collect();

    let mut embed = Embed::new(format!("📋 {title}"), color)
        .timestamp(now)
        .field(
            "📊 Stats",
            format!("💬 {total} messages | 📍 {active}ch | 👥 {} people", authors.len()),
            false,
        );

    if active > 0 {
        let top = if weekly { 5 } else { 3 };
        let mut sorted: Vec<&ChannelMessages> =
            channels.iter().filter(|c| !c.messages.is_empty()).collect();
        sorted.sort_by(|a, b| b.messages.len().cmp(&a.messages.len()));

        let stats: Vec<String> = sorted
            .iter()
            .take(top)
            .map(|c| format!("**#{}**: {} messages", c.channel_name, c.messages.len()))
            .collect();
        embed = embed.field("🔥 Active channels", stats.join(" / "), false);
    }

    embed.description(summary)
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summarizer")
            .field("client", &self.client)
            .field("timezone", &self.timezone)
            .field("max_messages_per_summary", &self.max_messages_per_summary)
            .finish_non_exhaustive()
    }
}
