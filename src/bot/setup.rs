//! Per-guild setup: find or create the summary channel.

use tracing::{error, info, warn};

use super::state::{BotContext, GuildConfig};
use crate::discord::{ChannelId, DiscordError, GuildId};

/// Topic set on a newly created summary channel.
pub const SUMMARY_CHANNEL_TOPIC: &str = "This channel receives periodic summaries from the bot.";

/// Returns the summary channel of a guild, creating it if needed.
///
/// `None` when the bot may not create channels or creation failed.
pub async fn get_or_create_bot_channel(ctx: &BotContext, guild_id: GuildId) -> Option<ChannelId> {
    let name = &ctx.state.settings.bot_channel_name;
    let (existing, guild_name) = {
        let cache = ctx.state.cache.read().await;
        (
            cache.find_text_channel(guild_id, name).map(|c| c.id),
            cache.guild_name(guild_id).unwrap_or_else(|| guild_id.to_string()),
        )
    };
    if existing.is_some() {
        return existing;
    }

    match ctx
        .api
        .create_text_channel(guild_id, name, SUMMARY_CHANNEL_TOPIC)
        .await
    {
        Ok(channel) => {
            let id = channel.id;
            ctx.state.cache.write().await.upsert_channel(channel);
            Some(id)
        }
        Err(DiscordError::Forbidden(_)) => {
            warn!("No permission to create a channel in {}", guild_name);
            None
        }
        Err(e) => {
            error!("Failed to create summary channel in {}: {}", guild_name, e);
            None
        }
    }
}

/// Registers a guild for summaries.
///
/// A guild that is already configured keeps its settings; only a missing
/// summary channel is retried.
pub async fn setup_guild(ctx: &BotContext, guild_id: GuildId) {
    let guild_name = ctx
        .state
        .cache
        .read()
        .await
        .guild_name(guild_id)
        .unwrap_or_else(|| guild_id.to_string());

    if let Some(config) = ctx.state.guild_config(guild_id).await
        && config.summary_channel.is_some()
    {
        info!("Guild '{}' already set up", guild_name);
        return;
    }

    let channel = get_or_create_bot_channel(ctx, guild_id).await;
    {
        let mut configs = ctx.state.configs.write().await;
        let config = configs.entry(guild_id).or_insert(GuildConfig {
            summary_channel: None,
            enabled: true,
        });
        config.summary_channel = channel;
    }

    match channel {
        Some(_) => info!(
            "Guild '{}' set up, summary channel: #{}",
            guild_name, ctx.state.settings.bot_channel_name
        ),
        None => warn!("Guild '{}' set up without a summary channel", guild_name),
    }
}
