//! Posting one scheduled summary to every active guild.

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{error, info, warn};

use crate::bot::{BotContext, GuildConfig};
use crate::config::SummaryJob;
use crate::discord::{DiscordError, GuildId};

/// What happened for one guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuildOutcome {
    /// Summary posted, covering this many messages.
    Posted(usize),
    /// No messages in the window.
    Skipped,
    /// Disabled, without channel, or not cached.
    Inactive,
    /// The bot may not post to the summary channel.
    Forbidden,
    /// Any other failure.
    Failed,
}

/// Per-guild outcomes of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostReport {
    pub outcomes: Vec<(GuildId, GuildOutcome)>,
}

impl PostReport {
    /// Guilds that received a summary.
    #[must_use]
    pub fn posted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, GuildOutcome::Posted(_)))
            .count()
    }

    /// Outcome of one guild.
    #[must_use]
    pub fn outcome(&self, guild_id: GuildId) -> Option<GuildOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| *id == guild_id)
            .map(|(_, o)| *o)
    }
}

/// Summarizes and posts `job` for every configured guild.
///
/// A failing guild never stops the others.
pub async fn post_scheduled_summary(ctx: &BotContext, job: &SummaryJob) -> PostReport {
    let mut configs: Vec<(GuildId, GuildConfig)> = ctx
        .state
        .configs
        .read()
        .await
        .iter()
        .map(|(id, c)| (*id, *c))
        .collect();
    configs.sort_by_key(|(id, _)| *id);

    if configs.is_empty() {
        return PostReport::default();
    }

    let outcomes = if ctx.state.settings.parallel_summary {
        info!(
            "[{}] Starting parallel summaries for {} servers",
            ctx.state.log_time(),
            configs.len()
        );
        join_all(
            configs
                .iter()
                .map(|(id, config)| process_guild(ctx, *id, *config, job)),
        )
        .await
    } else {
        let mut outcomes = Vec::with_capacity(configs.len());
        for (id, config) in &configs {
            outcomes.push(process_guild(ctx, *id, *config, job).await);
        }
        outcomes
    };

    PostReport {
        outcomes: configs.iter().map(|(id, _)| *id).zip(outcomes).collect(),
    }
}

async fn process_guild(
    ctx: &BotContext,
    guild_id: GuildId,
    config: GuildConfig,
    job: &SummaryJob,
) -> GuildOutcome {
    let Some(channel_id) = config.summary_channel.filter(|_| config.is_active()) else {
        return GuildOutcome::Inactive;
    };
    let Some(guild_name) = ctx.state.cache.read().await.guild_name(guild_id) else {
        return GuildOutcome::Inactive;
    };

    let channels = ctx
        .state
        .store
        .read()
        .await
        .messages_in_range(guild_id, job.hours_back, Utc::now());
    if channels.is_empty() {
        info!(
            "[{}] {}: no new messages for {}, skipping",
            ctx.state.log_time(),
            guild_name,
            job.description
        );
        return GuildOutcome::Skipped;
    }

    info!(
        "[{}] {}: generating {}",
        ctx.state.log_time(),
        guild_name,
        job.description
    );
    let embed = ctx
        .summarizer
        .summary_embed(&channels, &job.description, job.color, job.weekly, &guild_name)
        .await;

    match ctx.api.send_embed(channel_id, &embed).await {
        Ok(()) => {
            let total: usize = channels.iter().map(|c| c.messages.len()).sum();
            info!(
                "[{}] {}: posted {} ({} messages)",
                ctx.state.log_time(),
                guild_name,
                job.description,
                total
            );
            GuildOutcome::Posted(total)
        }
        Err(DiscordError::Forbidden(_)) => {
            warn!(
                "Permission error ({}): cannot post to the summary channel",
                guild_name
            );
            GuildOutcome::Forbidden
        }
        Err(e) => {
            error!("Summary error ({}): {}", guild_name, e);
            GuildOutcome::Failed
        }
    }
}
