//! Command handler implementation.

use chrono::Duration;
use tracing::{debug, info};

use super::system::SystemSnapshot;
use super::types::{BotCommand, CommandReply};
use crate::bot::{BotContext, GuildConfig};
use crate::discord::{
    ChannelId, Color, Embed, GuildId, Message, Permissions, REQUIRED_PERMISSIONS,
    channel_permissions, guild_permissions,
};

/// Buffered channels listed by `status` before the rest is summarized in the footer.
const STATUS_CHANNEL_LIMIT: usize = 10;

/// Handles text commands for one bot.
#[derive(Clone)]
pub struct CommandHandler {
    ctx: BotContext,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub const fn new(ctx: BotContext) -> Self {
        Self { ctx }
    }

    /// Tries to parse and execute a command from a message.
    ///
    /// Returns `None` if the message is not a command.
    pub async fn try_handle(&self, message: &Message) -> Option<CommandReply> {
        let command = BotCommand::parse(&message.content, &self.ctx.state.settings.command_prefix)?;

        let Some(guild_id) = message.guild_id else {
            return Some(CommandReply::text(
                "This command can only be used in a server.",
            ));
        };

        debug!("Handling command: {}", command);
        if command.is_admin_only() && !self.is_admin(guild_id, message).await {
            info!(
                "Refused '{}' for {}: missing Administrator",
                command.name(),
                message.author.username
            );
            return Some(CommandReply::text(
                "You need the Administrator permission to use this command.",
            ));
        }

        Some(self.execute(command, guild_id).await)
    }

    /// Executes a parsed command in a guild.
    async fn execute(&self, command: BotCommand, guild_id: GuildId) -> CommandReply {
        match command {
            BotCommand::Summary(hours) => self.handle_summary(guild_id, hours).await,
            BotCommand::Status => self.handle_status(guild_id).await,
            BotCommand::ToggleSummary => self.handle_toggle(guild_id).await,
            BotCommand::SetSummaryChannel(channel_id) => {
                self.handle_set_channel(guild_id, channel_id).await
            }
            BotCommand::ApiUsage => self.handle_api_usage().await,
            BotCommand::System => self.handle_system().await,
            BotCommand::CheckPermissions => self.handle_check_permissions(guild_id).await,
            BotCommand::Help => self.handle_help(),
        }
    }

    async fn is_admin(&self, guild_id: GuildId, message: &Message) -> bool {
        let cache = self.ctx.state.cache.read().await;
        let Some(guild) = cache.get(guild_id) else {
            return false;
        };
        let member = message.member.clone().unwrap_or_default();
        guild_permissions(guild, message.author.id, &member).contains(Permissions::ADMINISTRATOR)
    }

    async fn guild_name(&self, guild_id: GuildId) -> String {
        self.ctx
            .state
            .cache
            .read()
            .await
            .guild_name(guild_id)
            .unwrap_or_else(|| guild_id.to_string())
    }

    async fn handle_summary(&self, guild_id: GuildId, hours: u32) -> CommandReply {
        let state = &self.ctx.state;
        let channels = state
            .store
            .read()
            .await
            .messages_in_range(guild_id, hours, chrono::Utc::now());
        if channels.is_empty() {
            return CommandReply::text(format!(
                "There are no messages to summarize from the last {hours} hours."
            ));
        }

        let guild_name = self.guild_name(guild_id).await;
        info!(
            "[{}] {}: generating manual summary (last {} hours)",
            state.log_time(),
            guild_name,
            hours
        );

        let embed = self
            .ctx
            .summarizer
            .summary_embed(
                &channels,
                &format!("Summary of the last {hours} hours"),
                summary_color(hours),
                hours >= crate::config::MESSAGE_RETENTION_HOURS,
                &guild_name,
            )
            .await;
        CommandReply::embed(embed)
    }

    async fn handle_status(&self, guild_id: GuildId) -> CommandReply {
        let state = &self.ctx.state;
        let config = state.guild_config(guild_id).await;

        let mut embed = Embed::new("Bot Status", Color::BLUE).field(
            "Summary channel",
            config
                .and_then(|c| c.summary_channel)
                .map_or_else(|| "Not set".to_owned(), mention),
            false,
        );

        let counts = state.store.read().await.channel_counts(guild_id);
        let (lines, total) = {
            let cache = state.cache.read().await;
            let mut lines = Vec::new();
            let mut total = 0;
            for (channel_id, count) in counts {
                if let Some(name) = cache.channel_name(guild_id, channel_id) {
                    lines.push(format!("#{name}: {count} messages"));
                    total += count;
                }
            }
            (lines, total)
        };

        if !lines.is_empty() {
            let shown: Vec<&str> = lines
                .iter()
                .take(STATUS_CHANNEL_LIMIT)
                .map(String::as_str)
                .collect();
            embed = embed.field("Watched channels", shown.join("\n"), false);
            if lines.len() > STATUS_CHANNEL_LIMIT {
                embed = embed.footer(format!(
                    "...and {} more channels",
                    lines.len() - STATUS_CHANNEL_LIMIT
                ));
            }
        }

        embed = embed.field("Buffered messages", format!("{total} total"), true);

        if let Some((at, description)) = state.schedule.next_run(state.local_now()) {
            embed = embed.field(
                format!("Next summary ({})", offset_label(state.settings.utc_offset_hours)),
                format!("{} - {description}", at.format("%Y-%m-%d %H:%M")),
                false,
            );
        }

        embed = embed.field("AI model", self.ctx.summarizer.model(), true);

        if let Some(uptime) = state.uptime().await {
            embed = embed.field("Uptime", format_uptime(uptime), true);
        }

        CommandReply::embed(embed)
    }

    async fn handle_toggle(&self, guild_id: GuildId) -> CommandReply {
        let mut configs = self.ctx.state.configs.write().await;
        let Some(config) = configs.get_mut(&guild_id) else {
            return CommandReply::text("This server has not been set up yet.");
        };

        config.enabled = !config.enabled;
        let status = if config.enabled { "enabled" } else { "disabled" };
        info!("Scheduled summaries {} for guild {}", status, guild_id);
        CommandReply::text(format!("Scheduled summaries are now {status}."))
    }

    async fn handle_set_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> CommandReply {
        let is_text_channel = self
            .ctx
            .state
            .cache
            .read()
            .await
            .channel(guild_id, channel_id)
            .is_some_and(crate::discord::Channel::is_text);
        if !is_text_channel {
            return CommandReply::text(format!(
                "{} is not a text channel of this server.",
                mention(channel_id)
            ));
        }

        self.ctx
            .state
            .configs
            .write()
            .await
            .entry(guild_id)
            .or_insert(GuildConfig {
                summary_channel: None,
                enabled: true,
            })
            .summary_channel = Some(channel_id);

        info!("Summary channel of guild {} set to {}", guild_id, channel_id);
        CommandReply::text(format!("Summary channel set to {}.", mention(channel_id)))
    }

    async fn handle_api_usage(&self) -> CommandReply {
        let calls = self.ctx.summarizer.calls_today().await;
        let offset = offset_label(self.ctx.state.settings.utc_offset_hours);

        CommandReply::embed(
            Embed::new("📊 OpenAI API usage", Color::BLUE)
                .field(format!("Calls today ({offset})"), format!("{calls} calls"), false)
                .field("Model", self.ctx.summarizer.model(), true),
        )
    }

    async fn handle_system(&self) -> CommandReply {
        let snapshot = SystemSnapshot::collect().await;
        let guilds = self.ctx.state.cache.read().await.guild_count();

        let mut embed = Embed::new("🖥️ System info", Color::GREEN)
            .field("CPU", format!("{:.1}%", snapshot.cpu_percent), true)
            .field("Memory", snapshot.memory_line(), true)
            .field("Bot memory", snapshot.process_memory_line(), true)
            .field("Version", env!("CARGO_PKG_VERSION"), true)
            .field("Servers", guilds.to_string(), true);

        if let Some(uptime) = self.ctx.state.uptime().await {
            embed = embed.field("Uptime", format!("{}d", uptime.num_days()), true);
        }

        CommandReply::embed(embed)
    }

    async fn handle_check_permissions(&self, guild_id: GuildId) -> CommandReply {
        let state = &self.ctx.state;
        let Some(bot_id) = state.bot_user.read().await.as_ref().map(|u| u.id) else {
            return CommandReply::text("The bot is not connected yet.");
        };
        let summary_channel = state.guild_config(guild_id).await.and_then(|c| c.summary_channel);

        let cache = state.cache.read().await;
        let Some(guild) = cache.get(guild_id) else {
            return CommandReply::text("This server is not available yet.");
        };
        let member = cache.member(guild_id, bot_id).cloned().unwrap_or_default();

        let mut embed = Embed::new("🔒 Bot permission check", Color::BLUE).field(
            "Server permissions",
            permission_lines(guild_permissions(guild, bot_id, &member)),
            false,
        );

        if let Some(channel) = summary_channel.and_then(|id| cache.channel(guild_id, id)) {
            embed = embed.field(
                format!("#{} permissions", channel.display_name()),
                permission_lines(channel_permissions(guild, channel, bot_id, &member)),
                false,
            );
        }

        CommandReply::embed(embed)
    }

    fn handle_help(&self) -> CommandReply {
        let prefix = &self.ctx.state.settings.command_prefix;
        let mut lines = vec![
            format!("Summary Bot Commands (prefix: {prefix})"),
            String::new(),
        ];

        for (usage, desc) in BotCommand::all_commands() {
            lines.push(format!("  {prefix}{usage} - {desc}"));
        }

        CommandReply::text(lines.join("\n"))
    }
}

/// Embed colour of a manual summary by window length.
#[must_use]
pub const fn summary_color(hours: u32) -> Color {
    match hours {
        0..=6 => Color::GREEN,
        7..=24 => Color::BLUE,
        25..=48 => Color::PURPLE,
        _ => Color::GOLD,
    }
}

fn mention(channel_id: ChannelId) -> String {
    format!("<#{channel_id}>")
}

/// `"UTC+9"`, `"UTC-5"`, `"UTC"`.
fn offset_label(hours: i32) -> String {
    match hours {
        0 => "UTC".to_owned(),
        h if h > 0 => format!("UTC+{h}"),
        h => format!("UTC{h}"),
    }
}

/// `"Xd Yh"`.
fn format_uptime(uptime: Duration) -> String {
    let days = uptime.num_days();
    let hours = uptime.num_hours() - days * 24;
    format!("{days}d {hours}h")
}

fn permission_lines(perms: Permissions) -> String {
    REQUIRED_PERMISSIONS
        .iter()
        .map(|(perm, label)| {
            let mark = if perms.contains(*perm) { "✅" } else { "❌" };
            format!("{mark} {label}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::bot::testing::{
        ADMIN_ROLE, BOT_ID, FakeDiscord, OWNER_ID, context, guild_with_channels, message, user,
    };
    use crate::buffer::MessageData;
    use crate::discord::Snowflake;

    async fn handler_with_guild() -> CommandHandler {
        let ctx = context(FakeDiscord::new());
        ctx.state
            .cache
            .write()
            .await
            .insert(guild_with_channels(1, &[(10, "general"), (11, "random"), (12, "summaries")]));
        ctx.state.configs.write().await.insert(
            Snowflake(1),
            GuildConfig {
                summary_channel: Some(Snowflake(12)),
                enabled: true,
            },
        );
        *ctx.state.bot_user.write().await = Some(user(BOT_ID, "summary-bot"));
        CommandHandler::new(ctx)
    }

    async fn buffer(handler: &CommandHandler, channel: u64, name: &str, content: &str) {
        let msg = message(1, channel, 7, content, &[], Utc::now());
        handler
            .ctx
            .state
            .store
            .write()
            .await
            .push(Snowflake(1), MessageData::from_message(&msg, name.to_owned()));
    }

    async fn run(handler: &CommandHandler, text: &str, roles: &[u64]) -> Option<CommandReply> {
        handler
            .try_handle(&message(1, 10, 7, text, roles, Utc::now()))
            .await
    }

    #[test]
    fn test_summary_color_thresholds() {
        assert_eq!(summary_color(1), Color::GREEN);
        assert_eq!(summary_color(6), Color::GREEN);
        assert_eq!(summary_color(7), Color::BLUE);
        assert_eq!(summary_color(24), Color::BLUE);
        assert_eq!(summary_color(48), Color::PURPLE);
        assert_eq!(summary_color(49), Color::GOLD);
        assert_eq!(summary_color(168), Color::GOLD);
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::hours(50)), "2d 2h");
        assert_eq!(format_uptime(Duration::minutes(30)), "0d 0h");
    }

    #[test]
    fn test_offset_label() {
        assert_eq!(offset_label(9), "UTC+9");
        assert_eq!(offset_label(-5), "UTC-5");
        assert_eq!(offset_label(0), "UTC");
    }

    #[tokio::test]
    async fn test_not_a_command() {
        let handler = handler_with_guild().await;
        assert!(run(&handler, "hello there", &[]).await.is_none());
        assert!(run(&handler, "!unknown", &[]).await.is_none());
    }

    #[tokio::test]
    async fn test_summary_without_messages() {
        let handler = handler_with_guild().await;
        let reply = run(&handler, "!summary 6", &[]).await.unwrap();
        assert_eq!(
            reply.as_text(),
            Some("There are no messages to summarize from the last 6 hours.")
        );
    }

    #[tokio::test]
    async fn test_summary_falls_back_to_keywords() {
        let handler = handler_with_guild().await;
        buffer(&handler, 10, "general", "release planning release").await;

        let reply = run(&handler, "!summary 6", &[]).await.unwrap();
        let embed = reply.as_embed().unwrap();

        assert_eq!(embed.title.as_deref(), Some("📋 Summary of the last 6 hours"));
        assert_eq!(embed.color, Some(Color::GREEN));
        assert_eq!(
            embed.description.as_deref(),
            Some("**#general**: release, planning")
        );
    }

    #[tokio::test]
    async fn test_status_lists_buffered_channels() {
        let handler = handler_with_guild().await;
        buffer(&handler, 10, "general", "one").await;
        buffer(&handler, 10, "general", "two").await;
        buffer(&handler, 11, "random", "three").await;

        let reply = run(&handler, "!status", &[]).await.unwrap();
        let embed = reply.as_embed().unwrap();

        assert_eq!(embed.get_field("Summary channel").unwrap().value, "<#12>");
        assert_eq!(
            embed.get_field("Watched channels").unwrap().value,
            "#general: 2 messages\n#random: 1 messages"
        );
        assert_eq!(embed.get_field("Buffered messages").unwrap().value, "3 total");
        assert!(embed.get_field("Next summary (UTC+9)").is_some());
        assert_eq!(embed.get_field("AI model").unwrap().value, "gpt-4o-mini");
        assert!(embed.footer.is_none());
    }

    #[tokio::test]
    async fn test_status_without_config() {
        let handler = handler_with_guild().await;
        handler.ctx.state.configs.write().await.clear();

        let reply = run(&handler, "!status", &[]).await.unwrap();
        let embed = reply.as_embed().unwrap();
        assert_eq!(embed.get_field("Summary channel").unwrap().value, "Not set");
        assert!(embed.get_field("Watched channels").is_none());
    }

    #[tokio::test]
    async fn test_admin_command_refused_for_members() {
        let handler = handler_with_guild().await;
        let reply = run(&handler, "!toggle_summary", &[]).await.unwrap();
        assert_eq!(
            reply.as_text(),
            Some("You need the Administrator permission to use this command.")
        );
        assert!(handler.ctx.state.guild_config(Snowflake(1)).await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_toggle_summary_flips_state() {
        let handler = handler_with_guild().await;

        let reply = run(&handler, "!toggle_summary", &[ADMIN_ROLE]).await.unwrap();
        assert_eq!(reply.as_text(), Some("Scheduled summaries are now disabled."));
        assert!(!handler.ctx.state.guild_config(Snowflake(1)).await.unwrap().enabled);

        let reply = run(&handler, "!toggle_summary", &[ADMIN_ROLE]).await.unwrap();
        assert_eq!(reply.as_text(), Some("Scheduled summaries are now enabled."));
    }

    #[tokio::test]
    async fn test_owner_is_admin() {
        let handler = handler_with_guild().await;
        let reply = handler
            .try_handle(&message(1, 10, OWNER_ID, "!api_usage", &[], Utc::now()))
            .await
            .unwrap();
        let embed = reply.as_embed().unwrap();
        assert_eq!(embed.get_field("Calls today (UTC+9)").unwrap().value, "0 calls");
        assert_eq!(embed.get_field("Model").unwrap().value, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_set_summary_channel() {
        let handler = handler_with_guild().await;

        let reply = run(&handler, "!set_summary_channel <#11>", &[ADMIN_ROLE])
            .await
            .unwrap();
        assert_eq!(reply.as_text(), Some("Summary channel set to <#11>."));
        assert_eq!(
            handler
                .ctx
                .state
                .guild_config(Snowflake(1))
                .await
                .unwrap()
                .summary_channel,
            Some(Snowflake(11))
        );

        let reply = run(&handler, "!set_summary_channel <#77>", &[ADMIN_ROLE])
            .await
            .unwrap();
        assert_eq!(
            reply.as_text(),
            Some("<#77> is not a text channel of this server.")
        );
    }

    #[tokio::test]
    async fn test_check_permissions() {
        let handler = handler_with_guild().await;
        let reply = run(&handler, "!check_permissions", &[ADMIN_ROLE])
            .await
            .unwrap();
        let embed = reply.as_embed().unwrap();

        let server = &embed.get_field("Server permissions").unwrap().value;
        assert!(server.contains("✅ View Channel"));
        assert!(server.contains("✅ Send Messages"));
        assert!(server.contains("❌ Manage Channels"));
        assert!(server.contains("❌ Embed Links"));
        assert!(embed.get_field("#summaries permissions").is_some());
    }

    #[tokio::test]
    async fn test_help_lists_commands() {
        let handler = handler_with_guild().await;
        let reply = run(&handler, "!help", &[]).await.unwrap();
        let text = reply.as_text().unwrap();
        assert!(text.starts_with("Summary Bot Commands (prefix: !)"));
        assert!(text.contains("!summary [hours]"));
        assert!(text.contains("!check_permissions"));
    }

    #[tokio::test]
    async fn test_dm_command_rejected() {
        let handler = handler_with_guild().await;
        let mut msg = message(1, 10, 7, "!status", &[], Utc::now());
        msg.guild_id = None;
        let reply = handler.try_handle(&msg).await.unwrap();
        assert_eq!(
            reply.as_text(),
            Some("This command can only be used in a server.")
        );
    }
}
