//! Gateway event dispatch.

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::setup::setup_guild;
use super::state::BotContext;
use crate::buffer::MessageData;
use crate::commands::{BotCommand, CommandHandler, CommandReply};
use crate::config::MESSAGE_RETENTION_HOURS;
use crate::discord::model::{Ready, UnavailableGuild};
use crate::discord::{Channel, GatewayEvent, Guild, Message};

/// Applies gateway events to the shared state.
pub struct EventHandler {
    ctx: BotContext,
    commands: CommandHandler,
}

impl EventHandler {
    /// Creates a handler for a context.
    #[must_use]
    pub fn new(ctx: BotContext) -> Self {
        let commands = CommandHandler::new(ctx.clone());
        Self { ctx, commands }
    }

    /// Consumes events until the gateway side of the channel closes.
    pub async fn run(self, mut events: mpsc::Receiver<GatewayEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        debug!("Event channel closed");
    }

    /// Handles a single event.
    pub async fn handle(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready(ready) => self.on_ready(*ready).await,
            GatewayEvent::GuildCreate(guild) => self.on_guild_create(*guild).await,
            GatewayEvent::GuildDelete(guild) => self.on_guild_delete(guild).await,
            GatewayEvent::GuildUpdate(update) => {
                self.ctx.state.cache.write().await.update_guild(*update);
            }
            GatewayEvent::GuildRoleCreate(event) | GatewayEvent::GuildRoleUpdate(event) => {
                let event = *event;
                self.ctx
                    .state
                    .cache
                    .write()
                    .await
                    .upsert_role(event.guild_id, event.role);
            }
            GatewayEvent::GuildRoleDelete(event) => {
                self.ctx
                    .state
                    .cache
                    .write()
                    .await
                    .remove_role(event.guild_id, event.role_id);
            }
            GatewayEvent::GuildMemberUpdate(update) => {
                self.ctx.state.cache.write().await.update_member(&update);
            }
            GatewayEvent::ChannelCreate(channel) | GatewayEvent::ChannelUpdate(channel) => {
                self.ctx.state.cache.write().await.upsert_channel(*channel);
            }
            GatewayEvent::ChannelDelete(channel) => self.on_channel_delete(&channel).await,
            GatewayEvent::MessageCreate(message) => self.on_message(*message).await,
        }
    }

    async fn on_ready(&self, ready: Ready) {
        let state = &self.ctx.state;
        info!("{} logged in (session {})", ready.user.username, ready.session_id);
        info!("Model: {}", self.ctx.summarizer.model());
        info!(
            "Summary schedule (UTC{:+}): {}",
            state.settings.utc_offset_hours,
            state.schedule.describe()
        );
        info!("Message retention: {} hours", MESSAGE_RETENTION_HOURS);
        info!(
            "Parallel summaries: {}",
            if state.settings.parallel_summary {
                "enabled"
            } else {
                "disabled"
            }
        );

        *state.bot_user.write().await = Some(ready.user);
        state.started_at.write().await.get_or_insert_with(Utc::now);
        state
            .pending_ready
            .write()
            .await
            .extend(ready.guilds.iter().map(|g| g.id));
    }

    async fn on_guild_create(&self, guild: Guild) {
        let state = &self.ctx.state;
        let guild_id = guild.id;
        let name = guild.name.clone();

        let announced = state.pending_ready.write().await.remove(&guild_id);
        let known = state.guild_config(guild_id).await.is_some()
            || state.cache.read().await.contains(guild_id);
        if !announced && !known {
            info!("Joined new server: {}", name);
        }

        state.cache.write().await.insert(guild);
        setup_guild(&self.ctx, guild_id).await;
    }

    async fn on_guild_delete(&self, guild: UnavailableGuild) {
        if guild.unavailable {
            warn!("Guild {} became unavailable", guild.id);
            return;
        }

        let name = self
            .ctx
            .state
            .cache
            .read()
            .await
            .guild_name(guild.id)
            .unwrap_or_else(|| guild.id.to_string());
        self.ctx.state.forget_guild(guild.id).await;
        info!("Removed from server: {}", name);
    }

    async fn on_channel_delete(&self, channel: &Channel) {
        self.ctx.state.cache.write().await.remove_channel(channel);

        let Some(guild_id) = channel.guild_id else {
            return;
        };
        let mut configs = self.ctx.state.configs.write().await;
        if let Some(config) = configs.get_mut(&guild_id)
            && config.summary_channel == Some(channel.id)
        {
            warn!("Summary channel of guild {} was deleted", guild_id);
            config.summary_channel = None;
        }
    }

    /// Buffers the message, then runs a command on its own task so slow
    /// commands never hold up the event stream.
    async fn on_message(&self, message: Message) {
        if message.author.bot {
            return;
        }
        let Some(guild_id) = message.guild_id else {
            return;
        };

        let state = &self.ctx.state;
        let channel_name = {
            let cache = state.cache.read().await;
            cache
                .channel(guild_id, message.channel_id)
                .map(Channel::display_name)
        };
        if channel_name.as_deref() == Some(state.settings.bot_channel_name.as_str()) {
            return;
        }

        let channel_name = channel_name.unwrap_or_else(|| message.channel_id.to_string());
        state
            .store
            .write()
            .await
            .push(guild_id, MessageData::from_message(&message, channel_name));

        if BotCommand::parse(&message.content, &state.settings.command_prefix).is_none() {
            return;
        }

        let commands = self.commands.clone();
        let api = self.ctx.api.clone();
        tokio::spawn(async move {
            let Some(reply) = commands.try_handle(&message).await else {
                return;
            };
            let result = match &reply {
                CommandReply::Text(text) => api.send_message(message.channel_id, text).await,
                CommandReply::Embed(embed) => api.send_embed(message.channel_id, embed).await,
            };
            if let Err(e) = result {
                error!("Command error: failed to reply in {}: {}", message.channel_id, e);
            }
        });
    }
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}
