//! Shared bot state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::RwLock;

use crate::buffer::MessageStore;
use crate::config::{BotSettings, ScheduleConfig};
use crate::discord::{ChannelId, DiscordApi, GuildCache, GuildId, User};
use crate::summary::Summarizer;

/// Per-guild summary settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuildConfig {
    /// Where summaries are posted; `None` if the channel could not be created.
    pub summary_channel: Option<ChannelId>,
    /// Whether scheduled summaries run for this guild.
    pub enabled: bool,
}

impl GuildConfig {
    /// Whether scheduled summaries should be posted.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.enabled && self.summary_channel.is_some()
    }
}

/// State shared by the event handler, commands and scheduler.
#[derive(Debug)]
pub struct BotState {
    pub settings: BotSettings,
    pub schedule: ScheduleConfig,
    pub cache: RwLock<GuildCache>,
    pub configs: RwLock<HashMap<GuildId, GuildConfig>>,
    pub store: RwLock<MessageStore>,
    pub bot_user: RwLock<Option<User>>,
    pub started_at: RwLock<Option<DateTime<Utc>>>,
    /// Guilds announced in READY that have not arrived yet.
    pub pending_ready: RwLock<HashSet<GuildId>>,
}

impl BotState {
    /// Creates empty state.
    #[must_use]
    pub fn new(settings: BotSettings, schedule: ScheduleConfig) -> Self {
        let store = MessageStore::new(settings.max_buffer_per_channel);
        Self {
            settings,
            schedule,
            cache: RwLock::new(GuildCache::new()),
            configs: RwLock::new(HashMap::new()),
            store: RwLock::new(store),
            bot_user: RwLock::new(None),
            started_at: RwLock::new(None),
            pending_ready: RwLock::new(HashSet::new()),
        }
    }

    /// The schedule clock's offset.
    #[must_use]
    pub fn timezone(&self) -> FixedOffset {
        self.settings.timezone()
    }

    /// Current time on the schedule clock.
    #[must_use]
    pub fn local_now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.timezone())
    }

    /// Current local time formatted for log lines.
    #[must_use]
    pub fn log_time(&self) -> String {
        self.local_now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Config of a guild, if set up.
    pub async fn guild_config(&self, guild_id: GuildId) -> Option<GuildConfig> {
        self.configs.read().await.get(&guild_id).copied()
    }

    /// Forgets everything about a guild.
    pub async fn forget_guild(&self, guild_id: GuildId) {
        self.configs.write().await.remove(&guild_id);
        self.store.write().await.remove_guild(guild_id);
        self.cache.write().await.remove(guild_id);
    }

    /// How long the bot has been connected.
    pub async fn uptime(&self) -> Option<chrono::Duration> {
        self.started_at.read().await.map(|t| Utc::now() - t)
    }
}

/// Everything a handler needs, cheap to clone.
#[derive(Clone)]
pub struct BotContext {
    pub state: Arc<BotState>,
    pub api: Arc<dyn DiscordApi>,
    pub summarizer: Arc<Summarizer>,
}

impl BotContext {
    /// Bundles state, REST client and summarizer.
    #[must_use]
    pub fn new(state: Arc<BotState>, api: Arc<dyn DiscordApi>, summarizer: Arc<Summarizer>) -> Self {
        Self {
            state,
            api,
            summarizer,
        }
    }
}

impl std::fmt::Debug for BotContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotContext")
            .field("summarizer", &self.summarizer)
            .finish_non_exhaustive()
    }
}
