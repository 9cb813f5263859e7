//! Test doubles shared by the bot, command and scheduler tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::state::{BotContext, BotState};
use crate::config::{BotSettings, OpenAiConfig, ScheduleConfig};
use crate::discord::model::{Member, Role};
use crate::discord::{
    Channel, ChannelId, DiscordApi, DiscordError, Embed, Guild, GuildId, Message, Permissions,
    Snowflake, User,
};
use crate::summary::{OpenAiClient, Summarizer};

pub const OWNER_ID: u64 = 999;
pub const BOT_ID: u64 = 900;
pub const ADMIN_ROLE: u64 = 500;

/// Records every REST call instead of talking to Discord.
#[derive(Debug, Default)]
pub struct FakeDiscord {
    created: Mutex<Vec<(GuildId, String, String)>>,
    messages: Mutex<Vec<(ChannelId, String)>>,
    embeds: Mutex<Vec<(ChannelId, Embed)>>,
    forbid_create: Mutex<bool>,
    forbid_send: Mutex<bool>,
    next_id: AtomicU64,
}

impl FakeDiscord {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1000),
            ..Self::default()
        })
    }

    pub async fn forbid_channel_creation(&self) {
        *self.forbid_create.lock().await = true;
    }

    pub async fn forbid_sending(&self) {
        *self.forbid_send.lock().await = true;
    }

    pub async fn created_channels(&self) -> Vec<(GuildId, String, String)> {
        self.created.lock().await.clone()
    }

    pub async fn messages(&self) -> Vec<(ChannelId, String)> {
        self.messages.lock().await.clone()
    }

    pub async fn embeds(&self) -> Vec<(ChannelId, Embed)> {
        self.embeds.lock().await.clone()
    }

    /// Waits up to five seconds for `count` text messages; commands reply from their own task.
    pub async fn wait_for_messages(&self, count: usize) -> Vec<(ChannelId, String)> {
        for _ in 0..500 {
            let sent = self.messages().await;
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.messages().await
    }

    /// Waits up to five seconds for `count` embeds.
    pub async fn wait_for_embeds(&self, count: usize) -> Vec<(ChannelId, Embed)> {
        for _ in 0..500 {
            let sent = self.embeds().await;
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.embeds().await
    }
}

#[async_trait]
impl DiscordApi for FakeDiscord {
    async fn create_text_channel(
        &self,
        guild_id: GuildId,
        name: &str,
        topic: &str,
    ) -> Result<Channel, DiscordError> {
        if *self.forbid_create.lock().await {
            return Err(DiscordError::Forbidden("Missing Permissions".to_owned()));
        }
        self.created
            .lock()
            .await
            .push((guild_id, name.to_owned(), topic.to_owned()));
        Ok(text_channel(
            guild_id.get(),
            self.next_id.fetch_add(1, Ordering::SeqCst),
            name,
        ))
    }

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<(), DiscordError> {
        if *self.forbid_send.lock().await {
            return Err(DiscordError::Forbidden("Missing Access".to_owned()));
        }
        self.messages.lock().await.push((channel_id, content.to_owned()));
        Ok(())
    }

    async fn send_embed(&self, channel_id: ChannelId, embed: &Embed) -> Result<(), DiscordError> {
        if *self.forbid_send.lock().await {
            return Err(DiscordError::Forbidden("Missing Access".to_owned()));
        }
        self.embeds.lock().await.push((channel_id, embed.clone()));
        Ok(())
    }
}

/// Context with default settings and a model endpoint that refuses connections.
pub fn context(api: Arc<FakeDiscord>) -> BotContext {
    context_with(api, BotSettings::default(), "http://127.0.0.1:1".to_owned())
}

pub fn context_with(api: Arc<FakeDiscord>, settings: BotSettings, openai_url: String) -> BotContext {
    let config = OpenAiConfig {
        base_url: openai_url,
        timeout_secs: 2,
        retry_count: 0,
        ..OpenAiConfig::new("TEST-KEY".to_owned())
    };
    let client = OpenAiClient::new(config).unwrap();
    let summarizer = Arc::new(Summarizer::new(client, &settings));
    let state = Arc::new(BotState::new(settings, ScheduleConfig::default()));
    BotContext::new(state, api, summarizer)
}

pub fn text_channel(guild_id: u64, id: u64, name: &str) -> Channel {
    Channel {
        id: Snowflake(id),
        kind: 0,
        guild_id: Some(Snowflake(guild_id)),
        name: Some(name.to_owned()),
        topic: None,
        parent_id: None,
        permission_overwrites: vec![],
    }
}

pub fn user(id: u64, name: &str) -> User {
    User {
        id: Snowflake(id),
        username: name.to_owned(),
        global_name: None,
        bot: false,
    }
}

/// Guild owned by [`OWNER_ID`] with an admin role and the bot as a member.
pub fn guild_with_channels(id: u64, channels: &[(u64, &str)]) -> Guild {
    Guild {
        id: Snowflake(id),
        name: format!("Server {id}"),
        owner_id: Snowflake(OWNER_ID),
        roles: vec![
            Role {
                id: Snowflake(id),
                name: "@everyone".to_owned(),
                permissions: Permissions::VIEW_CHANNEL
                    | Permissions::SEND_MESSAGES
                    | Permissions::READ_MESSAGE_HISTORY,
            },
            Role {
                id: Snowflake(ADMIN_ROLE),
                name: "admin".to_owned(),
                permissions: Permissions::ADMINISTRATOR,
            },
        ],
        channels: channels
            .iter()
            .map(|&(cid, name)| text_channel(id, cid, name))
            .collect(),
        threads: vec![],
        members: vec![Member {
            user: Some(User {
                bot: true,
                ..user(BOT_ID, "summary-bot")
            }),
            nick: None,
            roles: vec![],
        }],
    }
}

/// A guild text message from `author_id`, optionally with roles.
pub fn message(
    guild_id: u64,
    channel_id: u64,
    author_id: u64,
    content: &str,
    roles: &[u64],
    timestamp: DateTime<Utc>,
) -> Message {
    Message {
        id: Snowflake(timestamp.timestamp_millis().unsigned_abs()),
        channel_id: Snowflake(channel_id),
        guild_id: Some(Snowflake(guild_id)),
        author: user(author_id, &format!("user{author_id}")),
        member: Some(Member {
            user: None,
            nick: None,
            roles: roles.iter().copied().map(Snowflake).collect(),
        }),
        content: content.to_owned(),
        timestamp,
        attachments: vec![],
        embeds: vec![],
    }
}
