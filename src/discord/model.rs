//! Discord API object models.
//!
//! Only the fields the bot reads are modelled; unknown fields are ignored.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::Permissions;

/// A Discord id. Sent as a decimal string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Snowflake(pub u64);

impl Snowflake {
    /// Returns the raw integer value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Snowflake {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_u64_lenient(deserializer).map(Self)
    }
}

/// Accepts both `"123"` and `123`.
pub(crate) fn deserialize_u64_lenient<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        Raw::Num(n) => Ok(n),
    }
}

pub type GuildId = Snowflake;
pub type ChannelId = Snowflake;
pub type UserId = Snowflake;
pub type RoleId = Snowflake;
pub type MessageId = Snowflake;

/// Channel type: guild text channel.
pub const CHANNEL_GUILD_TEXT: u8 = 0;
/// Channel type: announcement (news) channel.
pub const CHANNEL_GUILD_ANNOUNCEMENT: u8 = 5;
/// Channel type: thread in an announcement channel.
pub const CHANNEL_ANNOUNCEMENT_THREAD: u8 = 10;
/// Channel type: public thread.
pub const CHANNEL_PUBLIC_THREAD: u8 = 11;
/// Channel type: private thread.
pub const CHANNEL_PRIVATE_THREAD: u8 = 12;

/// A Discord user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    /// Global display name, falling back to the username.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}

/// A guild member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Member {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

/// A guild role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    #[serde(default)]
    pub name: String,
    pub permissions: Permissions,
}

/// Overwrite target kind: role.
pub const OVERWRITE_ROLE: u8 = 0;
/// Overwrite target kind: member.
pub const OVERWRITE_MEMBER: u8 = 1;

/// A channel permission overwrite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionOverwrite {
    pub id: Snowflake,
    #[serde(rename = "type")]
    pub kind: u8,
    pub allow: Permissions,
    pub deny: Permissions,
}

/// A guild channel or thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub parent_id: Option<ChannelId>,
    #[serde(default)]
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

impl Channel {
    /// Whether this is a channel that text summaries can be posted to.
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self.kind, CHANNEL_GUILD_TEXT | CHANNEL_GUILD_ANNOUNCEMENT)
    }

    /// Whether this channel is a thread.
    #[must_use]
    pub const fn is_thread(&self) -> bool {
        matches!(
            self.kind,
            CHANNEL_ANNOUNCEMENT_THREAD | CHANNEL_PUBLIC_THREAD | CHANNEL_PRIVATE_THREAD
        )
    }

    /// The channel name, or its id when the name is unknown.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// A guild as delivered by `GUILD_CREATE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Guild {
    pub id: GuildId,
    pub name: String,
    pub owner_id: UserId,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub threads: Vec<Channel>,
    #[serde(default)]
    pub members: Vec<Member>,
}

/// A guild reference that may be unavailable (READY, `GUILD_DELETE`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnavailableGuild {
    pub id: GuildId,
    #[serde(default)]
    pub unavailable: bool,
}

/// Payload of `GUILD_UPDATE`. Channels and members are not included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuildUpdate {
    pub id: GuildId,
    pub name: String,
    pub owner_id: UserId,
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// Payload of `GUILD_ROLE_CREATE` and `GUILD_ROLE_UPDATE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuildRole {
    pub guild_id: GuildId,
    pub role: Role,
}

/// Payload of `GUILD_ROLE_DELETE`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuildRoleDelete {
    pub guild_id: GuildId,
    pub role_id: RoleId,
}

/// Payload of `GUILD_MEMBER_UPDATE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuildMemberUpdate {
    pub guild_id: GuildId,
    pub user: User,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

impl GuildMemberUpdate {
    /// The member as stored in the guild cache.
    #[must_use]
    pub fn member(&self) -> Member {
        Member {
            user: Some(self.user.clone()),
            nick: self.nick.clone(),
            roles: self.roles.clone(),
        }
    }
}

/// A message as delivered by `MESSAGE_CREATE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    pub author: User,
    #[serde(default)]
    pub member: Option<Member>,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
    #[serde(default)]
    pub embeds: Vec<serde_json::Value>,
}

impl Message {
    /// Server nickname, then global name, then username.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.member
            .as_ref()
            .and_then(|m| m.nick.as_deref())
            .unwrap_or_else(|| self.author.display_name())
    }

    /// Link that jumps to this message in the client.
    #[must_use]
    pub fn jump_url(&self) -> String {
        let guild = self
            .guild_id
            .map_or_else(|| "@me".to_owned(), |g| g.to_string());
        format!(
            "https://discord.com/channels/{guild}/{}/{}",
            self.channel_id, self.id
        )
    }
}

/// Payload of the READY dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    pub user: User,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    pub session_id: String,
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
}

/// An RGB embed colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub u32);

impl Color {
    pub const PURPLE: Self = Self(0x009B_59B6);
    pub const BLUE: Self = Self(0x0034_98DB);
    pub const ORANGE: Self = Self(0x00E6_7E22);
    pub const GREEN: Self = Self(0x002E_CC71);
    pub const GOLD: Self = Self(0x00F1_C40F);
}

impl Default for Color {
    fn default() -> Self {
        Self::BLUE
    }
}

/// A rich embed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

/// Maximum length of an embed description.
pub const EMBED_DESCRIPTION_LIMIT: usize = 4096;
/// Maximum length of an embed field value.
pub const EMBED_FIELD_VALUE_LIMIT: usize = 1024;

impl Embed {
    /// Creates an embed with a title and colour.
    #[must_use]
    pub fn new(title: impl Into<String>, color: Color) -> Self {
        Self {
            title: Some(title.into()),
            color: Some(color),
            ..Self::default()
        }
    }

    /// Sets the description, truncated to Discord's limit.
    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(truncate_chars(&text.into(), EMBED_DESCRIPTION_LIMIT));
        self
    }

    /// Sets the timestamp shown in the footer area.
    #[must_use]
    pub const fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    /// Appends a field, truncating its value to Discord's limit.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: truncate_chars(&value.into(), EMBED_FIELD_VALUE_LIMIT),
            inline,
        });
        self
    }

    /// Sets the footer text.
    #[must_use]
    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    /// Finds a field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&EmbedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A single embed field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Embed footer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbedFooter {
    pub text: String,
}

/// Cuts `s` to at most `max` characters, ending with an ellipsis when cut.
fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_owned()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
