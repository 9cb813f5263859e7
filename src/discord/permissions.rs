//! Permission bit sets and their computation for members and channels.

use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::model::{
    Channel, Guild, Member, OVERWRITE_MEMBER, OVERWRITE_ROLE, UserId, deserialize_u64_lenient,
};

/// A Discord permission bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permissions(pub u64);

impl Permissions {
    pub const NONE: Self = Self(0);
    pub const MANAGE_CHANNELS: Self = Self(1 << 4);
    pub const ADMINISTRATOR: Self = Self(1 << 3);
    pub const VIEW_CHANNEL: Self = Self(1 << 10);
    pub const SEND_MESSAGES: Self = Self(1 << 11);
    pub const EMBED_LINKS: Self = Self(1 << 14);
    pub const READ_MESSAGE_HISTORY: Self = Self(1 << 16);
    pub const ALL: Self = Self(u64::MAX);

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Permissions {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for Permissions {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl Serialize for Permissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_u64_lenient(deserializer).map(Self)
    }
}

/// Permissions the bot needs to do its job, with display labels.
pub const REQUIRED_PERMISSIONS: [(Permissions, &str); 5] = [
    (Permissions::VIEW_CHANNEL, "View Channel"),
    (Permissions::SEND_MESSAGES, "Send Messages"),
    (Permissions::READ_MESSAGE_HISTORY, "Read Message History"),
    (Permissions::MANAGE_CHANNELS, "Manage Channels"),
    (Permissions::EMBED_LINKS, "Embed Links"),
];

/// Guild-level permissions of a member.
///
/// The `@everyone` role shares the guild's id.
#[must_use]
pub fn guild_permissions(guild: &Guild, user_id: UserId, member: &Member) -> Permissions {
    if guild.owner_id == user_id {
        return Permissions::ALL;
    }

    let mut perms = guild
        .roles
        .iter()
        .find(|r| r.id == guild.id)
        .map_or(Permissions::NONE, |r| r.permissions);

    for role in guild.roles.iter().filter(|r| member.roles.contains(&r.id)) {
        perms |= role.permissions;
    }

    if perms.contains(Permissions::ADMINISTRATOR) {
        Permissions::ALL
    } else {
        perms
    }
}

/// Channel-level permissions: `@everyone` overwrite, then role overwrites, then the member's own.
#[must_use]
pub fn channel_permissions(
    guild: &Guild,
    channel: &Channel,
    user_id: UserId,
    member: &Member,
) -> Permissions {
    let base = guild_permissions(guild, user_id, member);
    if base == Permissions::ALL {
        return base;
    }

    let overwrites = &channel.permission_overwrites;
    let mut perms = base;

    if let Some(everyone) = overwrites
        .iter()
        .find(|o| o.kind == OVERWRITE_ROLE && o.id == guild.id)
    {
        perms = (perms & !everyone.deny) | everyone.allow;
    }

    let mut allow = Permissions::NONE;
    let mut deny = Permissions::NONE;
    for ow in overwrites
        .iter()
        .filter(|o| o.kind == OVERWRITE_ROLE && member.roles.contains(&o.id))
    {
        allow |= ow.allow;
        deny |= ow.deny;
    }
    perms = (perms & !deny) | allow;

    if let Some(own) = overwrites
        .iter()
        .find(|o| o.kind == OVERWRITE_MEMBER && o.id == user_id)
    {
        perms = (perms & !own.deny) | own.allow;
    }

    perms
}
