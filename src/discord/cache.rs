//! In-memory cache of guilds seen on the gateway.

use std::collections::HashMap;

use super::model::{
    Channel, ChannelId, Guild, GuildId, GuildMemberUpdate, GuildUpdate, Member, Role, RoleId, UserId,
};

/// Guild snapshot kept up to date from gateway events.
#[derive(Debug, Default)]
pub struct GuildCache {
    guilds: HashMap<GuildId, Guild>,
}

impl GuildCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a guild.
    ///
    /// Channels inside `GUILD_CREATE` omit `guild_id`; it is filled in here.
    pub fn insert(&mut self, mut guild: Guild) {
        for channel in guild.channels.iter_mut().chain(guild.threads.iter_mut()) {
            channel.guild_id = Some(guild.id);
        }
        self.guilds.insert(guild.id, guild);
    }

    /// Removes a guild, returning it.
    pub fn remove(&mut self, guild_id: GuildId) -> Option<Guild> {
        self.guilds.remove(&guild_id)
    }

    /// Gets a guild by id.
    #[must_use]
    pub fn get(&self, guild_id: GuildId) -> Option<&Guild> {
        self.guilds.get(&guild_id)
    }

    /// Whether the guild is cached.
    #[must_use]
    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.guilds.contains_key(&guild_id)
    }

    /// Number of cached guilds.
    #[must_use]
    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }

    /// Ids of all cached guilds.
    #[must_use]
    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.guilds.keys().copied().collect()
    }

    /// Name of a guild, if cached.
    #[must_use]
    pub fn guild_name(&self, guild_id: GuildId) -> Option<String> {
        self.guilds.get(&guild_id).map(|g| g.name.clone())
    }

    /// Looks up a channel or thread in a guild.
    #[must_use]
    pub fn channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<&Channel> {
        let guild = self.guilds.get(&guild_id)?;
        guild
            .channels
            .iter()
            .chain(guild.threads.iter())
            .find(|c| c.id == channel_id)
    }

    /// Name of a channel, if known.
    #[must_use]
    pub fn channel_name(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<String> {
        self.channel(guild_id, channel_id).and_then(|c| c.name.clone())
    }

    /// First text channel with the given name.
    #[must_use]
    pub fn find_text_channel(&self, guild_id: GuildId, name: &str) -> Option<&Channel> {
        self.guilds
            .get(&guild_id)?
            .channels
            .iter()
            .find(|c| c.is_text() && c.name.as_deref() == Some(name))
    }

    /// Inserts or replaces a channel (or thread) in its guild.
    pub fn upsert_channel(&mut self, channel: Channel) {
        let Some(guild) = channel.guild_id.and_then(|id| self.guilds.get_mut(&id)) else {
            return;
        };
        let list = if channel.is_thread() {
            &mut guild.threads
        } else {
            &mut guild.channels
        };
        if let Some(existing) = list.iter_mut().find(|c| c.id == channel.id) {
            *existing = channel;
        } else {
            list.push(channel);
        }
    }

    /// Removes a channel (or thread) from its guild.
    pub fn remove_channel(&mut self, channel: &Channel) {
        if let Some(guild) = channel.guild_id.and_then(|id| self.guilds.get_mut(&id)) {
            guild.channels.retain(|c| c.id != channel.id);
            guild.threads.retain(|c| c.id != channel.id);
        }
    }

    /// Applies `GUILD_UPDATE`: name, owner and the full role list.
    pub fn update_guild(&mut self, update: GuildUpdate) {
        if let Some(guild) = self.guilds.get_mut(&update.id) {
            guild.name = update.name;
            guild.owner_id = update.owner_id;
            guild.roles = update.roles;
        }
    }

    /// Inserts or replaces a role.
    pub fn upsert_role(&mut self, guild_id: GuildId, role: Role) {
        let Some(guild) = self.guilds.get_mut(&guild_id) else {
            return;
        };
        if let Some(existing) = guild.roles.iter_mut().find(|r| r.id == role.id) {
            *existing = role;
        } else {
            guild.roles.push(role);
        }
    }

    /// Removes a role from the guild and from every cached member.
    pub fn remove_role(&mut self, guild_id: GuildId, role_id: RoleId) {
        if let Some(guild) = self.guilds.get_mut(&guild_id) {
            guild.roles.retain(|r| r.id != role_id);
            for member in &mut guild.members {
                member.roles.retain(|r| *r != role_id);
            }
        }
    }

    /// Applies `GUILD_MEMBER_UPDATE`.
    pub fn update_member(&mut self, update: &GuildMemberUpdate) {
        let Some(guild) = self.guilds.get_mut(&update.guild_id) else {
            return;
        };
        let user_id = update.user.id;
        let member = update.member();
        if let Some(existing) = guild
            .members
            .iter_mut()
            .find(|m| m.user.as_ref().is_some_and(|u| u.id == user_id))
        {
            *existing = member;
        } else {
            guild.members.push(member);
        }
    }

    /// Finds a member of a guild by user id.
    #[must_use]
    pub fn member(&self, guild_id: GuildId, user_id: UserId) -> Option<&Member> {
        self.guilds
            .get(&guild_id)?
            .members
            .iter()
            .find(|m| m.user.as_ref().is_some_and(|u| u.id == user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::model::Snowflake;
    use crate::discord::{Permissions, guild_permissions};

    fn channel(id: u64, kind: u8, name: &str) -> Channel {
        Channel {
            id: Snowflake(id),
            kind,
            guild_id: Some(Snowflake(1)),
            name: Some(name.to_owned()),
            topic: None,
            parent_id: None,
            permission_overwrites: vec![],
        }
    }

    fn guild() -> Guild {
        Guild {
            id: Snowflake(1),
            name: "Test Server".to_owned(),
            owner_id: Snowflake(2),
            roles: vec![],
            channels: vec![channel(10, 0, "general"), channel(11, 2, "voice")],
            threads: vec![],
            members: vec![],
        }
    }

    #[test]
    fn test_channel_lookup() {
        let mut cache = GuildCache::new();
        cache.insert(guild());

        assert_eq!(
            cache.channel_name(Snowflake(1), Snowflake(10)).as_deref(),
            Some("general")
        );
        assert!(cache.find_text_channel(Snowflake(1), "voice").is_none());
        assert!(cache.find_text_channel(Snowflake(1), "general").is_some());
    }

    #[test]
    fn test_upsert_and_remove_channel() {
        let mut cache = GuildCache::new();
        cache.insert(guild());

        cache.upsert_channel(channel(10, 0, "renamed"));
        cache.upsert_channel(channel(12, 11, "a-thread"));
        assert_eq!(
            cache.channel_name(Snowflake(1), Snowflake(10)).as_deref(),
            Some("renamed")
        );
        assert_eq!(
            cache.channel_name(Snowflake(1), Snowflake(12)).as_deref(),
            Some("a-thread")
        );

        cache.remove_channel(&channel(12, 11, "a-thread"));
        assert!(cache.channel(Snowflake(1), Snowflake(12)).is_none());
    }

    #[test]
    fn test_remove_guild() {
        let mut cache = GuildCache::new();
        cache.insert(guild());
        assert_eq!(cache.guild_count(), 1);
        assert!(cache.contains(Snowflake(1)));
        assert!(cache.remove(Snowflake(1)).is_some());
        assert_eq!(cache.guild_count(), 0);
    }

    fn admin_role(id: u64) -> Role {
        Role {
            id: Snowflake(id),
            name: "admins".to_owned(),
            permissions: Permissions::ADMINISTRATOR,
        }
    }

    fn bob(roles: &[u64]) -> GuildMemberUpdate {
        GuildMemberUpdate {
            guild_id: Snowflake(1),
            user: crate::discord::User {
                id: Snowflake(7),
                username: "bob".to_owned(),
                global_name: None,
                bot: false,
            },
            nick: None,
            roles: roles.iter().copied().map(Snowflake).collect(),
        }
    }

    #[test]
    fn test_role_changes_reach_permissions() {
        let mut cache = GuildCache::new();
        cache.insert(guild());
        cache.update_member(&bob(&[50]));

        let is_admin = |cache: &GuildCache| {
            let guild = cache.get(Snowflake(1)).unwrap();
            let member = cache.member(Snowflake(1), Snowflake(7)).unwrap();
            guild_permissions(guild, Snowflake(7), member).contains(Permissions::ADMINISTRATOR)
        };
        assert!(!is_admin(&cache));

        cache.upsert_role(Snowflake(1), admin_role(50));
        assert!(is_admin(&cache));

        cache.upsert_role(
            Snowflake(1),
            Role {
                permissions: Permissions::VIEW_CHANNEL,
                ..admin_role(50)
            },
        );
        assert!(!is_admin(&cache));
        assert_eq!(cache.get(Snowflake(1)).unwrap().roles.len(), 1);

        cache.upsert_role(Snowflake(1), admin_role(50));
        cache.remove_role(Snowflake(1), Snowflake(50));
        assert!(!is_admin(&cache));
        assert!(cache.member(Snowflake(1), Snowflake(7)).unwrap().roles.is_empty());
    }

    #[test]
    fn test_member_update_replaces_roles() {
        let mut cache = GuildCache::new();
        cache.insert(guild());
        cache.update_member(&bob(&[50]));
        cache.update_member(&bob(&[51, 52]));

        let guild = cache.get(Snowflake(1)).unwrap();
        assert_eq!(guild.members.len(), 1);
        assert_eq!(guild.members[0].roles, vec![Snowflake(51), Snowflake(52)]);
    }

    #[test]
    fn test_guild_update_keeps_channels() {
        let mut cache = GuildCache::new();
        cache.insert(guild());
        cache.update_guild(GuildUpdate {
            id: Snowflake(1),
            name: "Renamed".to_owned(),
            owner_id: Snowflake(7),
            roles: vec![admin_role(50)],
        });

        let guild = cache.get(Snowflake(1)).unwrap();
        assert_eq!(guild.name, "Renamed");
        assert_eq!(guild.owner_id, Snowflake(7));
        assert_eq!(guild.roles.len(), 1);
        assert_eq!(guild.channels.len(), 2);
    }
}
