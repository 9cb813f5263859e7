//! Per-guild, per-channel message buffers.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};

use crate::discord::{ChannelId, GuildId, Message, Snowflake};

/// What the bot keeps of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageData {
    pub message_id: Snowflake,
    /// Author's display name at the time the message was seen.
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub jump_url: String,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub attachments: usize,
    pub embeds: usize,
}

impl MessageData {
    /// Captures a gateway message; `channel_name` comes from the guild cache.
    #[must_use]
    pub fn from_message(message: &Message, channel_name: String) -> Self {
        Self {
            message_id: message.id,
            author: message.display_name().to_owned(),
            content: message.content.clone(),
            timestamp: message.timestamp,
            jump_url: message.jump_url(),
            channel_id: message.channel_id,
            channel_name,
            attachments: message.attachments.len(),
            embeds: message.embeds.len(),
        }
    }
}

/// Messages of one channel within a time window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessages {
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub messages: Vec<MessageData>,
}

/// Buffered messages, oldest first within each channel.
#[derive(Debug)]
pub struct MessageStore {
    buffers: HashMap<GuildId, BTreeMap<ChannelId, VecDeque<MessageData>>>,
    max_per_channel: usize,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl MessageStore {
    /// Creates a store that keeps at most `max_per_channel` messages per channel.
    #[must_use]
    pub fn new(max_per_channel: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            max_per_channel: max_per_channel.max(1),
        }
    }

    /// Appends a message, dropping the channel's oldest one when full.
    pub fn push(&mut self, guild_id: GuildId, message: MessageData) {
        let deque = self
            .buffers
            .entry(guild_id)
            .or_default()
            .entry(message.channel_id)
            .or_default();
        while deque.len() >= self.max_per_channel {
            deque.pop_front();
        }
        deque.push_back(message);
    }

    /// Messages strictly newer than `now - hours_back`, grouped by channel.
    ///
    /// Channels without messages in the window are omitted; channels are
    /// ordered by id and named after their first message in the window.
    #[must_use]
    pub fn messages_in_range(
        &self,
        guild_id: GuildId,
        hours_back: u32,
        now: DateTime<Utc>,
    ) -> Vec<ChannelMessages> {
        let cutoff = now - Duration::hours(i64::from(hours_back));
        let Some(channels) = self.buffers.get(&guild_id) else {
            return Vec::new();
        };

        channels
            .iter()
            .filter_map(|(&channel_id, deque)| {
                let messages: Vec<MessageData> = deque
                    .iter()
                    .filter(|m| m.timestamp > cutoff)
                    .cloned()
                    .collect();
                let first = messages.first()?;
                Some(ChannelMessages {
                    channel_id,
                    channel_name: first.channel_name.clone(),
                    messages,
                })
            })
            .collect()
    }

    /// Pops messages older than `now - hours` and drops emptied channels.
    ///
    /// Returns the number of messages removed.
    pub fn cleanup_older_than(&mut self, now: DateTime<Utc>, hours: u32) -> usize {
        let cutoff = now - Duration::hours(i64::from(hours));
        let mut removed = 0;

        for channels in self.buffers.values_mut() {
            for deque in channels.values_mut() {
                while deque.front().is_some_and(|m| m.timestamp < cutoff) {
                    deque.pop_front();
                    removed += 1;
                }
            }
            channels.retain(|_, deque| !deque.is_empty());
        }
        self.buffers.retain(|_, channels| !channels.is_empty());

        removed
    }

    /// Forgets everything buffered for a guild.
    pub fn remove_guild(&mut self, guild_id: GuildId) -> bool {
        self.buffers.remove(&guild_id).is_some()
    }

    /// Drops guilds not in `known`, returning the removed ids.
    pub fn retain_guilds(&mut self, known: &HashSet<GuildId>) -> Vec<GuildId> {
        let stale: Vec<GuildId> = self
            .buffers
            .keys()
            .filter(|id| !known.contains(id))
            .copied()
            .collect();
        for id in &stale {
            self.buffers.remove(id);
        }
        stale
    }

    /// Buffered message count per channel, ordered by channel id.
    #[must_use]
    pub fn channel_counts(&self, guild_id: GuildId) -> Vec<(ChannelId, usize)> {
        self.buffers.get(&guild_id).map_or_else(Vec::new, |channels| {
            channels
                .iter()
                .filter(|(_, d)| !d.is_empty())
                .map(|(&id, d)| (id, d.len()))
                .collect()
        })
    }

    /// Total buffered messages of a guild.
    #[must_use]
    pub fn total(&self, guild_id: GuildId) -> usize {
        self.buffers
            .get(&guild_id)
            .map_or(0, |channels| channels.values().map(VecDeque::len).sum())
    }

    /// Ids of guilds with buffers.
    #[must_use]
    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.buffers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 7, hour, minute, 0).unwrap()
    }

    fn msg(id: u64, channel: u64, name: &str, time: DateTime<Utc>) -> MessageData {
        MessageData {
            message_id: Snowflake(id),
            author: "alice".to_owned(),
            content: format!("message {id}"),
            timestamp: time,
            jump_url: String::new(),
            channel_id: Snowflake(channel),
            channel_name: name.to_owned(),
            attachments: 0,
            embeds: 0,
        }
    }

    const GUILD: Snowflake = Snowflake(1);

    #[test]
    fn test_messages_in_range_filters_and_groups() {
        let mut store = MessageStore::default();
        store.push(GUILD, msg(1, 20, "random", at(1, 0)));
        store.push(GUILD, msg(2, 10, "general", at(9, 0)));
        store.push(GUILD, msg(3, 20, "random", at(10, 0)));
        store.push(GUILD, msg(4, 30, "old", at(2, 0)));

        let result = store.messages_in_range(GUILD, 6, at(12, 0));
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].channel_name, "general");
        assert_eq!(result[1].channel_name, "random");
        assert_eq!(result[1].messages.len(), 1);
        assert_eq!(result[1].messages[0].message_id, Snowflake(3));
    }

    #[test]
    fn test_range_boundary_is_exclusive() {
        let mut store = MessageStore::default();
        store.push(GUILD, msg(1, 10, "general", at(6, 0)));
        assert!(store.messages_in_range(GUILD, 6, at(12, 0)).is_empty());
        assert_eq!(store.messages_in_range(GUILD, 7, at(12, 0)).len(), 1);
    }

    #[test]
    fn test_unknown_guild_is_empty() {
        let store = MessageStore::default();
        assert!(store.messages_in_range(Snowflake(9), 24, at(12, 0)).is_empty());
        assert_eq!(store.total(Snowflake(9)), 0);
    }

    #[test]
    fn test_cleanup_removes_old_and_empty() {
        let mut store = MessageStore::default();
        store.push(GUILD, msg(1, 10, "general", at(1, 0)));
        store.push(GUILD, msg(2, 10, "general", at(11, 0)));
        store.push(GUILD, msg(3, 20, "random", at(2, 0)));

        let removed = store.cleanup_older_than(at(12, 0), 3);
        assert_eq!(removed, 2);
        assert_eq!(store.total(GUILD), 1);
        assert_eq!(store.channel_counts(GUILD), vec![(Snowflake(10), 1)]);
    }

    #[test]
    fn test_cap_drops_oldest() {
        let mut store = MessageStore::new(2);
        store.push(GUILD, msg(1, 10, "general", at(1, 0)));
        store.push(GUILD, msg(2, 10, "general", at(2, 0)));
        store.push(GUILD, msg(3, 10, "general", at(3, 0)));

        let result = store.messages_in_range(GUILD, 24, at(12, 0));
        let ids: Vec<u64> = result[0].messages.iter().map(|m| m.message_id.get()).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_retain_and_remove_guilds() {
        let mut store = MessageStore::default();
        store.push(GUILD, msg(1, 10, "general", at(1, 0)));
        store.push(Snowflake(2), msg(2, 10, "general", at(1, 0)));

        let known: HashSet<GuildId> = [GUILD].into_iter().collect();
        assert_eq!(store.retain_guilds(&known), vec![Snowflake(2)]);
        assert!(store.remove_guild(GUILD));
        assert!(store.guild_ids().is_empty());
    }
}
