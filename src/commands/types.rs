//! Command types and definitions.

use std::fmt;

use crate::config::MAX_SUMMARY_HOURS;
use crate::discord::{ChannelId, Embed};

/// Hours covered by `summary` without an argument.
pub const DEFAULT_SUMMARY_HOURS: u32 = 24;

/// Available bot commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    /// Summarize the last N hours of this guild right now.
    Summary(u32),

    /// Show summary channel, buffered messages and the next run.
    Status,

    /// Enable or disable scheduled summaries for this guild.
    ToggleSummary,

    /// Move scheduled summaries to another channel.
    SetSummaryChannel(ChannelId),

    /// Show today's model calls.
    ApiUsage,

    /// Show host and process resource usage.
    System,

    /// Show the bot's permissions in the guild and summary channel.
    CheckPermissions,

    /// Show help information.
    Help,
}

impl BotCommand {
    /// Parses a command from a message text.
    ///
    /// Returns `None` if the message is not a valid command.
    #[must_use]
    pub fn parse(text: &str, prefix: &str) -> Option<Self> {
        let after_prefix = text.trim().strip_prefix(prefix)?;

        let (cmd, args) = match after_prefix.split_once(char::is_whitespace) {
            Some((cmd, args)) => (cmd.to_lowercase(), Some(args.trim())),
            None => (after_prefix.to_lowercase(), None),
        };
        let first_arg = args.and_then(|a| a.split_whitespace().next());

        match cmd.as_str() {
            "summary" => Self::parse_summary(first_arg),
            "status" => Some(Self::Status),
            "toggle_summary" => Some(Self::ToggleSummary),
            "set_summary_channel" => parse_channel_ref(first_arg?).map(Self::SetSummaryChannel),
            "api_usage" => Some(Self::ApiUsage),
            "system" => Some(Self::System),
            "check_permissions" => Some(Self::CheckPermissions),
            "help" => Some(Self::Help),
            _ => None,
        }
    }

    /// Parses `summary [hours]`, clamping hours to `1..=168`.
    fn parse_summary(arg: Option<&str>) -> Option<Self> {
        let Some(arg) = arg else {
            return Some(Self::Summary(DEFAULT_SUMMARY_HOURS));
        };
        let hours: i64 = arg.parse().ok()?;
        let clamped = hours.clamp(1, i64::from(MAX_SUMMARY_HOURS));
        u32::try_from(clamped).ok().map(Self::Summary)
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Summary(_) => "summary",
            Self::Status => "status",
            Self::ToggleSummary => "toggle_summary",
            Self::SetSummaryChannel(_) => "set_summary_channel",
            Self::ApiUsage => "api_usage",
            Self::System => "system",
            Self::CheckPermissions => "check_permissions",
            Self::Help => "help",
        }
    }

    /// Whether the command needs the Administrator permission.
    #[must_use]
    pub const fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Self::ToggleSummary
                | Self::SetSummaryChannel(_)
                | Self::ApiUsage
                | Self::System
                | Self::CheckPermissions
        )
    }

    /// Returns all available commands with their usage and descriptions.
    #[must_use]
    pub fn all_commands() -> Vec<(&'static str, &'static str)> {
        vec![
            ("summary [hours]", "Summarize the last N hours (default 24, max 168)"),
            ("status", "Show summary channel, buffered messages and next run"),
            ("toggle_summary", "Turn scheduled summaries on or off (admin)"),
            ("set_summary_channel <#channel>", "Post summaries to another channel (admin)"),
            ("api_usage", "Show today's OpenAI API calls (admin)"),
            ("system", "Show system resource usage (admin)"),
            ("check_permissions", "Check the bot's permissions (admin)"),
            ("help", "Show this help message"),
        ]
    }
}

/// Accepts a channel mention (`<#123>`) or a bare id.
fn parse_channel_ref(arg: &str) -> Option<ChannelId> {
    let raw = arg
        .strip_prefix("<#")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(arg);
    raw.parse().ok()
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Summary(hours) => write!(f, "summary {hours}"),
            Self::SetSummaryChannel(id) => write!(f, "set_summary_channel {id}"),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// What the bot answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Text(String),
    Embed(Box<Embed>),
}

impl CommandReply {
    /// A plain text reply.
    #[must_use]
    pub fn text(message: impl Into<String>) -> Self {
        Self::Text(message.into())
    }

    /// An embed reply.
    #[must_use]
    pub fn embed(embed: Embed) -> Self {
        Self::Embed(Box::new(embed))
    }

    /// The text of a text reply.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Embed(_) => None,
        }
    }

    /// The embed of an embed reply.
    #[must_use]
    pub fn as_embed(&self) -> Option<&Embed> {
        match self {
            Self::Embed(embed) => Some(embed),
            Self::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::Snowflake;

    const PREFIX: &str = "!";

    #[test]
    fn test_parse_summary_default() {
        assert_eq!(
            BotCommand::parse("!summary", PREFIX),
            Some(BotCommand::Summary(24))
        );
    }

    #[test]
    fn test_parse_summary_clamps_hours() {
        assert_eq!(
            BotCommand::parse("!summary 6", PREFIX),
            Some(BotCommand::Summary(6))
        );
        assert_eq!(
            BotCommand::parse("!summary 500", PREFIX),
            Some(BotCommand::Summary(168))
        );
        assert_eq!(
            BotCommand::parse("!summary 0", PREFIX),
            Some(BotCommand::Summary(1))
        );
        assert_eq!(
            BotCommand::parse("!summary -3", PREFIX),
            Some(BotCommand::Summary(1))
        );
    }

    #[test]
    fn test_parse_summary_invalid_hours() {
        assert_eq!(BotCommand::parse("!summary lots", PREFIX), None);
    }

    #[test]
    fn test_parse_set_summary_channel() {
        assert_eq!(
            BotCommand::parse("!set_summary_channel <#123456>", PREFIX),
            Some(BotCommand::SetSummaryChannel(Snowflake(123_456)))
        );
        assert_eq!(
            BotCommand::parse("!set_summary_channel 42", PREFIX),
            Some(BotCommand::SetSummaryChannel(Snowflake(42)))
        );
        assert_eq!(BotCommand::parse("!set_summary_channel", PREFIX), None);
        assert_eq!(
            BotCommand::parse("!set_summary_channel general", PREFIX),
            None
        );
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(BotCommand::parse("!status", PREFIX), Some(BotCommand::Status));
        assert_eq!(
            BotCommand::parse("!toggle_summary", PREFIX),
            Some(BotCommand::ToggleSummary)
        );
        assert_eq!(BotCommand::parse("!api_usage", PREFIX), Some(BotCommand::ApiUsage));
        assert_eq!(BotCommand::parse("!system", PREFIX), Some(BotCommand::System));
        assert_eq!(
            BotCommand::parse("!check_permissions", PREFIX),
            Some(BotCommand::CheckPermissions)
        );
        assert_eq!(BotCommand::parse("!help", PREFIX), Some(BotCommand::Help));
    }

    #[test]
    fn test_parse_wrong_prefix() {
        assert_eq!(BotCommand::parse("?status", PREFIX), None);
        assert_eq!(BotCommand::parse("status", PREFIX), None);
        assert_eq!(BotCommand::parse("!unknown", PREFIX), None);
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(BotCommand::parse("!STATUS", PREFIX), Some(BotCommand::Status));
        assert_eq!(
            BotCommand::parse("!Summary 12", PREFIX),
            Some(BotCommand::Summary(12))
        );
    }

    #[test]
    fn test_parse_custom_prefix() {
        assert_eq!(
            BotCommand::parse("sb!status", "sb!"),
            Some(BotCommand::Status)
        );
    }

    #[test]
    fn test_admin_only() {
        assert!(BotCommand::ToggleSummary.is_admin_only());
        assert!(BotCommand::System.is_admin_only());
        assert!(!BotCommand::Summary(24).is_admin_only());
        assert!(!BotCommand::Status.is_admin_only());
        assert!(!BotCommand::Help.is_admin_only());
    }
}
