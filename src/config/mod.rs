//! Configuration module for the summary bot.
//!
//! Handles loading and validation of credentials, bot settings
//! and the summary schedule.

mod schedule;
mod settings;

pub use schedule::{ScheduleConfig, ScheduleError, SummaryJob, SummarySlot, WeeklySlot};
pub use settings::{BotSettings, ConfigError, DiscordConfig, OpenAiConfig};

/// How long buffered messages are kept, in hours (one week).
pub const MESSAGE_RETENTION_HOURS: u32 = 168;

/// Longest window the `summary` command accepts, in hours.
pub const MAX_SUMMARY_HOURS: u32 = MESSAGE_RETENTION_HOURS;
