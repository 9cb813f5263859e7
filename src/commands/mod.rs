//! Command handling module.
//!
//! Processes prefixed text commands posted in guild channels.
//! Commands use the `COMMAND_PREFIX` prefix (default `!`).

mod handler;
mod system;
mod types;

pub use handler::{CommandHandler, summary_color};
pub use system::SystemSnapshot;
pub use types::{BotCommand, CommandReply, DEFAULT_SUMMARY_HOURS};
