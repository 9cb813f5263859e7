//! Bot core: shared state, guild setup and gateway event handling.

mod events;
mod setup;
mod state;
#[cfg(test)]
pub(crate) mod testing;

pub use events::EventHandler;
pub use setup::{SUMMARY_CHANNEL_TOPIC, get_or_create_bot_channel, setup_guild};
pub use state::{BotContext, BotState, GuildConfig};
