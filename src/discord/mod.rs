//! Discord client module.
//!
//! Provides the gateway connection, the REST client with rate limiting,
//! the object models and a guild cache fed by gateway events.

mod cache;
mod gateway;
mod http;
pub mod model;
mod permissions;
mod rate_limiter;

pub use cache::GuildCache;
pub use gateway::{
    CloseAction, Gateway, GatewayError, GatewayEvent, INTENT_GUILD_MESSAGES, INTENT_GUILDS,
    INTENT_MESSAGE_CONTENT, classify_close, decode_dispatch,
};
pub use http::{DISCORD_API_BASE, DiscordApi, DiscordError, DiscordHttp};
pub use model::{Channel, ChannelId, Color, Embed, Guild, GuildId, Message, Snowflake, User, UserId};
pub use permissions::{Permissions, REQUIRED_PERMISSIONS, channel_permissions, guild_permissions};
pub use rate_limiter::RateLimiter;
