//! Message buffering module.
//!
//! Keeps recent guild messages in memory until they are summarized
//! or fall out of the retention window.

mod store;

pub use store::{ChannelMessages, MessageData, MessageStore};
