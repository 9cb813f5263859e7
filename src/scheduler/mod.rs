//! Summary scheduler module.
//!
//! Posts summaries at fixed wall-clock times in the configured UTC offset
//! and periodically frees buffers that are no longer needed.

mod poster;
mod runner;
mod state;

pub use poster::{GuildOutcome, PostReport, post_scheduled_summary};
pub use runner::{CleanupReport, SchedulerMessage, SummaryScheduler};
pub use state::SchedulerState;
