//! Summary scheduler runner.
//!
//! Two timers drive the scheduler:
//! 1. The summary tick (every 30 s) derives the local minute and, once per
//!    minute, runs every daily slot due at that minute. When the weekly slot
//!    is due it runs after the daily ones and is followed by a prune of
//!    messages older than the retention window.
//! 2. The cleanup tick (every 6 h) drops data of guilds that are no longer
//!    cached and prunes old messages.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use super::SchedulerState;
use super::poster::post_scheduled_summary;
use crate::bot::BotContext;
use crate::config::{MESSAGE_RETENTION_HOURS, SummaryJob};
use crate::discord::GuildId;

/// Messages that can be sent to the scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerMessage {
    /// Run a summary job immediately.
    RunNow(SummaryJob),
    /// Run the cleanup immediately.
    Cleanup,
    /// Stop the scheduler.
    Shutdown,
}

/// Result of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Guilds whose buffers and config were dropped.
    pub removed_guilds: Vec<GuildId>,
    /// Messages pruned for age.
    pub removed_messages: usize,
}

/// Scheduled summaries and periodic cleanup.
pub struct SummaryScheduler {
    ctx: BotContext,
    state: SchedulerState,
    tick_interval: Duration,
    cleanup_interval: Duration,
}

impl SummaryScheduler {
    /// Creates a scheduler with the default 30 s tick and 6 h cleanup.
    #[must_use]
    pub fn new(ctx: BotContext) -> Self {
        Self {
            ctx,
            state: SchedulerState::new(),
            tick_interval: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(6 * 3600),
        }
    }

    /// Sets the summary tick interval.
    #[must_use]
    pub const fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the cleanup interval.
    #[must_use]
    pub const fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Runs the scheduler loop.
    pub async fn run(mut self, mut rx: mpsc::Receiver<SchedulerMessage>) {
        info!(
            "Summary scheduler started ({})",
            self.ctx.state.schedule.describe()
        );

        let mut summary_timer = interval(self.tick_interval);
        summary_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cleanup_timer = interval(self.cleanup_interval);
        cleanup_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick of an interval completes immediately
        cleanup_timer.tick().await;

        loop {
            tokio::select! {
                _ = summary_timer.tick() => {
                    let now = self.ctx.state.local_now();
                    self.tick(now).await;
                }
                _ = cleanup_timer.tick() => {
                    self.cleanup(Utc::now()).await;
                }
                msg = rx.recv() => {
                    match msg {
                        Some(SchedulerMessage::RunNow(job)) => {
                            debug!("Received run request for {}", job.description);
                            post_scheduled_summary(&self.ctx, &job).await;
                        }
                        Some(SchedulerMessage::Cleanup) => {
                            self.cleanup(Utc::now()).await;
                        }
                        Some(SchedulerMessage::Shutdown) | None => {
                            info!("Scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Runs whatever is due at `now`. Returns the jobs that ran.
    pub async fn tick(&mut self, now: DateTime<FixedOffset>) -> Vec<SummaryJob> {
        if !self.state.try_fire(now) {
            return Vec::new();
        }

        let schedule = &self.ctx.state.schedule;
        let mut jobs: Vec<SummaryJob> = schedule.due_slots(now).into_iter().map(|s| s.job()).collect();
        let weekly = schedule.weekly_due(now).map(|w| w.job());
        jobs.extend(weekly.clone());

        for job in &jobs {
            post_scheduled_summary(&self.ctx, job).await;
        }

        if weekly.is_some() {
            let removed = self
                .ctx
                .state
                .store
                .write()
                .await
                .cleanup_older_than(now.with_timezone(&Utc), MESSAGE_RETENTION_HOURS);
            debug!("Pruned {} messages after weekly summary", removed);
        }

        jobs
    }

    /// Drops data of departed guilds and prunes old messages.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> CleanupReport {
        let state = &self.ctx.state;
        let known: HashSet<GuildId> = state.cache.read().await.guild_ids().into_iter().collect();

        let (mut removed_guilds, removed_messages) = {
            let mut store = state.store.write().await;
            let stale = store.retain_guilds(&known);
            let removed = store.cleanup_older_than(now, MESSAGE_RETENTION_HOURS);
            (stale, removed)
        };

        {
            let mut configs = state.configs.write().await;
            configs.retain(|id, _| {
                let keep = known.contains(id);
                if !keep && !removed_guilds.contains(id) {
                    removed_guilds.push(*id);
                }
                keep
            });
        }
        removed_guilds.sort_unstable();

        info!(
            "[{}] Memory cleanup complete ({} messages, {} servers removed)",
            state.log_time(),
            removed_messages,
            removed_guilds.len()
        );

        CleanupReport {
            removed_guilds,
            removed_messages,
        }
    }

    /// Gets a reference to the scheduler state.
    #[must_use]
    pub const fn state(&self) -> &SchedulerState {
        &self.state
    }
}

impl std::fmt::Debug for SummaryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryScheduler")
            .field("tick_interval", &self.tick_interval)
            .field("cleanup_interval", &self.cleanup_interval)
            .finish_non_exhaustive()
    }
}
