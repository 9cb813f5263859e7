//! Rate limiter for Discord REST calls.
//!
//! Spaces out outgoing requests and honours the `retry_after` hint that
//! Discord returns with HTTP 429 responses.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct LimiterState {
    /// Last time an operation was performed.
    last_operation: Option<Instant>,
    /// Set by a 429 response; nothing may run before it.
    blocked_until: Option<Instant>,
}

/// Rate limiter that enforces minimum intervals between operations.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum duration between allowed operations.
    min_interval: Duration,

    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the specified minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Creates a rate limiter from milliseconds.
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// Waits until an operation is allowed, then marks the operation as performed.
    ///
    /// Returns the duration waited (0 if no wait was needed).
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut state = self.state.lock().await;

        let wait_duration = Self::remaining(&state, self.min_interval);
        if !wait_duration.is_zero() {
            debug!(
                "Rate limiter: waiting {:?} before next request",
                wait_duration
            );
            tokio::time::sleep(wait_duration).await;
        }

        state.last_operation = Some(Instant::now());
        state.blocked_until = None;
        wait_duration
    }

    /// Blocks further operations for `retry_after`, as requested by a 429 response.
    pub async fn handle_retry_after(&self, retry_after: Duration) {
        warn!("Discord rate limit hit, retrying after {:?}", retry_after);
        let mut state = self.state.lock().await;
        let until = Instant::now() + retry_after;
        state.blocked_until = Some(state.blocked_until.map_or(until, |b| b.max(until)));
    }

    fn remaining(state: &LimiterState, min_interval: Duration) -> Duration {
        let now = Instant::now();
        let by_interval = state.last_operation.map_or(Duration::ZERO, |last| {
            min_interval.saturating_sub(now.saturating_duration_since(last))
        });
        let by_block = state
            .blocked_until
            .map_or(Duration::ZERO, |until| until.saturating_duration_since(now));
        by_interval.max(by_block)
    }
}
