//! Scheduler state management.

use chrono::{DateTime, FixedOffset, Timelike};

/// Remembers which wall-clock minutes already fired.
///
/// The loop ticks more often than once a minute so no minute is missed;
/// this makes sure each minute runs its slots at most once.
#[derive(Debug, Default)]
pub struct SchedulerState {
    last_fired: Option<DateTime<FixedOffset>>,

    /// Number of minutes that fired since start.
    pub fired_count: u64,
}

impl SchedulerState {
    /// Creates a new scheduler state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the minute of `now` as fired. Returns `false` if it already was.
    pub fn try_fire(&mut self, now: DateTime<FixedOffset>) -> bool {
        let minute = truncate_to_minute(now);
        if self.last_fired == Some(minute) {
            return false;
        }
        self.last_fired = Some(minute);
        self.fired_count += 1;
        true
    }

    /// The last minute that fired.
    #[must_use]
    pub const fn last_fired(&self) -> Option<DateTime<FixedOffset>> {
        self.last_fired
    }
}

fn truncate_to_minute(at: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 6, hour, minute, second)
            .unwrap()
    }

    #[test]
    fn test_default_state() {
        let state = SchedulerState::new();
        assert!(state.last_fired().is_none());
        assert_eq!(state.fired_count, 0);
    }

    #[test]
    fn test_fires_once_per_minute() {
        let mut state = SchedulerState::new();
        assert!(state.try_fire(at(6, 0, 5)));
        assert!(!state.try_fire(at(6, 0, 35)));
        assert!(state.try_fire(at(6, 1, 5)));
        assert_eq!(state.fired_count, 2);
        assert_eq!(state.last_fired(), Some(at(6, 1, 0)));
    }

    #[test]
    fn test_same_minute_next_day_fires() {
        let mut state = SchedulerState::new();
        assert!(state.try_fire(at(6, 0, 0)));
        let tomorrow = at(6, 0, 0) + chrono::Duration::days(1);
        assert!(state.try_fire(tomorrow));
    }
}
