//! Daily API call counter.

use chrono::NaiveDate;

/// Counts successful model calls per local day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiUsage {
    calls_today: u64,
    day: NaiveDate,
}

impl ApiUsage {
    /// Starts counting on `today`.
    #[must_use]
    pub const fn new(today: NaiveDate) -> Self {
        Self {
            calls_today: 0,
            day: today,
        }
    }

    /// Resets the counter when the local date has changed.
    pub fn rollover(&mut self, today: NaiveDate) {
        if today != self.day {
            self.calls_today = 0;
            self.day = today;
        }
    }

    /// Records one successful call.
    pub fn record(&mut self, today: NaiveDate) {
        self.rollover(today);
        self.calls_today += 1;
    }

    /// Calls made on `today`.
    pub fn calls_on(&mut self, today: NaiveDate) -> u64 {
        self.rollover(today);
        self.calls_today
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_counts_within_day() {
        let mut usage = ApiUsage::new(day(1));
        usage.record(day(1));
        usage.record(day(1));
        assert_eq!(usage.calls_on(day(1)), 2);
    }

    #[test]
    fn test_resets_on_new_day() {
        let mut usage = ApiUsage::new(day(1));
        usage.record(day(1));
        assert_eq!(usage.calls_on(day(2)), 0);
        usage.record(day(2));
        assert_eq!(usage.calls_on(day(2)), 1);
    }
}
