//! Summary schedule configuration and validation.
//!
//! Times are wall-clock times in the bot's configured UTC offset.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::MESSAGE_RETENTION_HOURS;
use crate::discord::Color;

/// Errors that can occur during schedule validation.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Slot {slot} has an invalid time: {hour:02}:{minute:02}")]
    InvalidTime { slot: String, hour: u32, minute: u32 },

    #[error("Slot {slot} has invalid hours_back: {hours_back} (must be 1..=168)")]
    InvalidHoursBack { slot: String, hours_back: u32 },

    #[error("Slot {slot} has an empty description")]
    EmptyDescription { slot: String },

    #[error("Duplicate daily slot at {hour:02}:{minute:02}")]
    DuplicateTime { hour: u32, minute: u32 },

    #[error("Weekly slot has invalid weekday {weekday} (0 = Monday .. 6 = Sunday)")]
    InvalidWeekday { weekday: u32 },

    #[error("No summary slots configured")]
    NoSlots,

    #[error("Failed to read schedule file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse schedule file: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// A summary posted every day at a fixed time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummarySlot {
    pub hour: u32,
    pub minute: u32,
    /// How far back the summary looks.
    pub hours_back: u32,
    /// Title shown on the summary embed.
    pub description: String,
    #[serde(default)]
    pub color: Color,
}

/// A summary posted once a week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeeklySlot {
    /// Day of week, 0 = Monday.
    pub weekday: u32,
    pub hour: u32,
    pub minute: u32,
    pub hours_back: u32,
    pub description: String,
    #[serde(default)]
    pub color: Color,
}

/// A summary run, independent of how it was triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryJob {
    pub description: String,
    pub hours_back: u32,
    pub color: Color,
    pub weekly: bool,
}

impl SummarySlot {
    /// Creates a daily slot.
    #[must_use]
    pub fn new(hour: u32, minute: u32, hours_back: u32, description: &str, color: Color) -> Self {
        Self {
            hour,
            minute,
            hours_back,
            description: description.to_owned(),
            color,
        }
    }

    /// The job this slot runs.
    #[must_use]
    pub fn job(&self) -> SummaryJob {
        SummaryJob {
            description: self.description.clone(),
            hours_back: self.hours_back,
            color: self.color,
            weekly: false,
        }
    }
}

impl WeeklySlot {
    /// The job this slot runs.
    #[must_use]
    pub fn job(&self) -> SummaryJob {
        SummaryJob {
            description: self.description.clone(),
            hours_back: self.hours_back,
            color: self.color,
            weekly: true,
        }
    }
}

/// The full summary schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Summaries posted every day.
    #[serde(default)]
    pub daily: Vec<SummarySlot>,

    /// Weekly summary, followed by pruning of week-old messages.
    #[serde(default)]
    pub weekly: Option<WeeklySlot>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily: vec![
                // 06:00 covers the 12 hours since 18:00
                SummarySlot::new(6, 0, 12, "Overnight summary", Color::PURPLE),
                SummarySlot::new(12, 0, 6, "Morning summary", Color::BLUE),
                SummarySlot::new(18, 0, 6, "Afternoon summary", Color::ORANGE),
            ],
            weekly: Some(WeeklySlot {
                weekday: 0,
                hour: 6,
                minute: 0,
                hours_back: MESSAGE_RETENTION_HOURS,
                description: "Weekly summary".to_owned(),
                color: Color::GREEN,
            }),
        }
    }
}

impl ScheduleConfig {
    /// Loads a schedule from a JSON file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ScheduleError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Saves the schedule to a JSON file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ScheduleError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the schedule, returning the first error.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        self.validate_all()
            .into_iter()
            .find_map(|(_, r)| r.err())
            .map_or(Ok(()), Err)
    }

    /// Validates every slot, labelled `daily[i]` or `weekly`.
    #[must_use]
    pub fn validate_all(&self) -> Vec<(String, Result<(), ScheduleError>)> {
        if self.daily.is_empty() && self.weekly.is_none() {
            return vec![("schedule".to_owned(), Err(ScheduleError::NoSlots))];
        }

        let mut results = Vec::new();
        let mut seen = HashSet::new();

        for (index, slot) in self.daily.iter().enumerate() {
            let label = format!("daily[{index}]");
            let result = check_slot(&label, slot.hour, slot.minute, slot.hours_back, &slot.description)
                .and_then(|()| {
                    if seen.insert((slot.hour, slot.minute)) {
                        Ok(())
                    } else {
                        Err(ScheduleError::DuplicateTime {
                            hour: slot.hour,
                            minute: slot.minute,
                        })
                    }
                });
            results.push((label, result));
        }

        if let Some(weekly) = &self.weekly {
            let result = if weekly.weekday > 6 {
                Err(ScheduleError::InvalidWeekday {
                    weekday: weekly.weekday,
                })
            } else {
                check_slot(
                    "weekly",
                    weekly.hour,
                    weekly.minute,
                    weekly.hours_back,
                    &weekly.description,
                )
            };
            results.push(("weekly".to_owned(), result));
        }

        results
    }

    /// Daily slots due at this minute.
    #[must_use]
    pub fn due_slots(&self, now: DateTime<FixedOffset>) -> Vec<&SummarySlot> {
        self.daily
            .iter()
            .filter(|s| s.hour == now.hour() && s.minute == now.minute())
            .collect()
    }

    /// The weekly slot, if due at this minute.
    #[must_use]
    pub fn weekly_due(&self, now: DateTime<FixedOffset>) -> Option<&WeeklySlot> {
        self.weekly.as_ref().filter(|w| {
            w.weekday == now.weekday().num_days_from_monday()
                && w.hour == now.hour()
                && w.minute == now.minute()
        })
    }

    /// Earliest upcoming run and its description. A run at exactly `now` counts.
    #[must_use]
    pub fn next_run(&self, now: DateTime<FixedOffset>) -> Option<(DateTime<FixedOffset>, String)> {
        self.next_job(now).map(|(at, job)| (at, job.description))
    }

    /// Earliest upcoming run and the job it performs. Daily slots win ties.
    #[must_use]
    pub fn next_job(&self, now: DateTime<FixedOffset>) -> Option<(DateTime<FixedOffset>, SummaryJob)> {
        let mut runs: Vec<(DateTime<FixedOffset>, SummaryJob)> = Vec::new();

        for slot in &self.daily {
            if let Some(mut at) = at_time(now, 0, slot.hour, slot.minute) {
                if at < now {
                    at += Duration::days(1);
                }
                runs.push((at, slot.job()));
            }
        }

        if let Some(weekly) = &self.weekly {
            let today = i64::from(now.weekday().num_days_from_monday());
            let days_until = (i64::from(weekly.weekday) - today).rem_euclid(7);
            if let Some(mut at) = at_time(now, days_until, weekly.hour, weekly.minute) {
                if at < now {
                    at += Duration::weeks(1);
                }
                runs.push((at, weekly.job()));
            }
        }

        runs.into_iter().min_by_key(|(at, _)| *at)
    }

    /// Human-readable list of run times, e.g. `06:00, 12:00, Mon 06:00 (weekly)`.
    #[must_use]
    pub fn describe(&self) -> String {
        const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

        let mut parts: Vec<String> = self
            .daily
            .iter()
            .map(|s| format!("{:02}:{:02}", s.hour, s.minute))
            .collect();
        if let Some(w) = &self.weekly {
            let day = DAYS.get(w.weekday as usize).copied().unwrap_or("?");
            parts.push(format!("{day} {:02}:{:02} (weekly)", w.hour, w.minute));
        }
        parts.join(", ")
    }
}

fn check_slot(
    label: &str,
    hour: u32,
    minute: u32,
    hours_back: u32,
    description: &str,
) -> Result<(), ScheduleError> {
    if hour > 23 || minute > 59 {
        return Err(ScheduleError::InvalidTime {
            slot: label.to_owned(),
            hour,
            minute,
        });
    }
    if hours_back == 0 || hours_back > MESSAGE_RETENTION_HOURS {
        return Err(ScheduleError::InvalidHoursBack {
            slot: label.to_owned(),
            hours_back,
        });
    }
    if description.trim().is_empty() {
        return Err(ScheduleError::EmptyDescription {
            slot: label.to_owned(),
        });
    }
    Ok(())
}

/// `now`'s date plus `days`, at `hour:minute:00` in `now`'s offset.
fn at_time(
    now: DateTime<FixedOffset>,
    days: i64,
    hour: u32,
    minute: u32,
) -> Option<DateTime<FixedOffset>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let date = now.date_naive() + Duration::days(days);
    now.offset()
        .from_local_datetime(&date.and_time(time))
        .single()
}
