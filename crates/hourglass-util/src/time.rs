//! Time utilities for hourglass
//!
//! Provides the weekly allowed-hours model and wall-clock access.
//! All schedule decisions are made in the configured IANA timezone; the
//! clock itself always hands out UTC instants so conversion happens in
//! exactly one place (`now_in`).
//!
//! # Mock Time for Development
//!
//! In debug builds, the `HOURGLASS_MOCK_TIME` environment variable can be
//! set to override the system time. The clock then advances from the mock
//! instant at the same rate as real time.
//!
//! Format: RFC 3339 (e.g., `2025-12-29T17:50:00+01:00`)
//!
//! Example:
//! ```bash
//! HOURGLASS_MOCK_TIME="2025-12-29T17:50:00+01:00" hourglassd -c config.toml
//! ```

use chrono::{DateTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "HOURGLASS_MOCK_TIME";

/// Offset between mock time and real time, computed once at first use.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Utc::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match DateTime::parse_from_rfc3339(&mock_time_str) {
                    Ok(mock_dt) => {
                        let offset = mock_dt.with_timezone(&Utc).signed_duration_since(Utc::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    Err(e) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            error = %e,
                            expected_format = "RFC 3339",
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current instant, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Utc> {
    let real_now = Utc::now();

    if let Some(offset) = get_mock_time_offset() {
        real_now + offset
    } else {
        real_now
    }
}

/// Get the current instant in the given timezone.
pub fn now_in(tz: Tz) -> DateTime<Tz> {
    now().with_timezone(&tz)
}

/// Three-letter upper-case weekday symbol (`MON` .. `SUN`)
pub fn weekday_symbol(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

/// Parse a weekday from its short or long English name, case-insensitive
pub fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.trim().to_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Set of allowed hours-of-day (0-23), stored as a bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HourSet(u32);

impl HourSet {
    pub const EMPTY: HourSet = HourSet(0);
    pub const ALL_DAY: HourSet = HourSet((1 << 24) - 1);

    pub fn new() -> Self {
        Self::EMPTY
    }

    /// Build a set from hours; returns `None` if any hour is outside 0-23
    pub fn from_hours<I: IntoIterator<Item = u8>>(hours: I) -> Option<Self> {
        let mut set = Self::EMPTY;
        for hour in hours {
            if !set.insert(hour) && hour >= 24 {
                return None;
            }
        }
        Some(set)
    }

    /// Insert an hour. Returns false if the hour is out of range or already present.
    pub fn insert(&mut self, hour: u8) -> bool {
        if hour >= 24 {
            return false;
        }
        let bit = 1u32 << hour;
        let added = self.0 & bit == 0;
        self.0 |= bit;
        added
    }

    pub fn contains(&self, hour: u32) -> bool {
        hour < 24 && (self.0 & (1 << hour)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Allowed hours in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0u8..24).filter(move |h| self.contains(*h as u32))
    }
}

impl fmt::Display for HourSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "-");
        }
        let hours: Vec<String> = self.iter().map(|h| h.to_string()).collect();
        write!(f, "{}", hours.join(","))
    }
}

/// Allowed hours for each day of the week.
///
/// Each day is independent: hour 23 on Monday says nothing about hour 0 on
/// Tuesday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WeeklySchedule {
    days: [HourSet; 7],
}

impl WeeklySchedule {
    /// A schedule with no allowed hours on any day
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_day(mut self, day: Weekday, hours: HourSet) -> Self {
        self.set_day(day, hours);
        self
    }

    pub fn set_day(&mut self, day: Weekday, hours: HourSet) {
        self.days[day.num_days_from_monday() as usize] = hours;
    }

    pub fn hours_for(&self, day: Weekday) -> HourSet {
        self.days[day.num_days_from_monday() as usize]
    }

    pub fn allows(&self, day: Weekday, hour: u32) -> bool {
        self.hours_for(day).contains(hour)
    }

    /// True when no day has any allowed hour
    pub fn is_empty(&self) -> bool {
        self.days.iter().all(HourSet::is_empty)
    }

    /// Days in Monday-first order with their allowed hours
    pub fn iter(&self) -> impl Iterator<Item = (Weekday, HourSet)> + '_ {
        self.days
            .iter()
            .enumerate()
            .map(|(i, hours)| (weekday_from_index(i), *hours))
    }
}

fn weekday_from_index(i: usize) -> Weekday {
    match i {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
