//! Schedule evaluation
//!
//! Pure functions over a [`WeeklySchedule`]. Callers convert the current
//! instant into the configured timezone first; evaluating a UTC instant
//! against a local schedule is the classic off-by-an-offset bug.

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use hourglass_util::WeeklySchedule;

/// Derived view of the schedule at one instant. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleState {
    pub within_window: bool,
    pub minute_of_hour: u32,
}

/// Whether the hour containing `now` is allowed on `now`'s weekday
pub fn is_allowed_now<Tz: TimeZone>(schedule: &WeeklySchedule, now: &DateTime<Tz>) -> bool {
    schedule.allows(now.weekday(), now.hour())
}

pub fn minutes_into_hour<Tz: TimeZone>(now: &DateTime<Tz>) -> u32 {
    now.minute()
}

pub fn evaluate<Tz: TimeZone>(schedule: &WeeklySchedule, now: &DateTime<Tz>) -> ScheduleState {
    ScheduleState {
        within_window: is_allowed_now(schedule, now),
        minute_of_hour: minutes_into_hour(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Utc, Weekday};
    use chrono_tz::Europe::Warsaw;
    use hourglass_util::HourSet;

    fn schedule() -> WeeklySchedule {
        WeeklySchedule::new()
            .with_day(Weekday::Mon, HourSet::from_hours([14]).unwrap())
            .with_day(Weekday::Fri, HourSet::from_hours([18, 19, 20]).unwrap())
    }

    #[test]
    fn test_allowed_hour_boundaries() {
        let s = schedule();
        // 2025-12-29 is a Monday
        let at = |h, m| Warsaw.with_ymd_and_hms(2025, 12, 29, h, m, 0).unwrap();

        assert!(!is_allowed_now(&s, &at(13, 59)));
        assert!(is_allowed_now(&s, &at(14, 0)));
        assert!(is_allowed_now(&s, &at(14, 59)));
        assert!(!is_allowed_now(&s, &at(15, 0)));
    }

    #[test]
    fn test_empty_day_never_allows() {
        let s = schedule();
        // 2025-12-30 is a Tuesday
        for hour in 0..24 {
            let t = Warsaw.with_ymd_and_hms(2025, 12, 30, hour, 30, 0).unwrap();
            assert!(!is_allowed_now(&s, &t));
        }
    }

    #[test]
    fn test_no_wraparound_across_midnight() {
        let s = WeeklySchedule::new().with_day(Weekday::Mon, HourSet::from_hours([23]).unwrap());
        let monday_late = Warsaw.with_ymd_and_hms(2025, 12, 29, 23, 30, 0).unwrap();
        let tuesday_early = Warsaw.with_ymd_and_hms(2025, 12, 30, 0, 10, 0).unwrap();

        assert!(is_allowed_now(&s, &monday_late));
        assert!(!is_allowed_now(&s, &tuesday_early));
    }

    #[test]
    fn test_local_time_not_utc() {
        let s = schedule();
        // 13:30 UTC on Monday is 14:30 in Warsaw (UTC+1 in winter)
        let utc = Utc.with_ymd_and_hms(2025, 12, 29, 13, 30, 0).unwrap();

        assert!(!is_allowed_now(&s, &utc));
        assert!(is_allowed_now(&s, &utc.with_timezone(&Warsaw)));
    }

    #[test]
    fn test_local_time_in_summer_offset() {
        let s = schedule();
        // Friday 18:30 in Warsaw during summer (UTC+2) is 16:30 UTC
        let utc = Utc.with_ymd_and_hms(2025, 6, 27, 16, 30, 0).unwrap();
        assert!(is_allowed_now(&s, &utc.with_timezone(&Warsaw)));
        assert!(!is_allowed_now(&s, &utc));
    }

    #[test]
    fn test_evaluate_is_pure() {
        let s = schedule();
        let t = Warsaw.with_ymd_and_hms(2025, 12, 29, 14, 51, 0).unwrap();
        let first = evaluate(&s, &t);
        let second = evaluate(&s, &t);

        assert_eq!(first, second);
        assert_eq!(
            first,
            ScheduleState {
                within_window: true,
                minute_of_hour: 51
            }
        );
    }
}
