//! Human-readable projections of sync timestamps
//!
//! The checkpoint stores `last_fetch_time` as a plain UTC instant; what
//! operators see is derived at read time, relative to "now", and is never
//! persisted.

use chrono::{DateTime, Utc};

/// Format a timestamp relative to `now`.
///
/// - Same calendar day: clock time (`HH:MM`)
/// - Exactly one calendar day prior: short date + time (`MM-DD HH:MM`)
/// - Otherwise: a rounded magnitude in days (up to a week), weeks (up to a
///   month), or months, suffixed with `ago` or `ahead`.
pub fn format_relative(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let today = now.date_naive();
    let day = target.date_naive();
    let day_diff = day.signed_duration_since(today).num_days();

    match day_diff {
        0 => target.format("%H:%M").to_string(),
        -1 => target.format("%m-%d %H:%M").to_string(),
        _ => {
            let magnitude = day_diff.unsigned_abs();
            let suffix = if day_diff > 0 { "ahead" } else { "ago" };
            let (count, unit) = if magnitude <= 7 {
                (magnitude, "day")
            } else if magnitude <= 30 {
                ((magnitude as f64 / 7.0).round() as u64, "week")
            } else {
                ((magnitude as f64 / 30.0).round() as u64, "month")
            };
            let plural = if count == 1 { "" } else { "s" };
            format!("{} {}{} {}", count, unit, plural, suffix)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_same_day_shows_clock_time() {
        let now = utc(2026, 8, 7, 18, 0);
        assert_eq!(format_relative(utc(2026, 8, 7, 9, 5), now), "09:05");
    }

    #[test]
    fn test_previous_day_shows_short_date() {
        let now = utc(2026, 8, 7, 1, 0);
        assert_eq!(format_relative(utc(2026, 8, 6, 23, 45), now), "08-06 23:45");
    }

    #[test]
    fn test_days_ago() {
        let now = utc(2026, 8, 7, 12, 0);
        assert_eq!(format_relative(utc(2026, 8, 4, 12, 0), now), "3 days ago");
        assert_eq!(format_relative(utc(2026, 7, 31, 12, 0), now), "7 days ago");
    }

    #[test]
    fn test_weeks_rounded() {
        let now = utc(2026, 8, 7, 12, 0);
        // 8 days rounds to one week, 15 days to two
        assert_eq!(format_relative(utc(2026, 7, 30, 12, 0), now), "1 week ago");
        assert_eq!(format_relative(utc(2026, 7, 23, 12, 0), now), "2 weeks ago");
    }

    #[test]
    fn test_months_rounded() {
        let now = utc(2026, 8, 7, 12, 0);
        assert_eq!(format_relative(utc(2026, 6, 8, 12, 0), now), "2 months ago");
    }

    #[test]
    fn test_future_direction() {
        let now = utc(2026, 8, 7, 12, 0);
        assert_eq!(format_relative(utc(2026, 8, 8, 12, 0), now), "1 day ahead");
        assert_eq!(format_relative(utc(2026, 8, 21, 12, 0), now), "2 weeks ahead");
    }
}
