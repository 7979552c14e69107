//! Timezone-aware trigger math for the `(hour, minute, days-of-week,
//! timezone)` schedule shape, adapted from a 5-field cron evaluator down to
//! what this spec actually needs. DST handling is kept: spring-forward gaps
//! are skipped, fall-back overlaps resolve to the earliest mapping.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use sa_domain::model::Weekday;

/// Parse an IANA zone name, falling back to UTC on anything unparseable.
pub fn parse_tz(tz: &str) -> chrono_tz::Tz {
    tz.parse::<chrono_tz::Tz>().unwrap_or(chrono_tz::UTC)
}

/// First `(hour, minute)` occurrence on one of `days` (in `tz`) strictly
/// after `after`. Scans at most 8 calendar days, which always covers a full
/// week regardless of which day `after` falls on.
pub fn next_fire_after(
    hour: u32,
    minute: u32,
    days: &[Weekday],
    tz: chrono_tz::Tz,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let local_after = after.with_timezone(&tz);
    for day_offset in 0..8i64 {
        let date = (local_after + chrono::Duration::days(day_offset)).date_naive();
        let weekday = Weekday::from_chrono(date.weekday());
        if !days.contains(&weekday) {
            continue;
        }
        let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
            continue;
        };
        let candidate = match tz.from_local_datetime(&naive) {
            chrono::LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            chrono::LocalResult::None => None,
        };
        if let Some(utc) = candidate {
            if utc > after {
                return Some(utc);
            }
        }
    }
    None
}

/// Today's scheduled instant in `tz`, whether or not it has already elapsed.
/// Used by missed-run recovery, which needs "what time was the user's job
/// supposed to fire today" rather than "the next one".
pub fn todays_instant(hour: u32, minute: u32, tz: chrono_tz::Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let local_now = now.with_timezone(&tz);
    let naive = local_now.date_naive().and_hms_opt(hour, minute, 0)?;
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        chrono::LocalResult::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn weekdays() -> Vec<Weekday> {
        vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ]
    }

    #[test]
    fn finds_next_occurrence_same_day() {
        // 2024-06-17 is a Monday.
        let after = Utc.with_ymd_and_hms(2024, 6, 17, 6, 0, 0).unwrap();
        let tz = parse_tz("UTC");
        let next = next_fire_after(9, 0, &weekdays(), tz, after).unwrap();
        assert_eq!(next.day(), 17);
        assert_eq!(next.hour(), 9);
    }

    #[test]
    fn skips_to_next_weekday_when_today_elapsed() {
        // 2024-06-17 Monday, already past 09:00 -> next is Tuesday.
        let after = Utc.with_ymd_and_hms(2024, 6, 17, 10, 0, 0).unwrap();
        let tz = parse_tz("UTC");
        let next = next_fire_after(9, 0, &weekdays(), tz, after).unwrap();
        assert_eq!(next.day(), 18);
    }

    #[test]
    fn skips_weekend() {
        // 2024-06-21 Friday past 09:00 -> next is Monday 2024-06-24.
        let after = Utc.with_ymd_and_hms(2024, 6, 21, 10, 0, 0).unwrap();
        let tz = parse_tz("UTC");
        let next = next_fire_after(9, 0, &weekdays(), tz, after).unwrap();
        assert_eq!(next.day(), 24);
    }

    #[test]
    fn respects_timezone_offset() {
        let after = Utc.with_ymd_and_hms(2024, 6, 17, 0, 0, 0).unwrap();
        let tz = parse_tz("Europe/Moscow");
        let next = next_fire_after(9, 0, &weekdays(), tz, after).unwrap();
        // 09:00 MSK (UTC+3) == 06:00 UTC.
        assert_eq!(next.hour(), 6);
    }

    #[test]
    fn todays_instant_is_stable_regardless_of_elapsed() {
        let now = Utc.with_ymd_and_hms(2024, 6, 17, 10, 30, 0).unwrap();
        let tz = parse_tz("UTC");
        let instant = todays_instant(9, 0, tz, now).unwrap();
        assert_eq!(instant.hour(), 9);
        assert_eq!(instant.day(), 17);
    }

    #[test]
    fn invalid_timezone_falls_back_to_utc() {
        assert_eq!(parse_tz("Not/AZone"), chrono_tz::UTC);
    }
}
