//! Time-of-day schedule math.
//! Parses "HH:MM" and finds the next local occurrence in a time zone.

use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Parse a 24h "HH:MM" time of day. Single-digit hours are accepted.
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let (hour, minute) = value.trim().split_once(':')?;
    if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
        return None;
    }
    if !hour.bytes().chain(minute.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)
}

/// Next instant strictly after `after` at which the local clock in `tz`
/// reads `time`.
///
/// Days on which `time` does not exist locally (DST gap) are skipped. When
/// `time` occurs twice (DST overlap) the earlier instant is used.
pub fn next_daily_run(time: NaiveTime, tz: Tz, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let today = after.with_timezone(&tz).date_naive();

    // Two days always suffice outside of a gap; a week bounds the search.
    for offset in 0..7 {
        let date = today.checked_add_days(Days::new(offset))?;
        let Some(local) = tz.from_local_datetime(&date.and_time(time)).earliest() else {
            continue;
        };
        let candidate = local.with_timezone(&Utc);
        if candidate > after {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(parse_time_of_day("03:30"), Some(hm(3, 30)));
        assert_eq!(parse_time_of_day("3:30"), Some(hm(3, 30)));
        assert_eq!(parse_time_of_day("23:59"), Some(hm(23, 59)));
        assert_eq!(parse_time_of_day("24:00"), None);
        assert_eq!(parse_time_of_day("12:60"), None);
        assert_eq!(parse_time_of_day("12:5"), None);
        assert_eq!(parse_time_of_day("+1:30"), None);
        assert_eq!(parse_time_of_day("noon"), None);
        assert_eq!(parse_time_of_day(""), None);
    }

    #[test]
    fn test_next_run_utc() {
        let tz = chrono_tz::UTC;
        assert_eq!(
            next_daily_run(hm(3, 30), tz, utc("2026-01-01T02:00:00Z")),
            Some(utc("2026-01-01T03:30:00Z"))
        );
        // Later the same day rolls over to tomorrow.
        assert_eq!(
            next_daily_run(hm(3, 30), tz, utc("2026-01-01T04:00:00Z")),
            Some(utc("2026-01-02T03:30:00Z"))
        );
        // Strictly after: exactly on time means tomorrow.
        assert_eq!(
            next_daily_run(hm(3, 30), tz, utc("2026-01-01T03:30:00Z")),
            Some(utc("2026-01-02T03:30:00Z"))
        );
    }

    #[test]
    fn test_next_run_in_zone() {
        let tz: Tz = "America/Los_Angeles".parse().unwrap();
        // PST is UTC-8 in January.
        assert_eq!(
            next_daily_run(hm(3, 30), tz, utc("2026-01-15T00:00:00Z")),
            Some(utc("2026-01-15T11:30:00Z"))
        );
        // 2026-01-15T20:00Z is 12:00 local, so the next 03:30 is tomorrow.
        assert_eq!(
            next_daily_run(hm(3, 30), tz, utc("2026-01-15T20:00:00Z")),
            Some(utc("2026-01-16T11:30:00Z"))
        );
    }

    #[test]
    fn test_next_run_skips_dst_gap() {
        let tz: Tz = "America/New_York".parse().unwrap();
        // 2026-03-08 02:30 does not exist in New York; the next valid day is
        // 2026-03-09 02:30 EDT (UTC-4).
        assert_eq!(
            next_daily_run(hm(2, 30), tz, utc("2026-03-08T05:00:00Z")),
            Some(utc("2026-03-09T06:30:00Z"))
        );
    }
}
