use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Error, Result};

/// Parse a `YYYY-MM-DD` date string.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| Error::InvalidDate(format!("expected YYYY-MM-DD, got: {s}")))
}

/// Number of days in the inclusive window [since, until].
/// Zero when `until` precedes `since`.
pub fn days_in_window(since: NaiveDate, until: NaiveDate) -> u32 {
    if until < since {
        return 0;
    }
    ((until - since).num_days() + 1) as u32
}

/// The calendar date of a UTC instant in the given zone.
/// This is the bucket key stored alongside every entry.
pub fn local_date(ts: DateTime<Utc>, tz: Tz) -> NaiveDate {
    ts.with_timezone(&tz).date_naive()
}

/// Today's date in the given zone.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// Midday on `date` in the given zone, as a UTC instant.
/// Used when an entry is logged for a date rather than "now": midday keeps
/// the instant inside the intended local day across DST transitions.
pub fn midday_utc(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let local = date.and_hms_opt(12, 0, 0).expect("12:00:00 is valid");
    match tz.from_local_datetime(&local) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        chrono::LocalResult::None => Utc.from_utc_datetime(&local),
    }
}

/// Strip markdown code fences from LLM responses.
pub fn strip_code_fences(s: &str) -> &str {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else if let Some(rest) = s.strip_prefix("```") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2025-06-01").unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
        );
        assert!(parse_date("06/01/2025").is_err());
        assert!(parse_date("2025-13-01").is_err());
    }

    #[test]
    fn test_days_in_window() {
        let d1 = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let d3 = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();
        assert_eq!(days_in_window(d1, d3), 3);
        assert_eq!(days_in_window(d1, d1), 1);
        assert_eq!(days_in_window(d3, d1), 0);
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        // 03:00 UTC on June 2 is still June 1 in Los Angeles (UTC-7).
        let ts = Utc.with_ymd_and_hms(2025, 6, 2, 3, 0, 0).unwrap();
        assert_eq!(
            local_date(ts, chrono_tz::America::Los_Angeles),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
        );
        assert_eq!(
            local_date(ts, chrono_tz::UTC),
            NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
        );
    }

    #[test]
    fn test_midday_round_trips_to_same_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(); // US DST start
        let ts = midday_utc(date, chrono_tz::America::New_York);
        assert_eq!(local_date(ts, chrono_tz::America::New_York), date);
    }

    #[test]
    fn test_strip_code_fences_json() {
        assert_eq!(
            strip_code_fences("```json\n{\"key\": \"value\"}\n```"),
            "{\"key\": \"value\"}"
        );
    }

    #[test]
    fn test_strip_code_fences_plain() {
        assert_eq!(strip_code_fences("```\nhello\n```"), "hello");
    }

    #[test]
    fn test_strip_code_fences_none() {
        assert_eq!(strip_code_fences("  hello  "), "hello");
    }
}
