//! Resolves "today" in a user's own timezone.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// The calendar date at `now` in the given IANA timezone.
///
/// A missing or unknown timezone falls back to UTC.
pub fn local_date(timezone: Option<&str>, now: DateTime<Utc>) -> NaiveDate {
    match timezone.map(str::trim).filter(|tz| !tz.is_empty()) {
        None => now.date_naive(),
        Some(name) => match name.parse::<Tz>() {
            Ok(tz) => now.with_timezone(&tz).date_naive(),
            Err(_) => {
                warn!(timezone = %name, "Unknown timezone, using UTC");
                now.date_naive()
            }
        },
    }
}

pub fn is_valid_timezone(name: &str) -> bool {
    name.parse::<Tz>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn uses_utc_without_timezone() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        assert_eq!(local_date(None, now), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }

    #[test]
    fn shifts_to_the_users_calendar_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        assert_eq!(
            local_date(Some("Asia/Tokyo"), now),
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
        );
        assert_eq!(
            local_date(Some("America/Los_Angeles"), Utc.with_ymd_and_hms(2024, 3, 10, 3, 0, 0).unwrap()),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
        );
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        assert_eq!(local_date(Some("Mars/Olympus"), now), now.date_naive());
        assert!(!is_valid_timezone("Mars/Olympus"));
        assert!(is_valid_timezone("Europe/Rome"));
    }
}
