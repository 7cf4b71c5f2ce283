//! Reset policy.
//!
//! Calendar modes compare the current instant with the previous allocation's
//! timestamp, never with the token, so custom data embedded in the token cannot
//! interfere with calendar resets. The allocator continues a calendar sequence from
//! the highest number already issued in the window of `now` (see [`calendar_window`]).

use chrono::{DateTime, Datelike, FixedOffset, Months, NaiveDate, TimeZone, Utc};

use crate::domain::{CalendarWindow, ResetMode};

/// Decide whether the sequence restarts at the logic's starting number.
///
/// Only called when a previous allocation exists. Calendar parts of
/// `previous_created_at` are taken in the same offset as `now`.
#[must_use]
pub fn should_reset<Tz: TimeZone>(
    mode: ResetMode,
    previous_created_at: &DateTime<Utc>,
    now: &DateTime<Tz>,
    current_token: &str,
    previous_token: &str,
) -> bool {
    let previous = previous_created_at.with_timezone(&now.timezone());

    match mode {
        ResetMode::None => false,
        ResetMode::Yearly => now.year() != previous.year(),
        ResetMode::Monthly => now.year() != previous.year() || now.month() != previous.month(),
        ResetMode::Daily => now.date_naive() != previous.date_naive(),
        ResetMode::TokenBased => current_token != previous_token,
    }
}

/// The calendar period containing `now`, in the offset of `now`.
///
/// Returns `None` for non-calendar modes and for dates at the edge of the
/// representable range.
#[must_use]
pub fn calendar_window(mode: ResetMode, now: &DateTime<FixedOffset>) -> Option<CalendarWindow> {
    let today = now.date_naive();
    let (first, next) = match mode {
        ResetMode::Yearly => {
            let first = NaiveDate::from_ymd_opt(today.year(), 1, 1)?;
            (first, first.checked_add_months(Months::new(12))?)
        }
        ResetMode::Monthly => {
            let first = today.with_day(1)?;
            (first, first.checked_add_months(Months::new(1))?)
        }
        ResetMode::Daily => (today, today.succ_opt()?),
        ResetMode::None | ResetMode::TokenBased => return None,
    };

    let midnight = |date: NaiveDate| {
        date.and_hms_opt(0, 0, 0)?
            .and_local_timezone(*now.offset())
            .single()
            .map(|local| local.with_timezone(&Utc))
    };

    Some(CalendarWindow {
        start: midnight(first)?,
        end: midnight(next)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_none_never_resets() {
        let prev = at(2020, 1, 1, 0, 0);
        let now = at(2025, 6, 1, 0, 0);
        assert!(!should_reset(ResetMode::None, &prev, &now, "a", "b"));
    }

    #[test]
    fn test_yearly() {
        let prev = at(2025, 12, 31, 23, 59);
        assert!(should_reset(ResetMode::Yearly, &prev, &at(2026, 1, 1, 0, 0), "", ""));
        assert!(!should_reset(ResetMode::Yearly, &prev, &at(2025, 1, 1, 0, 0), "", ""));
    }

    #[test]
    fn test_monthly() {
        let prev = at(2025, 11, 30, 12, 0);
        assert!(should_reset(ResetMode::Monthly, &prev, &at(2025, 12, 1, 0, 0), "", ""));
        assert!(!should_reset(ResetMode::Monthly, &prev, &at(2025, 11, 30, 18, 0), "", ""));
        // Same month number, different year.
        assert!(should_reset(ResetMode::Monthly, &prev, &at(2026, 11, 2, 0, 0), "", ""));
    }

    #[test]
    fn test_daily() {
        let prev = at(2025, 11, 30, 23, 59);
        assert!(should_reset(ResetMode::Daily, &prev, &at(2025, 12, 1, 0, 0), "", ""));
        assert!(!should_reset(ResetMode::Daily, &prev, &at(2025, 11, 30, 0, 1), "", ""));
        // Same day-of-month in another month.
        assert!(should_reset(ResetMode::Daily, &prev, &at(2025, 10, 30, 12, 0), "", ""));
    }

    #[test]
    fn test_token_based() {
        let prev = at(2025, 1, 1, 0, 0);
        let now = at(2030, 1, 1, 0, 0);
        assert!(should_reset(ResetMode::TokenBased, &prev, &now, "OTHER", "ACME"));
        assert!(!should_reset(ResetMode::TokenBased, &prev, &now, "ACME", "ACME"));
    }

    #[test]
    fn test_calendar_modes_ignore_tokens() {
        let prev = at(2025, 11, 30, 8, 0);
        let now = at(2025, 11, 30, 9, 0);
        assert!(!should_reset(ResetMode::Daily, &prev, &now, "X", "Y"));
    }

    #[test]
    fn test_daily_uses_offset_of_now() {
        // 22:30 UTC on the 30th and 00:30 UTC on the 1st are the same day in UTC-3.
        let prev = at(2025, 11, 30, 22, 30);
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let now = at(2025, 12, 1, 0, 30).with_timezone(&offset);
        assert!(!should_reset(ResetMode::Daily, &prev, &now, "", ""));

        let now_utc = at(2025, 12, 1, 0, 30);
        assert!(should_reset(ResetMode::Daily, &prev, &now_utc, "", ""));
    }

    #[test]
    fn test_calendar_window_bounds() {
        let now = at(2025, 11, 12, 15, 0).with_timezone(&FixedOffset::east_opt(0).unwrap());

        let month = calendar_window(ResetMode::Monthly, &now).unwrap();
        assert_eq!((month.start, month.end), (at(2025, 11, 1, 0, 0), at(2025, 12, 1, 0, 0)));

        let year = calendar_window(ResetMode::Yearly, &now).unwrap();
        assert_eq!((year.start, year.end), (at(2025, 1, 1, 0, 0), at(2026, 1, 1, 0, 0)));

        let day = calendar_window(ResetMode::Daily, &now).unwrap();
        assert_eq!((day.start, day.end), (at(2025, 11, 12, 0, 0), at(2025, 11, 13, 0, 0)));

        assert!(calendar_window(ResetMode::None, &now).is_none());
        assert!(calendar_window(ResetMode::TokenBased, &now).is_none());
    }

    #[test]
    fn test_calendar_window_follows_offset() {
        // 01:00 UTC on Dec 1st is still November in UTC-3.
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let now = at(2025, 12, 1, 1, 0).with_timezone(&offset);

        let month = calendar_window(ResetMode::Monthly, &now).unwrap();
        assert_eq!(month.start, at(2025, 11, 1, 3, 0));
        assert_eq!(month.end, at(2025, 12, 1, 3, 0));
        assert!(month.contains(&at(2025, 12, 1, 1, 0)));
    }
}
