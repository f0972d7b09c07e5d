//! Recurrence arithmetic. All timestamps are UTC.

use crate::domain::entities::Recurrence;
use chrono::{DateTime, Duration, Months, Utc};

/// Next run after `previous` for the given rule; `None` for `Once` (or on calendar overflow).
///
/// `Monthly` keeps the day of month and clamps to the last day of shorter months,
/// so Jan 31 rolls to Feb 28 (Feb 29 in leap years).
pub fn compute_next_run(previous: DateTime<Utc>, recurrence: Recurrence) -> Option<DateTime<Utc>> {
    match recurrence {
        Recurrence::Once => None,
        Recurrence::Daily => previous.checked_add_signed(Duration::hours(24)),
        Recurrence::Weekly => previous.checked_add_signed(Duration::days(7)),
        Recurrence::Monthly => previous.checked_add_months(Months::new(1)),
    }
}

/// First run strictly after `now`, stepping from `previous`.
/// Missed slots are skipped, not replayed.
pub fn next_run_after(
    previous: DateTime<Utc>,
    recurrence: Recurrence,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let mut next = compute_next_run(previous, recurrence)?;
    while next <= now {
        next = compute_next_run(next, recurrence)?;
    }
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_daily_is_exactly_24h() {
        // Around the EU DST switch; UTC arithmetic is unaffected.
        let t = utc(2024, 3, 30, 23);
        let next = compute_next_run(t, Recurrence::Daily).unwrap();
        assert_eq!(next - t, Duration::hours(24));
    }

    #[test]
    fn test_weekly() {
        let t = utc(2024, 1, 20, 12);
        assert_eq!(compute_next_run(t, Recurrence::Weekly), Some(utc(2024, 1, 27, 12)));
    }

    #[test]
    fn test_monthly_clamps_to_february() {
        assert_eq!(
            compute_next_run(utc(2023, 1, 31, 10), Recurrence::Monthly),
            Some(utc(2023, 2, 28, 10))
        );
        assert_eq!(
            compute_next_run(utc(2024, 1, 31, 10), Recurrence::Monthly),
            Some(utc(2024, 2, 29, 10))
        );
    }

    #[test]
    fn test_monthly_thirty_day_month_and_year_rollover() {
        assert_eq!(
            compute_next_run(utc(2024, 3, 31, 8), Recurrence::Monthly),
            Some(utc(2024, 4, 30, 8))
        );
        assert_eq!(
            compute_next_run(utc(2024, 12, 15, 8), Recurrence::Monthly),
            Some(utc(2025, 1, 15, 8))
        );
    }

    #[test]
    fn test_once_has_no_next_run() {
        assert_eq!(compute_next_run(utc(2024, 1, 16, 9), Recurrence::Once), None);
        assert_eq!(
            next_run_after(utc(2024, 1, 16, 9), Recurrence::Once, utc(2024, 1, 17, 0)),
            None
        );
    }

    #[test]
    fn test_next_run_after_skips_missed_slots() {
        let prev = utc(2024, 1, 15, 18);
        let now = utc(2024, 1, 18, 9);
        assert_eq!(
            next_run_after(prev, Recurrence::Daily, now),
            Some(utc(2024, 1, 18, 18))
        );
    }

    #[test]
    fn test_next_run_after_is_strictly_later() {
        let prev = utc(2024, 1, 15, 18);
        let next = next_run_after(prev, Recurrence::Daily, prev).unwrap();
        assert!(next > prev);
    }
}
