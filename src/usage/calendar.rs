//! Calendar-derived transfer budgets.
//!
//! The monthly cap is fixed by configuration; the daily cap grows linearly
//! through the month so early days are not throttled against a flat ceiling.

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};

/// Bytes in one GiB (`2^30`).
pub const BYTES_PER_GIB: u64 = 1 << 30;

/// A point in time expressed in the enforcement timezone.
///
/// Usage is bucketed by `(year, month, day)`; `hour` and `minute` are only
/// consulted for the resume window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountingDate {
    /// Calendar year.
    pub year: i32,
    /// Month of the year (1-12).
    pub month: u32,
    /// Day of the month (1-31).
    pub day: u32,
    /// Hour of the day (0-23).
    pub hour: u32,
    /// Minute of the hour (0-59).
    pub minute: u32,
}

impl AccountingDate {
    /// Shift a UTC instant into the accounting calendar at a fixed offset.
    pub fn from_utc(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = now.with_timezone(&offset);
        Self {
            year: local.year(),
            month: local.month(),
            day: local.day(),
            hour: local.hour(),
            minute: local.minute(),
        }
    }
}

/// Monthly and prorated daily caps for one accounting day, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budgets {
    /// Cap for the whole month.
    pub monthly_cap_bytes: u64,
    /// Share of the monthly cap available by the end of the current day.
    pub daily_cap_bytes: u64,
}

/// Gregorian leap-year rule.
pub fn is_leap_year(year: i32) -> bool {
    if year % 400 == 0 {
        true
    } else if year % 100 == 0 {
        false
    } else {
        year % 4 == 0
    }
}

/// Number of days in `month` of `year`.
///
/// Months outside 1-12 are treated as 31-day months; callers only pass
/// months produced by `chrono`.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 31,
    }
}

/// Compute the monthly cap and the prorated daily cap for `reference`.
///
/// `daily = monthly * day / days_in_month`, floored. The product is taken in
/// 128 bits so it cannot overflow for any `u32` cap.
pub fn compute_budgets(reference: &AccountingDate, monthly_cap_gib: u32) -> Budgets {
    let monthly_cap_bytes = u64::from(monthly_cap_gib).saturating_mul(BYTES_PER_GIB);
    let days = days_in_month(reference.year, reference.month);
    let day = reference.day.min(days);

    let prorated = u128::from(monthly_cap_bytes)
        .saturating_mul(u128::from(day))
        .checked_div(u128::from(days))
        .unwrap_or(0);
    let daily_cap_bytes = u64::try_from(prorated).unwrap_or(monthly_cap_bytes);

    Budgets {
        monthly_cap_bytes,
        daily_cap_bytes,
    }
}
