//! Clock & Session: UTC/NY conversion, trading-day and holiday
//! calendar, early-close handling, and pre-close windows.
//!
//! Generalized from a fixed UTC-5 offset to real `chrono-tz` conversion so
//! daylight saving transitions don't shift the 09:30/16:00 session boundary
//! by an hour for half the year.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use std::collections::HashSet;

/// Regular session: 09:30-16:00 America/New_York. Early-close sessions end
/// at `early_close_time` instead (default 13:00).
#[derive(Debug, Clone)]
pub struct Calendar {
    holidays: HashSet<NaiveDate>,
    early_closes: HashSet<NaiveDate>,
    early_close_time: NaiveTime,
    session_open: NaiveTime,
    session_close: NaiveTime,
}

impl Default for Calendar {
    fn default() -> Self {
        Self {
            holidays: default_holidays(),
            early_closes: default_early_closes(),
            early_close_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            session_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            session_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        }
    }
}

impl Calendar {
    pub fn new(holidays: HashSet<NaiveDate>, early_closes: HashSet<NaiveDate>) -> Self {
        Self {
            holidays,
            early_closes,
            ..Self::default()
        }
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday();
        if weekday == chrono::Weekday::Sat || weekday == chrono::Weekday::Sun {
            return false;
        }
        !self.holidays.contains(&date)
    }

    /// Session open/close for `date`, expressed in UTC. `None` if `date` is
    /// not a trading day.
    pub fn session_bounds(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if !self.is_trading_day(date) {
            return None;
        }
        let close_time = if self.early_closes.contains(&date) {
            self.early_close_time
        } else {
            self.session_close
        };
        let open_ny = New_York.from_local_datetime(&date.and_time(self.session_open)).single()?;
        let close_ny = New_York.from_local_datetime(&date.and_time(close_time)).single()?;
        Some((open_ny.with_timezone(&Utc), close_ny.with_timezone(&Utc)))
    }

    /// `true` iff `now` falls inside the regular (or early-close) session.
    pub fn is_market_hours(&self, now: DateTime<Utc>) -> bool {
        let date = now.with_timezone(&New_York).date_naive();
        match self.session_bounds(date) {
            Some((open, close)) => now >= open && now < close,
            None => false,
        }
    }

    /// Minutes remaining until today's session close, or `None` if the
    /// market is closed right now.
    pub fn minutes_until_close(&self, now: DateTime<Utc>) -> Option<i64> {
        let date = now.with_timezone(&New_York).date_naive();
        let (open, close) = self.session_bounds(date)?;
        if now < open || now >= close {
            return None;
        }
        Some((close - now).num_minutes())
    }
}

fn default_holidays() -> HashSet<NaiveDate> {
    const HOLIDAYS: &[(i32, u32, u32)] = &[
        (2023, 1, 2), (2023, 1, 16), (2023, 2, 20), (2023, 4, 7), (2023, 5, 29),
        (2023, 6, 19), (2023, 7, 4), (2023, 9, 4), (2023, 11, 23), (2023, 12, 25),
        (2024, 1, 1), (2024, 1, 15), (2024, 2, 19), (2024, 3, 29), (2024, 5, 27),
        (2024, 6, 19), (2024, 7, 4), (2024, 9, 2), (2024, 11, 28), (2024, 12, 25),
        (2025, 1, 1), (2025, 1, 20), (2025, 2, 17), (2025, 4, 18), (2025, 5, 26),
        (2025, 6, 19), (2025, 7, 4), (2025, 9, 1), (2025, 11, 27), (2025, 12, 25),
        (2026, 1, 1), (2026, 1, 19), (2026, 2, 16), (2026, 4, 3), (2026, 5, 25),
        (2026, 6, 19), (2026, 7, 3), (2026, 9, 7), (2026, 11, 26), (2026, 12, 25),
    ];
    HOLIDAYS
        .iter()
        .map(|(y, m, d)| NaiveDate::from_ymd_opt(*y, *m, *d).unwrap())
        .collect()
}

fn default_early_closes() -> HashSet<NaiveDate> {
    const EARLY_CLOSES: &[(i32, u32, u32)] = &[
        (2023, 7, 3), (2023, 11, 24), (2023, 12, 24),
        (2024, 7, 3), (2024, 11, 29), (2024, 12, 24),
        (2025, 7, 3), (2025, 11, 28), (2025, 12, 24),
        (2026, 11, 27), (2026, 12, 24),
    ];
    EARLY_CLOSES
        .iter()
        .map(|(y, m, d)| NaiveDate::from_ymd_opt(*y, *m, *d).unwrap())
        .collect()
}
