//! Time handling for the ingestion pipeline
//!
//! Provides a clock abstraction so day-rollover and rate-limit logic can be
//! tested against a fixed clock, plus the calendar helpers the aggregation
//! engine needs:
//! - calendar day of a timestamp (day-rollover comparisons)
//! - ISO (year, week) bucketing (weekly rollups)
//! - ISO weekday (weekday-of-maximum tracking)
//!
//! All calendar math is UTC. Device timestamps arrive as epoch seconds and
//! day boundaries are taken at UTC midnight.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Weekday};

/// Timestamp in seconds since the Unix epoch.
pub type Timestamp = u64;

/// Source of "now" for the pipeline.
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp in epoch seconds.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source backed by the system clock.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};

        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Fixed time source for testing.
#[derive(Debug, Clone)]
pub struct FixedClock {
    timestamp: Timestamp,
}

impl FixedClock {
    /// Create a clock pinned at `timestamp`.
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp }
    }

    /// Move the clock to an absolute timestamp.
    pub fn set(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    /// Advance the clock by `secs` seconds.
    pub fn advance(&mut self, secs: u64) {
        self.timestamp += secs;
    }
}

impl TimeSource for FixedClock {
    fn now(&self) -> Timestamp {
        self.timestamp
    }
}

/// Calendar day (UTC) that a timestamp falls on.
pub fn date_of(ts: Timestamp) -> NaiveDate {
    DateTime::from_timestamp(ts as i64, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .date_naive()
}

/// ISO-8601 (year, week) bucket for a calendar day.
pub fn iso_week_of(date: NaiveDate) -> (i32, u32) {
    let week = date.iso_week();
    (week.year(), week.week())
}

/// ISO weekday number (Monday = 1 .. Sunday = 7).
pub fn iso_weekday(date: NaiveDate) -> u32 {
    date.weekday().number_from_monday()
}

/// ISO (year, week) immediately preceding the given one.
///
/// Walks back one week from the Monday of the given week, so year
/// boundaries (week 1 → week 52/53 of the prior year) come out right.
pub fn prev_iso_week(year: i32, week: u32) -> (i32, u32) {
    match NaiveDate::from_isoywd_opt(year, week, Weekday::Mon) {
        Some(monday) => iso_week_of(monday - Duration::days(7)),
        // Out-of-range input: fall back to a plain decrement
        None if week > 1 => (year, week - 1),
        None => (year - 1, 52),
    }
}

/// Epoch-second timestamp of UTC midnight for a calendar day.
pub fn day_start(date: NaiveDate) -> Timestamp {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp().max(0) as Timestamp)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fixed_clock_advances() {
        let mut clock = FixedClock::new(1000);
        assert_eq!(clock.now(), 1000);

        clock.advance(500);
        assert_eq!(clock.now(), 1500);
    }

    #[test]
    fn date_of_epoch_seconds() {
        // 2024-01-10 12:30:00 UTC
        let ts = day_start(date(2024, 1, 10)) + 12 * 3600 + 30 * 60;
        assert_eq!(date_of(ts), date(2024, 1, 10));

        // One second before midnight still belongs to the previous day
        assert_eq!(date_of(day_start(date(2024, 1, 11)) - 1), date(2024, 1, 10));
    }

    #[test]
    fn iso_week_bucketing() {
        // 2024-01-10 is a Wednesday in ISO week 2 of 2024
        assert_eq!(iso_week_of(date(2024, 1, 10)), (2024, 2));
        assert_eq!(iso_weekday(date(2024, 1, 10)), 3);

        // 2023-01-01 is a Sunday belonging to ISO week 52 of 2022
        assert_eq!(iso_week_of(date(2023, 1, 1)), (2022, 52));
    }

    #[test]
    fn prev_week_crosses_year_boundary() {
        assert_eq!(prev_iso_week(2024, 2), (2024, 1));
        // Week 1 of 2024 is preceded by week 52 of 2023
        assert_eq!(prev_iso_week(2024, 1), (2023, 52));
        // 2020 had 53 ISO weeks
        assert_eq!(prev_iso_week(2021, 1), (2020, 53));
    }
}
