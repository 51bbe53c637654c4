//! Logical-day arithmetic.
//!
//! Daily rollups are keyed by the calendar date of an instant in the user's
//! logical day. The day boundary is a fixed UTC offset, so every local
//! midnight maps to exactly one instant.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};

use crate::types::ValidationError;

/// Maps instants to calendar-day keys and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }
}

impl DayBoundary {
    /// Creates a boundary from an offset east of UTC, in minutes.
    pub fn from_utc_offset_minutes(minutes: i32) -> Result<Self, ValidationError> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(|offset| Self { offset })
            .ok_or(ValidationError::InvalidUtcOffset { minutes })
    }

    /// The calendar date `instant` falls on.
    #[must_use]
    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// The instant at which `day` begins.
    #[must_use]
    pub fn start_of(&self, day: NaiveDate) -> DateTime<Utc> {
        let local_midnight = day.and_time(NaiveTime::MIN);
        (local_midnight - Duration::seconds(i64::from(self.offset.local_minus_utc()))).and_utc()
    }

    /// The instant at which the day containing `instant` begins.
    #[must_use]
    pub fn start_of_day(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.start_of(self.day_of(instant))
    }

    /// The first instant strictly after `after` whose local wall-clock time is `at`.
    #[must_use]
    pub fn next_occurrence(&self, after: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
        let today = self.day_of(after);
        let candidate = self.start_of(today) + (at - NaiveTime::MIN);
        if candidate > after {
            candidate
        } else {
            candidate + Duration::days(1)
        }
    }
}

/// Formats a date as a `YYYY-MM-DD` key.
#[must_use]
pub fn format_day(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}
