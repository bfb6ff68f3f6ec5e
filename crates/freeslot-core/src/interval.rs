//! Interval types for availability computation.
//!
//! - [`BusyInterval`]: an occupied span reported by a free/busy listing
//! - [`FreeSlot`]: a computed gap inside the working window
//! - [`WorkingWindow`]: the hours of a day considered schedulable
//! - [`DaySpan`]: an inclusive range of calendar dates to report on

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when constructing availability inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    /// Working window hours are out of range or not ordered.
    #[error("invalid working window {start}:00-{end}:00 (need 0 <= start < end <= 24)")]
    InvalidHours { start: u32, end: u32 },

    /// Date span ends before it starts.
    #[error("date span ends ({last}) before it starts ({first})")]
    InvertedSpan { first: NaiveDate, last: NaiveDate },

    /// Date span covers more days than allowed.
    #[error("date span of {days} days exceeds the maximum of {max}")]
    SpanTooLong { days: i64, max: i64 },

    /// An instant could not be parsed.
    #[error("invalid instant '{value}': {reason}")]
    InvalidInstant { value: String, reason: String },
}

/// A busy interval from a calendar's free/busy listing.
///
/// Both ends keep the UTC offset they were reported with. The interval is
/// half-open: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    /// Start of the busy period (inclusive).
    pub start: DateTime<FixedOffset>,
    /// End of the busy period (exclusive).
    pub end: DateTime<FixedOffset>,
}

impl BusyInterval {
    /// Creates a new busy interval.
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        Self { start, end }
    }

    /// Parses an interval from two RFC 3339 instants.
    pub fn parse(start: &str, end: &str) -> Result<Self, WindowError> {
        Ok(Self::new(parse_instant(start)?, parse_instant(end)?))
    }

    /// Returns true if the interval covers no time (including inverted input).
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Returns the interval with an inverted end clamped to its start.
    pub fn clamped(self) -> Self {
        if self.end < self.start {
            Self::new(self.start, self.start)
        } else {
            self
        }
    }

    /// Re-expresses both ends in the given timezone, keeping the instants.
    pub fn in_zone<Tz: TimeZone>(&self, tz: &Tz) -> Self {
        Self::new(
            self.start.with_timezone(tz).fixed_offset(),
            self.end.with_timezone(tz).fixed_offset(),
        )
    }
}

fn parse_instant(value: &str) -> Result<DateTime<FixedOffset>, WindowError> {
    DateTime::parse_from_rfc3339(value).map_err(|e| WindowError::InvalidInstant {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// A free slot inside the working window of one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSlot {
    /// Start of the free period (inclusive).
    pub start: DateTime<FixedOffset>,
    /// End of the free period (exclusive).
    pub end: DateTime<FixedOffset>,
    /// Whole minutes between start and end, rounded down.
    pub duration_minutes: i64,
}

impl FreeSlot {
    /// Creates a free slot, deriving the duration from the bounds.
    ///
    /// An inverted pair yields a zero duration rather than a negative one.
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        let duration_minutes = (end - start).num_seconds().max(0) / 60;
        Self {
            start,
            end,
            duration_minutes,
        }
    }

    /// Returns true if the slot is at least `minutes` long.
    pub fn fits(&self, minutes: i64) -> bool {
        self.duration_minutes >= minutes
    }
}

/// The schedulable hours of a calendar day, in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WindowHours")]
pub struct WorkingWindow {
    start_hour: u32,
    end_hour: u32,
}

impl WorkingWindow {
    /// Default first working hour.
    pub const DEFAULT_START_HOUR: u32 = 8;
    /// Default end of the working day.
    pub const DEFAULT_END_HOUR: u32 = 20;

    /// Creates a working window, validating `0 <= start < end <= 24`.
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self, WindowError> {
        if start_hour >= 24 || end_hour > 24 || start_hour >= end_hour {
            return Err(WindowError::InvalidHours {
                start: start_hour,
                end: end_hour,
            });
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    /// Returns the first working hour.
    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    /// Returns the hour at which the working day ends.
    pub fn end_hour(&self) -> u32 {
        self.end_hour
    }

    /// Returns `[day_start, day_end)` for `date` at a fixed offset.
    pub fn bounds_at(
        &self,
        date: NaiveDate,
        offset: FixedOffset,
    ) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        self.bounds_in(date, &offset)
    }

    /// Returns `[day_start, day_end)` for `date` in a timezone.
    ///
    /// Local times skipped by a DST transition resolve to `None`; ambiguous
    /// ones resolve to the earlier instant.
    pub fn bounds_in<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        tz: &Tz,
    ) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        let start = midnight + Duration::hours(i64::from(self.start_hour));
        let end = midnight + Duration::hours(i64::from(self.end_hour));
        let start = tz.from_local_datetime(&start).earliest()?.fixed_offset();
        let end = tz.from_local_datetime(&end).earliest()?.fixed_offset();
        Some((start, end))
    }
}

/// Unchecked wire form of a [`WorkingWindow`].
#[derive(Deserialize)]
struct WindowHours {
    start_hour: u32,
    end_hour: u32,
}

impl TryFrom<WindowHours> for WorkingWindow {
    type Error = WindowError;

    fn try_from(hours: WindowHours) -> Result<Self, Self::Error> {
        Self::new(hours.start_hour, hours.end_hour)
    }
}

impl Default for WorkingWindow {
    fn default() -> Self {
        Self {
            start_hour: Self::DEFAULT_START_HOUR,
            end_hour: Self::DEFAULT_END_HOUR,
        }
    }
}

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SpanDates")]
pub struct DaySpan {
    first: NaiveDate,
    last: NaiveDate,
}

#[derive(Deserialize)]
struct SpanDates {
    first: NaiveDate,
    last: NaiveDate,
}

impl TryFrom<SpanDates> for DaySpan {
    type Error = WindowError;

    fn try_from(dates: SpanDates) -> Result<Self, Self::Error> {
        Self::new(dates.first, dates.last)
    }
}

impl DaySpan {
    /// Maximum number of days a span may cover.
    pub const MAX_DAYS: i64 = 31;

    /// Creates a span covering a single date.
    pub fn single(date: NaiveDate) -> Self {
        Self {
            first: date,
            last: date,
        }
    }

    /// Creates a span covering `first..=last`.
    pub fn new(first: NaiveDate, last: NaiveDate) -> Result<Self, WindowError> {
        if last < first {
            return Err(WindowError::InvertedSpan { first, last });
        }
        let days = (last - first).num_days() + 1;
        if days > Self::MAX_DAYS {
            return Err(WindowError::SpanTooLong {
                days,
                max: Self::MAX_DAYS,
            });
        }
        Ok(Self { first, last })
    }

    /// Returns the first date of the span.
    pub fn first(&self) -> NaiveDate {
        self.first
    }

    /// Returns the last date of the span.
    pub fn last(&self) -> NaiveDate {
        self.last
    }

    /// Returns true if `date` is inside the span.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.first <= date && date <= self.last
    }

    /// Iterates over every date in the span.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.last;
        self.first.iter_days().take_while(move |d| *d <= last)
    }

    /// Returns `[start of first day, start of the day after last)` in `tz`.
    ///
    /// This is the query range for a free/busy request covering the span.
    pub fn instants_in<Tz: TimeZone>(
        &self,
        tz: &Tz,
    ) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        let start = tz
            .from_local_datetime(&self.first.and_hms_opt(0, 0, 0)?)
            .earliest()?;
        let end = tz
            .from_local_datetime(&self.last.succ_opt()?.and_hms_opt(0, 0, 0)?)
            .earliest()?;
        Some((start.fixed_offset(), end.fixed_offset()))
    }
}
