//! Free-slot computation.
//!
//! Turns a free/busy listing into the free time left inside a
//! [`WorkingWindow`], one entry per local calendar day.
//!
//! # Algorithm
//!
//! 1. Inverted intervals are clamped to zero length.
//! 2. Intervals crossing local midnight are split into per-day fragments.
//! 3. Fragments are grouped by the local date of their start.
//! 4. Each day's fragments are sorted and merged (touching intervals merge).
//! 5. A cursor walks from the start of the working window, emitting a slot
//!    for every gap before the next busy interval, clipped to the window.
//!
//! The engine is pure: it holds only the window and never fails.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

use crate::interval::{BusyInterval, DaySpan, FreeSlot, WorkingWindow};

/// Free slots keyed by local calendar date, in date order.
pub type DailyFreeSlots = BTreeMap<NaiveDate, Vec<FreeSlot>>;

/// Computes free time from busy intervals under a working-hours policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailabilityEngine {
    window: WorkingWindow,
}

impl AvailabilityEngine {
    /// Creates an engine for the given working window.
    pub fn new(window: WorkingWindow) -> Self {
        Self { window }
    }

    /// Returns the working window.
    pub fn window(&self) -> WorkingWindow {
        self.window
    }

    /// Computes free slots for every day that has busy time.
    ///
    /// Each day's working window is placed in the offset of the earliest
    /// interval of that day. Days without any interval do not appear; use
    /// [`compute_free_slots_in`](Self::compute_free_slots_in) to report on an
    /// explicit span.
    pub fn compute_free_slots(&self, busy: &[BusyInterval]) -> DailyFreeSlots {
        let mut by_day: BTreeMap<NaiveDate, Vec<BusyInterval>> = BTreeMap::new();
        for interval in busy {
            let offset = *interval.start.offset();
            for (date, fragment) in day_fragments(interval, &offset) {
                by_day.entry(date).or_default().push(fragment);
            }
        }

        by_day
            .into_iter()
            .filter_map(|(date, fragments)| {
                let merged = merge_intervals(fragments);
                let offset = *merged.first()?.start.offset();
                let (day_start, day_end) = self.window.bounds_at(date, offset)?;
                Some((date, walk_day(&merged, day_start, day_end, &offset)))
            })
            .collect()
    }

    /// Computes free slots for every day of `span`, in timezone `tz`.
    ///
    /// Intervals are first normalized into `tz`. Every day of the span gets an
    /// entry; a day without busy time yields the whole working window. Busy
    /// time on days outside the span is ignored.
    pub fn compute_free_slots_in<Tz: TimeZone>(
        &self,
        busy: &[BusyInterval],
        span: &DaySpan,
        tz: &Tz,
    ) -> DailyFreeSlots {
        let mut by_day: BTreeMap<NaiveDate, Vec<BusyInterval>> = BTreeMap::new();
        for interval in busy {
            for (date, fragment) in day_fragments(interval, tz) {
                if span.contains(date) {
                    by_day.entry(date).or_default().push(fragment);
                }
            }
        }

        span.days()
            .filter_map(|date| {
                let (day_start, day_end) = self.window.bounds_in(date, tz)?;
                let merged = merge_intervals(by_day.remove(&date).unwrap_or_default());
                Some((date, walk_day(&merged, day_start, day_end, tz)))
            })
            .collect()
    }
}

/// Sorts and merges overlapping or touching intervals.
///
/// Inverted intervals are clamped to zero length first. Merging an already
/// merged list returns it unchanged.
pub fn merge_intervals(mut intervals: Vec<BusyInterval>) -> Vec<BusyInterval> {
    intervals.sort_by_key(|i| (i.start, i.end));

    let mut merged: Vec<BusyInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals.into_iter().map(BusyInterval::clamped) {
        match merged.last_mut() {
            Some(current) if interval.start <= current.end => {
                if interval.end > current.end {
                    current.end = interval.end;
                }
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Splits an interval at local midnights of `tz`, tagging each piece with
/// its local date.
fn day_fragments<Tz: TimeZone>(
    interval: &BusyInterval,
    tz: &Tz,
) -> Vec<(NaiveDate, BusyInterval)> {
    let interval = interval.clamped();
    let end = interval.end.with_timezone(tz).fixed_offset();
    let mut start = interval.start.with_timezone(tz).fixed_offset();
    let mut fragments = Vec::new();

    loop {
        let date = start.with_timezone(tz).date_naive();
        let next_midnight = date
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|ndt| tz.from_local_datetime(&ndt).earliest())
            .map(|dt| dt.fixed_offset());

        match next_midnight {
            Some(midnight) if midnight < end => {
                fragments.push((date, BusyInterval::new(start, midnight)));
                start = midnight;
            }
            _ => {
                fragments.push((date, BusyInterval::new(start, end)));
                return fragments;
            }
        }
    }
}

/// Emits the gaps between merged busy intervals inside `[day_start, day_end)`.
fn walk_day<Tz: TimeZone>(
    merged: &[BusyInterval],
    day_start: DateTime<FixedOffset>,
    day_end: DateTime<FixedOffset>,
    tz: &Tz,
) -> Vec<FreeSlot> {
    let local = |dt: DateTime<FixedOffset>| dt.with_timezone(tz).fixed_offset();
    let mut cursor = day_start;
    let mut slots = Vec::new();

    for busy in merged {
        if busy.end <= day_start || busy.start >= day_end {
            continue;
        }
        let start = busy.start.max(day_start);
        let end = busy.end.min(day_end);
        if cursor < start {
            slots.push(FreeSlot::new(local(cursor), local(start)));
        }
        cursor = cursor.max(end);
    }

    if cursor < day_end {
        slots.push(FreeSlot::new(local(cursor), local(day_end)));
    }
    slots
}
