//! Core types: busy intervals, free slots, working windows, tracing
//!
//! The [`AvailabilityEngine`] is pure and holds no shared state, so one
//! instance can serve concurrent requests.

pub mod availability;
pub mod interval;
pub mod tracing;

pub use availability::{AvailabilityEngine, DailyFreeSlots, merge_intervals};
pub use interval::{BusyInterval, DaySpan, FreeSlot, WindowError, WorkingWindow};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
