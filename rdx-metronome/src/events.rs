//! Defines all public event types produced by the scheduler.
//!
//! [`TimedEvent`] is handed to every target callback. [`SchedulerEvent`] is
//! broadcast to subscribers and describes the scheduler's own lifecycle.

use crate::common::{EntryId, EntryKind};
use crate::time::TimeUnit;

/// The moment a scheduled callback fired, in absolute and start-relative terms.
///
/// Both magnitudes are nanoseconds on the crate's monotonic clock (see
/// [`crate::time::now_nanos`]). A fresh value is built for every firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimedEvent {
    event_time_nanos: i64,
    relative_time_nanos: i64,
}

impl TimedEvent {
    /// Creates an event from its absolute time and its time since scheduler start.
    pub const fn new(event_time_nanos: i64, relative_time_nanos: i64) -> Self {
        Self {
            event_time_nanos,
            relative_time_nanos,
        }
    }

    /// The monotonic time at which the event fired, in the given unit.
    pub fn event_time(&self, unit: TimeUnit) -> i64 {
        unit.from_nanos(self.event_time_nanos)
    }

    /// Time elapsed since the scheduler's start instant, in the given unit.
    pub fn relative_time(&self, unit: TimeUnit) -> i64 {
        unit.from_nanos(self.relative_time_nanos)
    }

    /// The start instant of the run this event belongs to, in nanoseconds.
    pub fn start_instant(&self) -> i64 {
        self.event_time_nanos - self.relative_time_nanos
    }
}

/// Events related to the lifecycle and registrations of a `Scheduler`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Fired on the first clock tick of a run, once the start instant is known.
    Started { start_instant: i64 },
    /// Fired when a run is torn down by `stop()`.
    Stopped { start_instant: i64 },
    /// Fired when a new registration is accepted.
    EntryAdded { id: EntryId, kind: EntryKind },
    /// Fired when a registration is removed with `unschedule`.
    EntryRemoved { id: EntryId },
    /// Fired when a delayed metronome joins the recurring set of the current run.
    MetronomeEnrolled { id: EntryId },
}
