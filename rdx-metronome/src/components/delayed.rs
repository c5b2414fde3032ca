//! Defines the delayed-start metronome and the queue it enrols through.

use crate::common::EntryId;
use crate::components::entry::MetronomeEntry;
use crate::components::target::ScheduledTarget;
use crate::events::TimedEvent;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// A metronome waiting to join the recurring set of a specific run.
#[doc(hidden)]
pub(crate) struct Enrollment {
    pub id: EntryId,
    pub run_start: i64,
    pub entry: MetronomeEntry,
}

/// Enrolments raised by fired alarms, merged by the clock between ticks.
#[doc(hidden)]
#[derive(Clone, Default)]
pub(crate) struct EnrollmentQueue {
    pending: Arc<Mutex<Vec<Enrollment>>>,
}

impl EnrollmentQueue {
    pub(crate) fn push(&self, enrollment: Enrollment) {
        self.pending.lock().push(enrollment);
    }

    /// Takes every pending enrolment, leaving the queue empty.
    pub(crate) fn drain(&self) -> Vec<Enrollment> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub(crate) fn clear(&self) {
        self.pending.lock().clear();
    }
}

/// An alarm whose firing enrols a wrapped metronome for the rest of the run.
///
/// Registered only as an alarm. The enrolment is tagged with the start
/// instant carried by the alarm's event, so an alarm that straggles past
/// `stop()` cannot leak its metronome into a later run.
#[doc(hidden)]
pub(crate) struct DelayedMetronome {
    id: EntryId,
    wrapped: MetronomeEntry,
    queue: EnrollmentQueue,
}

impl DelayedMetronome {
    /// Creates a `DelayedMetronome`.
    pub(crate) fn new(id: EntryId, wrapped: MetronomeEntry, queue: EnrollmentQueue) -> Self {
        Self { id, wrapped, queue }
    }
}

impl ScheduledTarget for DelayedMetronome {
    fn on_alarm(&self, event: &TimedEvent) {
        debug!(id = ?self.id, "delayed metronome due, queueing enrolment");
        self.queue.push(Enrollment {
            id: self.id,
            run_start: event.start_instant(),
            entry: self.wrapped.clone(),
        });
    }
}
