//! Registry entries binding a target to the scheduler clock.

use crate::components::target::SharedTarget;
use crate::events::TimedEvent;
use crate::time::now_nanos;

/// Builds the event for a firing that happens now.
fn event_now(start_instant: i64) -> TimedEvent {
    let now = now_nanos();
    TimedEvent::new(now, now - start_instant)
}

/// A one-shot binding of a target to a fixed delay from scheduler start.
#[doc(hidden)]
#[derive(Clone)]
pub(crate) struct AlarmEntry {
    target: SharedTarget,
    delay_nanos: i64,
    settle_nanos: i64,
}

impl AlarmEntry {
    /// Creates an `AlarmEntry`. The target's call-ahead is subtracted here and
    /// the result is never earlier than the start instant.
    pub(crate) fn new(target: SharedTarget, delay_nanos: i64) -> Self {
        let delay_nanos = delay_nanos
            .saturating_sub(target.call_ahead_nanos())
            .max(0);
        Self {
            target,
            delay_nanos,
            settle_nanos: 0,
        }
    }

    /// Creates an alarm that fires `settle_nanos` ahead of its delay.
    ///
    /// Used for alarms that only hand work back to the clock, so they land
    /// between two ticks instead of racing one.
    pub(crate) fn settling(target: SharedTarget, delay_nanos: i64, settle_nanos: i64) -> Self {
        Self {
            settle_nanos: settle_nanos.max(0),
            ..Self::new(target, delay_nanos)
        }
    }

    /// Delay from the start instant, call-ahead already applied.
    pub(crate) fn delay_nanos(&self) -> i64 {
        self.delay_nanos
    }

    /// Offset of the firing from the first tick of a run, which is one
    /// period before the start instant.
    pub(crate) fn offset_from_first_tick(&self, period_nanos: i64) -> i64 {
        self.delay_nanos
            .saturating_add(period_nanos)
            .saturating_sub(self.settle_nanos)
            .max(0)
    }

    /// Delivers `on_alarm` to the target.
    pub(crate) fn fire(&self, start_instant: i64) {
        self.target.on_alarm(&event_now(start_instant));
    }
}

/// A recurring binding of a target, re-submitted every period.
#[doc(hidden)]
#[derive(Clone)]
pub(crate) struct MetronomeEntry {
    target: SharedTarget,
}

impl MetronomeEntry {
    /// Creates a `MetronomeEntry`.
    pub(crate) fn new(target: SharedTarget) -> Self {
        Self { target }
    }

    /// Lead time for a firing, capped at one period so a firing is never
    /// due before the tick that submits it.
    pub(crate) fn lead_nanos(&self, period_nanos: i64) -> i64 {
        self.target.call_ahead_nanos().clamp(0, period_nanos)
    }

    /// Delivers `on_tick` to the target.
    pub(crate) fn fire(&self, start_instant: i64) {
        self.target.on_tick(&event_now(start_instant));
    }
}
