//! The capability every scheduled callback implements.

use crate::events::TimedEvent;
use std::sync::Arc;

/// A callback the scheduler can drive.
///
/// Both methods default to no-ops, so a type only implements the side it
/// cares about. Callbacks run on the scheduler's worker pool and take `&self`;
/// targets that need to mutate state use interior mutability.
pub trait ScheduledTarget: Send + Sync + 'static {
    /// Called once per period while the target is in the recurring set.
    fn on_tick(&self, _event: &TimedEvent) {}

    /// Called once per run when the target's alarm delay has elapsed.
    fn on_alarm(&self, _event: &TimedEvent) {}

    /// How far ahead of its nominal time this target wants to be called.
    ///
    /// Used to compensate for known output latency (audio buffers, decoder
    /// start-up). Alarms are pulled forward by the full amount; metronome
    /// firings by at most one period.
    fn call_ahead_nanos(&self) -> i64 {
        0
    }
}

/// A target shared between the registry and the worker pool.
pub type SharedTarget = Arc<dyn ScheduledTarget>;

/// A target that runs a closure on every tick.
pub struct TickFn<F>(F);

impl<F> ScheduledTarget for TickFn<F>
where
    F: Fn(&TimedEvent) + Send + Sync + 'static,
{
    fn on_tick(&self, event: &TimedEvent) {
        (self.0)(event)
    }
}

/// A target that runs a closure when its alarm fires.
pub struct AlarmFn<F>(F);

impl<F> ScheduledTarget for AlarmFn<F>
where
    F: Fn(&TimedEvent) + Send + Sync + 'static,
{
    fn on_alarm(&self, event: &TimedEvent) {
        (self.0)(event)
    }
}

/// Wraps a closure as a target that only reacts to ticks.
pub fn tick_fn(f: impl Fn(&TimedEvent) + Send + Sync + 'static) -> SharedTarget {
    Arc::new(TickFn(f))
}

/// Wraps a closure as a target that only reacts to its alarm.
pub fn alarm_fn(f: impl Fn(&TimedEvent) + Send + Sync + 'static) -> SharedTarget {
    Arc::new(AlarmFn(f))
}
