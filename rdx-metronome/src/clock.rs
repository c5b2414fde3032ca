//! The precision clock that decides what is due and hands it to the workers.
//!
//! The driver runs alone on a dedicated thread. It never executes a client
//! callback; each due firing becomes a task on the worker runtime that sleeps
//! until its deadline and then calls the target. A slow callback can therefore
//! delay other callbacks but never the clock's own cadence.

use crate::common::EntryId;
use crate::components::delayed::EnrollmentQueue;
use crate::components::entry::{AlarmEntry, MetronomeEntry};
use crate::events::SchedulerEvent;
use crate::registry::Registry;
use crate::time::{nanos_at, now_nanos};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Holds back the first tick of a run until released.
///
/// Pass a gate to `Scheduler::start_gated` to pay the start-up cost of the
/// clock thread and worker pool early, then fix the start instant at a
/// moment of the caller's choosing (for example, right after a display
/// buffer swap).
#[derive(Clone)]
pub struct StartGate {
    open: Arc<watch::Sender<bool>>,
}

impl StartGate {
    pub fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self {
            open: Arc::new(open),
        }
    }

    /// Lets the clock begin. Releasing twice has no further effect.
    pub fn release(&self) {
        self.open.send_replace(true);
    }

    pub fn is_released(&self) -> bool {
        *self.open.borrow()
    }

    pub(crate) async fn opened(&self) {
        let mut rx = self.open.subscribe();
        // The sender lives in `self`, so this only returns once released.
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared between a `Scheduler` handle and the clock of its current run.
#[doc(hidden)]
#[derive(Clone)]
pub(crate) struct ClockShared {
    pub registry: Arc<RwLock<Registry>>,
    pub enrollments: EnrollmentQueue,
    pub start_instant: Arc<AtomicI64>,
    pub started_at: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub event_sender: broadcast::Sender<SchedulerEvent>,
}

/// Drives one run of the scheduler.
#[doc(hidden)]
pub(crate) struct ClockDriver {
    shared: ClockShared,
    period: Duration,
    period_nanos: i64,
    workers: Handle,
    run_start: Option<(i64, Instant)>,
    enrolled: Vec<(EntryId, MetronomeEntry)>,
    tick_count: u64,
}

impl ClockDriver {
    pub(crate) fn new(shared: ClockShared, period_nanos: i64, workers: Handle) -> Self {
        Self {
            shared,
            period: Duration::from_nanos(period_nanos.unsigned_abs()),
            period_nanos,
            workers,
            run_start: None,
            enrolled: Vec::new(),
            tick_count: 0,
        }
    }

    /// Ticks at a fixed rate until a shutdown signal is received.
    ///
    /// The first tick fires immediately (or as soon as `gate` is released).
    /// Missed ticks are caught up in a burst, like a fixed-rate timer.
    pub(crate) async fn run(
        mut self,
        gate: Option<StartGate>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        if let Some(gate) = gate {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => return,
                _ = gate.opened() => {}
            }
        }

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                tick = ticker.tick() => self.on_tick(tick.into_std()),
            }
        }
        debug!("Clock stopped after {} ticks.", self.tick_count);
    }

    fn on_tick(&mut self, tick: Instant) {
        self.tick_count += 1;
        trace!("Tick #{} received.", self.tick_count);

        let (start, start_at) = match self.run_start {
            Some(run_start) => run_start,
            None => self.begin_run(tick),
        };
        self.merge_enrollments(start);

        let recurring = self.shared.registry.read().recurring_snapshot();
        let due = tick + self.period;
        for entry in recurring
            .iter()
            .chain(self.enrolled.iter().map(|(_, entry)| entry))
        {
            let lead = Duration::from_nanos(entry.lead_nanos(self.period_nanos).unsigned_abs());
            let deadline = metronome_deadline(due, lead, start_at);
            self.submit_metronome(entry.clone(), deadline, start);
        }
    }

    /// Fixes the start instant one period after the first tick and fans out
    /// every registered alarm relative to it.
    fn begin_run(&mut self, tick: Instant) -> (i64, Instant) {
        let start_at = tick + self.period;
        let start = nanos_at(tick).saturating_add(self.period_nanos);
        self.run_start = Some((start, start_at));
        self.shared.start_instant.store(start, Ordering::SeqCst);

        let until_start = chrono::Duration::nanoseconds(start - now_nanos());
        *self.shared.started_at.write() = Some(Utc::now() + until_start);
        self.shared
            .event_sender
            .send(SchedulerEvent::Started {
                start_instant: start,
            })
            .ok();

        let alarms = self.shared.registry.read().alarm_snapshot();
        debug!("Run starting at {}ns, fanning out {} alarms.", start, alarms.len());
        for alarm in alarms {
            self.submit_alarm(alarm, tick, start);
        }
        (start, start_at)
    }

    /// Moves alarms' pending metronomes into this run, dropping any raised by
    /// an earlier run or whose registration has since been removed.
    fn merge_enrollments(&mut self, start: i64) {
        let pending = self.shared.enrollments.drain();
        let registry = self.shared.registry.read();
        for enrollment in pending {
            if enrollment.run_start != start || !registry.contains(enrollment.id) {
                debug!(id = ?enrollment.id, "Discarding stale enrolment.");
                continue;
            }
            self.shared
                .event_sender
                .send(SchedulerEvent::MetronomeEnrolled { id: enrollment.id })
                .ok();
            self.enrolled.push((enrollment.id, enrollment.entry));
        }
        self.enrolled.retain(|(id, _)| registry.contains(*id));
    }

    fn submit_alarm(&self, alarm: AlarmEntry, tick: Instant, start: i64) {
        let offset = alarm.offset_from_first_tick(self.period_nanos);
        let deadline = tick + Duration::from_nanos(offset.unsigned_abs());
        self.workers.spawn(async move {
            tokio::time::sleep_until(deadline.into()).await;
            alarm.fire(start);
        });
    }

    fn submit_metronome(&self, entry: MetronomeEntry, deadline: Instant, start: i64) {
        self.workers.spawn(async move {
            tokio::time::sleep_until(deadline.into()).await;
            entry.fire(start);
        });
    }
}

/// When a metronome firing due at `due` should run, given its call-ahead.
///
/// Never earlier than the run's start instant, so the first tick of a run
/// cannot be delivered with a negative relative time.
fn metronome_deadline(due: Instant, lead: Duration, start_at: Instant) -> Instant {
    due.checked_sub(lead).unwrap_or(start_at).max(start_at)
}
