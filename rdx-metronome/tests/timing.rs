//! Real-time behaviour of the scheduler.
//!
//! These tests sleep on the wall clock, so their bounds leave room for a
//! busy host while still catching missed, doubled or mistimed firings.

use metronome::prelude::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

const MS: i64 = 1_000_000;

/// Records the relative time of every callback it receives.
#[derive(Default)]
struct Recorder {
    ticks: Mutex<Vec<i64>>,
    alarms: Mutex<Vec<i64>>,
    call_ahead: i64,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_call_ahead(nanos: i64) -> Arc<Self> {
        Arc::new(Self {
            call_ahead: nanos,
            ..Self::default()
        })
    }

    fn ticks(&self) -> Vec<i64> {
        self.ticks.lock().clone()
    }

    fn alarms(&self) -> Vec<i64> {
        self.alarms.lock().clone()
    }
}

impl ScheduledTarget for Recorder {
    fn on_tick(&self, event: &TimedEvent) {
        self.ticks.lock().push(event.relative_time(TimeUnit::Nanoseconds));
    }

    fn on_alarm(&self, event: &TimedEvent) {
        self.alarms.lock().push(event.relative_time(TimeUnit::Nanoseconds));
    }

    fn call_ahead_nanos(&self) -> i64 {
        self.call_ahead
    }
}

fn millis(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn assert_monotonic_from_zero(times: &[i64]) {
    assert!(times.iter().all(|t| *t >= 0), "negative relative time in {:?}", times);
    assert!(
        times.windows(2).all(|w| w[0] <= w[1]),
        "relative times went backwards: {:?}",
        times
    );
}

#[test]
fn metronome_ticks_once_per_period() {
    let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 5).unwrap();
    let recorder = Recorder::new();
    scheduler.schedule_recurring(recorder.clone());

    scheduler.start().unwrap();
    sleep(millis(1005));
    let start_instant = scheduler.stop();

    assert!(start_instant > 0);
    let ticks = recorder.ticks();
    assert!(
        (90..=102).contains(&ticks.len()),
        "expected about 100 ticks, got {}",
        ticks.len()
    );
    assert_monotonic_from_zero(&ticks);

    let on_grid = ticks
        .iter()
        .enumerate()
        .filter(|(i, t)| (**t - *i as i64 * 10 * MS).abs() < 10 * MS)
        .count();
    assert!(
        on_grid * 10 >= ticks.len() * 9,
        "only {} of {} ticks within one period of the grid",
        on_grid,
        ticks.len()
    );
}

#[test]
fn alarm_fires_exactly_once_at_its_delay() {
    let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 5).unwrap();
    let recorder = Recorder::new();
    scheduler.schedule_alarm_only(recorder.clone(), 300, TimeUnit::Milliseconds);

    scheduler.start().unwrap();
    sleep(millis(500));
    scheduler.stop();

    let alarms = recorder.alarms();
    assert_eq!(alarms.len(), 1);
    assert!(
        (280 * MS..=320 * MS).contains(&alarms[0]),
        "alarm fired at {}ms",
        alarms[0] / MS
    );
    assert!(recorder.ticks().is_empty());
}

#[test]
fn alarm_fires_once_per_run() {
    let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 2).unwrap();
    let recorder = Recorder::new();
    scheduler.schedule_alarm_only(recorder.clone(), 50, TimeUnit::Milliseconds);

    for run in 1..=2 {
        scheduler.start().unwrap();
        sleep(millis(200));
        scheduler.stop();
        assert_eq!(recorder.alarms().len(), run);
    }
}

#[test]
fn delayed_metronome_waits_then_ticks() {
    let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 5).unwrap();
    let recorder = Recorder::new();
    scheduler.schedule_delayed_recurring(recorder.clone(), 700, TimeUnit::Milliseconds);

    scheduler.start().unwrap();
    sleep(millis(1200));
    scheduler.stop();

    let ticks = recorder.ticks();
    assert!(recorder.alarms().is_empty());
    assert!(
        (40..=55).contains(&ticks.len()),
        "expected about 50 ticks, got {}",
        ticks.len()
    );
    assert!(
        (680 * MS..=730 * MS).contains(&ticks[0]),
        "first delayed tick at {}ms",
        ticks[0] / MS
    );
    assert_monotonic_from_zero(&ticks);

    let span = ticks[ticks.len() - 1] - ticks[0];
    let mean_gap = span / (ticks.len() as i64 - 1);
    assert!(
        (8 * MS..=12 * MS).contains(&mean_gap),
        "mean gap between ticks was {}ns",
        mean_gap
    );
}

#[test]
fn delayed_metronome_waits_again_on_restart() {
    let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 2).unwrap();
    let recorder = Recorder::new();
    scheduler.schedule_delayed_recurring(recorder.clone(), 200, TimeUnit::Milliseconds);

    scheduler.start().unwrap();
    sleep(millis(350));
    scheduler.stop();
    let first_run = recorder.ticks().len();
    assert!(first_run > 0);

    scheduler.start().unwrap();
    sleep(millis(100));
    assert_eq!(recorder.ticks().len(), first_run);
    sleep(millis(250));
    scheduler.stop();
    assert!(recorder.ticks().len() > first_run);
}

#[test]
fn saturated_pool_still_serves_every_target() {
    let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 1).unwrap();
    let slow = Arc::new(AtomicUsize::new(0));
    let fast = Recorder::new();

    let counter = slow.clone();
    scheduler.schedule_recurring(tick_fn(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        sleep(millis(4));
    }));
    scheduler.schedule_recurring(fast.clone());

    scheduler.start().unwrap();
    sleep(millis(500));
    scheduler.stop();

    assert!(slow.load(Ordering::SeqCst) > 10);
    assert!(fast.ticks().len() > 10);
}

#[test]
fn stop_is_idempotent_and_start_does_not_double_the_clock() {
    let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 2).unwrap();
    let recorder = Recorder::new();
    scheduler.schedule_recurring(recorder.clone());

    scheduler.start().unwrap();
    scheduler.start().unwrap();
    sleep(millis(505));

    let first = scheduler.stop();
    assert!(first > 0);
    assert_eq!(scheduler.stop(), 0);
    assert!(!scheduler.is_running());
    assert!(
        recorder.ticks().len() <= 52,
        "got {} ticks from what should be a single clock",
        recorder.ticks().len()
    );
}

#[test]
fn each_run_gets_a_fresh_start_instant() {
    let scheduler = Scheduler::new(5, TimeUnit::Milliseconds, 2).unwrap();

    scheduler.start().unwrap();
    sleep(millis(50));
    assert!(scheduler.start_instant().is_some());
    assert!(scheduler.started_at().is_some());
    let first = scheduler.stop();
    assert_eq!(scheduler.start_instant(), None);

    scheduler.start().unwrap();
    sleep(millis(50));
    let second = scheduler.stop();
    assert!(second > first);
}

#[test]
fn gated_start_waits_for_release() {
    let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 2).unwrap();
    let recorder = Recorder::new();
    scheduler.schedule_recurring(recorder.clone());
    let gate = StartGate::new();

    scheduler.start_gated(gate.clone()).unwrap();
    sleep(millis(100));
    assert!(recorder.ticks().is_empty());
    assert_eq!(scheduler.start_instant(), None);

    gate.release();
    sleep(millis(205));
    scheduler.stop();
    let ticks = recorder.ticks();
    assert!(
        (15..=21).contains(&ticks.len()),
        "expected about 20 ticks after release, got {}",
        ticks.len()
    );
    assert!(
        ticks[0] < 20 * MS,
        "first tick after release at {}ms",
        ticks[0] / MS
    );
}

#[test]
fn call_ahead_pulls_alarm_forward() {
    let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 2).unwrap();
    let recorder = Recorder::with_call_ahead(50 * MS);
    scheduler.schedule_alarm_only(recorder.clone(), 300, TimeUnit::Milliseconds);

    scheduler.start().unwrap();
    sleep(millis(400));
    scheduler.stop();

    let alarms = recorder.alarms();
    assert_eq!(alarms.len(), 1);
    assert!(
        (250 * MS..=280 * MS).contains(&alarms[0]),
        "alarm fired at {}ms",
        alarms[0] / MS
    );
}

#[test]
fn relative_times_never_precede_the_start_instant() {
    let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 4).unwrap();
    let ahead = Recorder::with_call_ahead(5 * MS);
    let negative = Recorder::new();
    scheduler.schedule_recurring(ahead.clone());
    scheduler.schedule_alarm_only(ahead.clone(), 0, TimeUnit::Milliseconds);
    scheduler.schedule_alarm_only(negative.clone(), -5, TimeUnit::Milliseconds);

    for _ in 0..3 {
        scheduler.start().unwrap();
        sleep(millis(100));
        scheduler.stop();
    }

    assert_eq!(ahead.alarms().len(), 3);
    assert_eq!(negative.alarms().len(), 3);
    assert!(!ahead.ticks().is_empty());
    for times in [ahead.ticks(), ahead.alarms(), negative.alarms()] {
        assert!(times.iter().all(|t| *t >= 0), "negative relative time in {:?}", times);
    }
}

#[test]
fn panicking_callback_does_not_stop_the_clock() {
    let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 2).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    scheduler.schedule_recurring(tick_fn(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("first tick fails");
        }
    }));

    scheduler.start().unwrap();
    sleep(millis(200));
    scheduler.stop();
    assert!(calls.load(Ordering::SeqCst) > 5);
}

#[test]
fn unscheduled_metronome_stops_ticking() {
    let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 2).unwrap();
    let kept = Recorder::new();
    let removed = Recorder::new();
    scheduler.schedule_recurring(kept.clone());
    let id = scheduler.schedule_recurring(removed.clone());

    scheduler.start().unwrap();
    sleep(millis(100));
    assert!(scheduler.unschedule(id));
    sleep(millis(20));
    let frozen = removed.ticks().len();
    sleep(millis(100));
    scheduler.stop();

    assert!(frozen > 0);
    assert_eq!(removed.ticks().len(), frozen);
    assert!(kept.ticks().len() > frozen);
}

#[test]
fn metronome_registered_while_running_joins_next_tick() {
    let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 2).unwrap();
    scheduler.start().unwrap();
    sleep(millis(50));

    let late = Recorder::new();
    scheduler.schedule_recurring(late.clone());
    sleep(millis(105));
    scheduler.stop();

    let ticks = late.ticks();
    assert!(ticks.len() >= 5, "got {} ticks", ticks.len());
    assert!(ticks[0] >= 40 * MS);
}

#[test]
fn lifecycle_events_carry_the_start_instant() {
    let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 2).unwrap();
    let mut events = scheduler.subscribe_events();
    let delayed = scheduler.schedule_delayed_recurring(Recorder::new(), 50, TimeUnit::Milliseconds);

    scheduler.start().unwrap();
    sleep(millis(150));
    let start_instant = scheduler.stop();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            SchedulerEvent::EntryAdded {
                id: delayed,
                kind: EntryKind::DelayedRecurring
            },
            SchedulerEvent::Started { start_instant },
            SchedulerEvent::MetronomeEnrolled { id: delayed },
            SchedulerEvent::Stopped { start_instant },
        ]
    );
}
