//! The public façade that owns the registries and the run lifecycle.

use crate::clock::{ClockDriver, ClockShared, StartGate};
use crate::common::{EntryId, EntryKind};
use crate::components::delayed::{DelayedMetronome, EnrollmentQueue};
use crate::components::entry::{AlarmEntry, MetronomeEntry};
use crate::components::target::SharedTarget;
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::events::SchedulerEvent;
use crate::registry::Registry;
use crate::time::{self, TimeUnit};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Schedules callbacks at offsets relative to a lazily fixed start instant.
///
/// The scheduler is not meant for absolute scheduling. It aims for accurate
/// timing of events relative to one another, so set-up cost is paid up front
/// and the start instant is only fixed on the first clock tick after
/// [`start`](Scheduler::start).
///
/// Two tiers of threads are used. A single precision thread ticks every
/// update period and only decides what is due. A pool of
/// `concurrency_capacity` worker threads runs the callbacks. Registering more
/// targets than there are workers is accepted, but under load some callbacks
/// will fire late.
///
/// `Scheduler` is a cheap handle: clones share the same registries and run.
///
/// # Example
///
/// ```rust,no_run
/// use metronome::prelude::*;
///
/// let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 4)?;
/// scheduler.schedule_recurring(tick_fn(|event| {
///     println!("tick at {}ms", event.relative_time(TimeUnit::Milliseconds));
/// }));
/// scheduler.schedule_alarm_only(
///     alarm_fn(|event| println!("alarm at {}ms", event.relative_time(TimeUnit::Milliseconds))),
///     300,
///     TimeUnit::Milliseconds,
/// );
///
/// scheduler.start()?;
/// std::thread::sleep(std::time::Duration::from_secs(1));
/// let start_instant = scheduler.stop();
/// println!("run started at {start_instant}ns");
/// # Ok::<(), SchedulerError>(())
/// ```
#[derive(Clone)]
pub struct Scheduler {
    update_period_nanos: i64,
    concurrency_capacity: usize,
    shared: ClockShared,
    run: Arc<Mutex<Option<ActiveRun>>>,
    // Serialises start and stop; `run` itself is only held briefly.
    lifecycle: Arc<Mutex<()>>,
}

/// The threads and runtimes backing one `start()`/`stop()` cycle.
struct ActiveRun {
    shutdown_tx: broadcast::Sender<()>,
    clock_thread: Option<thread::JoinHandle<()>>,
    workers: Option<Runtime>,
}

impl ActiveRun {
    /// Stops the clock, then abandons whatever the workers are still running.
    fn teardown(&mut self) {
        if let Some(clock_thread) = self.clock_thread.take() {
            if self.shutdown_tx.send(()).is_err() {
                error!("Failed to signal the clock thread. It may have already exited.");
            }
            if clock_thread.join().is_err() {
                warn!("Clock thread panicked during the run.");
            }
        }
        if let Some(workers) = self.workers.take() {
            workers.shutdown_background();
        }
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.teardown();
    }
}

// Core implementation block for construction and lifecycle.
impl Scheduler {
    /// Creates a scheduler that ticks every `update_period` and runs
    /// callbacks on up to `concurrency_capacity` worker threads.
    pub fn new(
        update_period: i64,
        unit: TimeUnit,
        concurrency_capacity: usize,
    ) -> Result<Self, SchedulerError> {
        let update_period_nanos = unit.to_nanos(update_period);
        if update_period_nanos <= 0 {
            return Err(SchedulerError::InvalidPeriod(update_period_nanos));
        }
        if concurrency_capacity == 0 {
            return Err(SchedulerError::InvalidCapacity);
        }
        time::init_epoch();

        const CHANNEL_CAPACITY: usize = 64;
        let (event_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Ok(Self {
            update_period_nanos,
            concurrency_capacity,
            shared: ClockShared {
                registry: Arc::new(RwLock::new(Registry::default())),
                enrollments: EnrollmentQueue::default(),
                start_instant: Arc::new(AtomicI64::new(0)),
                started_at: Arc::new(RwLock::new(None)),
                event_sender,
            },
            run: Arc::new(Mutex::new(None)),
            lifecycle: Arc::new(Mutex::new(())),
        })
    }

    /// Creates a scheduler from a loaded [`SchedulerConfig`].
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let period = config.resolution.period_nanos()?;
        Self::new(period, TimeUnit::Nanoseconds, config.concurrency_capacity)
    }

    /// Loads a [`SchedulerConfig`] (see [`SchedulerConfig::load`]) and builds
    /// a scheduler from it.
    pub fn from_config_file(path: Option<&str>) -> Result<Self, SchedulerError> {
        let config = SchedulerConfig::load(path)?;
        debug!("Loaded configuration: {:?}", config);
        Self::from_config(&config)
    }

    /// Starts the scheduler. The first tick happens immediately.
    ///
    /// Calling `start` on a running scheduler does nothing.
    pub fn start(&self) -> Result<(), SchedulerError> {
        self.start_with(None)
    }

    /// Arms the scheduler but holds its first tick until `gate` is released.
    ///
    /// The clock thread and worker pool are created immediately, so the
    /// start-up overhead is already paid when the gate opens.
    pub fn start_gated(&self, gate: StartGate) -> Result<(), SchedulerError> {
        self.start_with(Some(gate))
    }

    fn start_with(&self, gate: Option<StartGate>) -> Result<(), SchedulerError> {
        let _lifecycle = self.lifecycle.lock();
        if self.run.lock().is_some() {
            debug!("Scheduler already running; start ignored.");
            return Ok(());
        }

        let workers = Builder::new_multi_thread()
            .worker_threads(self.concurrency_capacity)
            .thread_name("metronome-worker")
            .enable_time()
            .build()?;
        let clock_runtime = match Builder::new_current_thread().enable_time().build() {
            Ok(rt) => rt,
            Err(e) => {
                workers.shutdown_background();
                return Err(e.into());
            }
        };

        let (shutdown_tx, _) = broadcast::channel(1);
        let shutdown_rx = shutdown_tx.subscribe();
        let driver = ClockDriver::new(
            self.shared.clone(),
            self.update_period_nanos,
            workers.handle().clone(),
        );
        let spawned = thread::Builder::new()
            .name("metronome-clock".to_string())
            .spawn(move || clock_runtime.block_on(driver.run(gate, shutdown_rx)));
        let clock_thread = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                workers.shutdown_background();
                return Err(e.into());
            }
        };

        *self.run.lock() = Some(ActiveRun {
            shutdown_tx,
            clock_thread: Some(clock_thread),
            workers: Some(workers),
        });
        info!(
            "Scheduler started: period {}ns, {} workers.",
            self.update_period_nanos, self.concurrency_capacity
        );
        Ok(())
    }

    /// Stops the scheduler and returns the start instant used by the run.
    ///
    /// The clock is cancelled, the worker pool is shut down without waiting
    /// for in-flight callbacks, and the start instant is reset to 0. Returns
    /// 0 if the scheduler was not running or had not ticked yet.
    pub fn stop(&self) -> i64 {
        let _lifecycle = self.lifecycle.lock();
        let Some(mut active) = self.run.lock().take() else {
            return 0;
        };
        active.teardown();
        self.shared.enrollments.clear();

        let start_instant = self.shared.start_instant.swap(0, Ordering::SeqCst);
        *self.shared.started_at.write() = None;
        self.shared
            .event_sender
            .send(SchedulerEvent::Stopped { start_instant })
            .ok();
        info!("Scheduler stopped. Run start instant: {}ns.", start_instant);
        start_instant
    }
}

// Public registration and introspection API.
impl Scheduler {
    /// Registers `target` to receive `on_tick` every update period, starting
    /// with the first tick after `start()`.
    ///
    /// Registering while running is allowed; the target joins from the next
    /// tick.
    pub fn schedule_recurring(&self, target: SharedTarget) -> EntryId {
        let id = self
            .shared
            .registry
            .write()
            .add_recurring(MetronomeEntry::new(target));
        self.announce(id, EntryKind::Recurring);
        id
    }

    /// Registers `target` to start receiving `on_tick` once `delay` has
    /// elapsed from the start instant.
    ///
    /// Internally this is an alarm set two update periods early, which is the
    /// lead time the clock needs to enrol a metronome and deliver its first
    /// tick. The alarm itself runs half a period earlier still, so it always
    /// lands between two ticks and the first `on_tick` arrives one period
    /// before `delay`. Delays shorter than two periods fire on the first
    /// available tick. A non-positive delay is the same as
    /// [`schedule_recurring`].
    ///
    /// [`schedule_recurring`]: Scheduler::schedule_recurring
    pub fn schedule_delayed_recurring(
        &self,
        target: SharedTarget,
        delay: i64,
        unit: TimeUnit,
    ) -> EntryId {
        if delay <= 0 {
            return self.schedule_recurring(target);
        }
        let adjusted = self.delayed_alarm_nanos(unit.to_nanos(delay));
        let settle = self.update_period_nanos / 2;
        let queue = self.shared.enrollments.clone();
        let wrapped = MetronomeEntry::new(target);
        let id = self
            .shared
            .registry
            .write()
            .add_alarm(EntryKind::DelayedRecurring, move |id| {
                let target = Arc::new(DelayedMetronome::new(id, wrapped, queue));
                AlarmEntry::settling(target, adjusted, settle)
            });
        self.announce(id, EntryKind::DelayedRecurring);
        id
    }

    /// Registers `target` to receive `on_alarm` once per run, `delay` after
    /// the start instant.
    ///
    /// Alarms are fanned out on the first tick of a run, so one registered
    /// while running fires on the next run. A negative delay fires at the
    /// start instant.
    pub fn schedule_alarm_only(&self, target: SharedTarget, delay: i64, unit: TimeUnit) -> EntryId {
        let delay_nanos = unit.to_nanos(delay);
        if delay_nanos < 0 {
            debug!("Negative alarm delay of {}ns; firing at the start instant.", delay_nanos);
        }
        let delay_nanos = delay_nanos.max(0);
        let id = self
            .shared
            .registry
            .write()
            .add_alarm(EntryKind::Alarm, move |_| AlarmEntry::new(target, delay_nanos));
        self.announce(id, EntryKind::Alarm);
        id
    }

    /// Removes a registration. Returns `true` if it was found and removed.
    ///
    /// A removed metronome stops ticking from the next tick. An alarm that has
    /// already been handed to the workers for the current run still fires.
    pub fn unschedule(&self, id: EntryId) -> bool {
        let was_removed = self.shared.registry.write().remove(id);
        if was_removed {
            self.shared
                .event_sender
                .send(SchedulerEvent::EntryRemoved { id })
                .ok();
        }
        was_removed
    }

    /// Lists every current registration.
    pub fn entries(&self) -> Vec<(EntryId, EntryKind)> {
        self.shared.registry.read().entries()
    }

    /// Returns `true` between `start()` and `stop()`.
    pub fn is_running(&self) -> bool {
        self.run.lock().is_some()
    }

    /// The start instant of the current run, once its first tick has happened.
    pub fn start_instant(&self) -> Option<i64> {
        match self.shared.start_instant.load(Ordering::SeqCst) {
            0 => None,
            start => Some(start),
        }
    }

    /// Wall-clock estimate of the current run's start instant.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *self.shared.started_at.read()
    }

    /// The update period expressed in `unit`.
    pub fn update_period(&self, unit: TimeUnit) -> i64 {
        unit.from_nanos(self.update_period_nanos)
    }

    pub fn concurrency_capacity(&self) -> usize {
        self.concurrency_capacity
    }

    /// Subscribes to the `SchedulerEvent` stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.shared.event_sender.subscribe()
    }

    fn delayed_alarm_nanos(&self, delay_nanos: i64) -> i64 {
        let lead = self.update_period_nanos.saturating_mul(2);
        if delay_nanos < lead {
            debug!(
                "Delayed start of {}ns is under two periods; enrolling on the first tick.",
                delay_nanos
            );
        }
        delay_nanos.saturating_sub(lead).max(0)
    }

    fn announce(&self, id: EntryId, kind: EntryKind) {
        self.shared
            .event_sender
            .send(SchedulerEvent::EntryAdded { id, kind })
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::target::{alarm_fn, tick_fn};

    fn scheduler() -> Scheduler {
        Scheduler::new(10, TimeUnit::Milliseconds, 2).unwrap()
    }

    #[test]
    fn rejects_invalid_construction() {
        assert!(matches!(
            Scheduler::new(0, TimeUnit::Milliseconds, 1),
            Err(SchedulerError::InvalidPeriod(0))
        ));
        assert!(matches!(
            Scheduler::new(-5, TimeUnit::Nanoseconds, 1),
            Err(SchedulerError::InvalidPeriod(-5))
        ));
        assert!(matches!(
            Scheduler::new(10, TimeUnit::Milliseconds, 0),
            Err(SchedulerError::InvalidCapacity)
        ));
    }

    #[test]
    fn builds_from_config() {
        let scheduler = Scheduler::from_config(&SchedulerConfig::default()).unwrap();
        assert_eq!(scheduler.update_period(TimeUnit::Nanoseconds), 16_666_666);
        assert_eq!(scheduler.update_period(TimeUnit::Milliseconds), 16);
        assert_eq!(scheduler.concurrency_capacity(), 12);
    }

    #[test]
    fn delayed_recurring_is_an_alarm_two_periods_early() {
        let scheduler = scheduler();
        let id = scheduler.schedule_delayed_recurring(tick_fn(|_| {}), 700, TimeUnit::Milliseconds);

        let registry = scheduler.shared.registry.read();
        assert_eq!(registry.entries(), vec![(id, EntryKind::DelayedRecurring)]);
        let alarm = registry.alarm(id).unwrap();
        assert_eq!(alarm.delay_nanos(), 680_000_000);
        // 680ms + one period - half a period, clear of the 690ms tick.
        assert_eq!(alarm.offset_from_first_tick(10_000_000), 685_000_000);
        assert!(registry.recurring_snapshot().is_empty());
    }

    #[test]
    fn short_delayed_recurring_is_clamped_at_zero() {
        let scheduler = scheduler();
        let id = scheduler.schedule_delayed_recurring(tick_fn(|_| {}), 5, TimeUnit::Milliseconds);
        assert_eq!(scheduler.shared.registry.read().alarm(id).unwrap().delay_nanos(), 0);
    }

    #[test]
    fn non_positive_delay_registers_plain_metronome() {
        let scheduler = scheduler();
        let id = scheduler.schedule_delayed_recurring(tick_fn(|_| {}), 0, TimeUnit::Seconds);
        assert_eq!(scheduler.entries(), vec![(id, EntryKind::Recurring)]);
    }

    #[test]
    fn unschedule_removes_only_that_entry() {
        let scheduler = scheduler();
        let mut events = scheduler.subscribe_events();
        let tick = scheduler.schedule_recurring(tick_fn(|_| {}));
        let alarm = scheduler.schedule_alarm_only(alarm_fn(|_| {}), 1, TimeUnit::Seconds);

        assert!(scheduler.unschedule(tick));
        assert!(!scheduler.unschedule(tick));
        assert_eq!(scheduler.entries(), vec![(alarm, EntryKind::Alarm)]);

        assert_eq!(
            events.try_recv().unwrap(),
            SchedulerEvent::EntryAdded { id: tick, kind: EntryKind::Recurring }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SchedulerEvent::EntryAdded { id: alarm, kind: EntryKind::Alarm }
        );
        assert_eq!(events.try_recv().unwrap(), SchedulerEvent::EntryRemoved { id: tick });
    }

    #[test]
    fn negative_alarm_delay_is_floored_at_zero() {
        let scheduler = scheduler();
        let id = scheduler.schedule_alarm_only(alarm_fn(|_| {}), -5, TimeUnit::Milliseconds);
        assert_eq!(scheduler.shared.registry.read().alarm(id).unwrap().delay_nanos(), 0);
    }

    #[test]
    fn run_is_released_before_teardown_finishes() {
        let scheduler = scheduler();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let (handle, seen) = (scheduler.clone(), observed.clone());
        scheduler.schedule_recurring(tick_fn(move |_| {
            seen.lock().push(handle.is_running());
        }));

        scheduler.start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(100));
        let started = std::time::Instant::now();
        scheduler.stop();
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert!(observed.lock().iter().any(|running| *running));
    }

    #[test]
    fn stop_without_start_returns_sentinel() {
        let scheduler = scheduler();
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.stop(), 0);
        assert_eq!(scheduler.start_instant(), None);
        assert_eq!(scheduler.started_at(), None);
    }

    #[test]
    fn gated_run_has_no_start_instant_until_released() {
        let scheduler = scheduler();
        let gate = StartGate::new();
        scheduler.start_gated(gate.clone()).unwrap();
        assert!(scheduler.is_running());
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(scheduler.start_instant(), None);
        assert_eq!(scheduler.stop(), 0);
        assert!(!scheduler.is_running());
    }
}
