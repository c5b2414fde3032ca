use anyhow::Result;
use colored::Colorize;
use metronome::prelude::*;
use metronome::{ENGINE_NAME, VERSION};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    println!("{} v{}", ENGINE_NAME.cyan().bold(), VERSION);

    // 2. Load the configuration. The first argument, if any, is a TOML file.
    let path = std::env::args().nth(1);
    let config = SchedulerConfig::load(path.as_deref())?;
    info!("Loaded configuration: {:?}", config);

    // 3. Create the scheduler.
    let scheduler = Scheduler::from_config(&config)?;
    let tracker = TimeTracker::new();

    // 4. Spawn a task that listens to the lifecycle stream.
    spawn_event_listener(&scheduler);

    // 5. Register demo targets.
    register_demo_targets(&scheduler, &tracker);

    // 6. Run until Ctrl+C.
    scheduler.start()?;
    info!("{} running. Press Ctrl+C to stop.", ENGINE_NAME);
    tokio::signal::ctrl_c().await?;

    let start_instant = scheduler.stop();
    info!("Run start instant: {}ns", start_instant);
    for label in tracker.labels() {
        let offsets = tracker.offsets(&label, start_instant, TimeUnit::Milliseconds);
        info!("[ONSET] {} => {:?} ms", label, offsets);
    }
    Ok(())
}

/// Spawns a task that logs every `SchedulerEvent`.
fn spawn_event_listener(scheduler: &Scheduler) {
    let mut events = scheduler.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("[SCHEDULER] => {:?}", event);
        }
    });
}

/// Registers a metronome, an alarm and a delayed metronome.
fn register_demo_targets(scheduler: &Scheduler, tracker: &TimeTracker) {
    let per_second = (1_000 / scheduler.update_period(TimeUnit::Milliseconds).max(1)).max(1) as u64;

    // --- A metronome that reports once per second ---
    let ticks = Arc::new(AtomicU64::new(0));
    scheduler.schedule_recurring(tick_fn(move |event| {
        let count = ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if count % per_second == 0 {
            info!(
                "[METRONOME] Tick #{} at {}ms",
                count,
                event.relative_time(TimeUnit::Milliseconds)
            );
        }
    }));

    // --- A one-shot alarm after three seconds ---
    let onsets = tracker.clone();
    scheduler.schedule_alarm_only(
        alarm_fn(move |event| {
            onsets.stamp_at("alarm", event.event_time(TimeUnit::Nanoseconds));
            info!(
                "[ALARM] Fired at {}ms",
                event.relative_time(TimeUnit::Milliseconds)
            );
        }),
        3,
        TimeUnit::Seconds,
    );

    // --- A metronome that only starts after five seconds ---
    let delayed_ticks = Arc::new(AtomicU64::new(0));
    let onsets = tracker.clone();
    scheduler.schedule_delayed_recurring(
        tick_fn(move |event| {
            let count = delayed_ticks.fetch_add(1, Ordering::Relaxed);
            if count == 0 {
                onsets.stamp_at("delayed", event.event_time(TimeUnit::Nanoseconds));
            }
            if count % per_second == 0 {
                info!(
                    "[DELAYED] Tick #{} at {}ms",
                    count + 1,
                    event.relative_time(TimeUnit::Milliseconds)
                );
            }
        }),
        5,
        TimeUnit::Seconds,
    );
}
