//! # Metronome
//!
//! A relative-time event scheduler for precisely offset stimulus playback.
//!
//! Metronome lets an application register periodic and one-shot callbacks
//! that fire at predictable offsets from one another and from a shared start
//! instant. The start instant is not known up front: it is fixed on the first
//! clock tick after the scheduler starts, once the start-up overhead has
//! already been paid.
//!
//! ## Core Concepts
//!
//! - **Precision clock**: A dedicated thread ticking at a fixed rate. It only
//!   decides what is due and never runs client code, so slow callbacks cannot
//!   disturb its cadence.
//! - **Worker pool**: A bounded set of threads that run the callbacks, each
//!   at its computed deadline.
//! - **Metronomes**: Targets that receive `on_tick` every period, optionally
//!   only after a delay.
//! - **Alarms**: Targets that receive `on_alarm` once per run.
//! - **Timed events**: Every callback gets a `TimedEvent` carrying both the
//!   absolute time and the time since the start instant.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use metronome::prelude::*;
//! use std::time::Duration;
//!
//! fn main() -> anyhow::Result<()> {
//!     // 1. Create a scheduler ticking every 10ms with 4 worker threads.
//!     let scheduler = Scheduler::new(10, TimeUnit::Milliseconds, 4)?;
//!
//!     // 2. Register targets before starting.
//!     scheduler.schedule_recurring(tick_fn(|event| {
//!         println!("frame at {}ms", event.relative_time(TimeUnit::Milliseconds));
//!     }));
//!     scheduler.schedule_alarm_only(
//!         alarm_fn(|_| println!("tone onset")),
//!         250,
//!         TimeUnit::Milliseconds,
//!     );
//!
//!     // 3. Run, then stop and keep the start instant for bookkeeping.
//!     scheduler.start()?;
//!     std::thread::sleep(Duration::from_secs(1));
//!     let start_instant = scheduler.stop();
//!     println!("run started at {}ns", start_instant);
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Metronome";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod clock;
pub mod common;
pub mod components;
pub mod config;
pub mod error;
pub mod events;
mod registry;
pub mod scheduler;
pub mod time;
pub mod tracker;

/// A prelude module for easy importing of the most common Metronome types.
pub mod prelude {
    pub use crate::clock::StartGate;
    pub use crate::common::{EntryId, EntryKind};
    pub use crate::components::target::{alarm_fn, tick_fn, ScheduledTarget, SharedTarget};
    pub use crate::config::{ClockResolution, SchedulerConfig};
    pub use crate::error::SchedulerError;
    pub use crate::events::{SchedulerEvent, TimedEvent};
    pub use crate::scheduler::Scheduler;
    pub use crate::time::TimeUnit;
    pub use crate::tracker::TimeTracker;
}
