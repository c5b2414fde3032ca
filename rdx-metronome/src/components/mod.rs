//! Contains the building blocks the scheduler drives.
//!
//! This module provides the callback contract client code implements
//! (`target`), the registry entries that bind targets to the clock (`entry`),
//! and the delayed-start metronome that converts a one-shot alarm into a
//! recurring tick (`delayed`). The `Scheduler` manages collections of these
//! components to drive the application's logic.

pub mod delayed;
pub mod entry;
pub mod target;
