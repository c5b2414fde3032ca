//! Contains common, primitive types shared across the scheduler.
//!
//! Registrations are identified by slotmap keys rather than by the identity
//! of the target they wrap, so the same target may be registered several
//! times and each registration can be removed on its own.

use slotmap::new_key_type;

new_key_type! {
    /// Uniquely and safely identifies a registration within a `Scheduler`.
    ///
    /// Keys are never reused, so a stale `EntryId` held after `unschedule`
    /// cannot accidentally remove a newer registration.
    pub struct EntryId;
}

/// The kind of registration an `EntryId` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Ticks every period from the first tick after `start()`.
    Recurring,
    /// Waits for an alarm, then ticks every period for the rest of the run.
    DelayedRecurring,
    /// Fires once per run.
    Alarm,
}
