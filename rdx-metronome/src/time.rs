//! Time units and the monotonic nanosecond clock shared by the whole crate.
//!
//! Every timestamp the scheduler hands out is an `i64` count of nanoseconds
//! measured from a process-wide epoch. The epoch is fixed the first time the
//! clock is read, so values are small, positive, and comparable across all
//! schedulers living in the same process.

use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Returns the instant all nanosecond timestamps are measured from.
pub fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// Fixes the epoch now if no clock read has done so yet.
pub fn init_epoch() {
    EPOCH.get_or_init(Instant::now);
}

/// Current monotonic time in nanoseconds since [`epoch`].
pub fn now_nanos() -> i64 {
    nanos_at(Instant::now())
}

/// Converts an `Instant` into nanoseconds since [`epoch`].
///
/// Instants taken before the epoch map to 0.
pub fn nanos_at(instant: Instant) -> i64 {
    let elapsed = instant.saturating_duration_since(epoch());
    i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX)
}

/// A unit of time used for delays, periods and event time conversions.
///
/// Conversions truncate toward zero when going to a coarser unit and
/// saturate at `i64::MIN`/`i64::MAX` when going to a finer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// How many nanoseconds one of this unit spans.
    pub const fn nanos_per_unit(self) -> i64 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => 1_000,
            TimeUnit::Milliseconds => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
            TimeUnit::Minutes => 60 * 1_000_000_000,
            TimeUnit::Hours => 60 * 60 * 1_000_000_000,
            TimeUnit::Days => 24 * 60 * 60 * 1_000_000_000,
        }
    }

    /// Converts `value`, expressed in this unit, to nanoseconds.
    pub fn to_nanos(self, value: i64) -> i64 {
        value.saturating_mul(self.nanos_per_unit())
    }

    /// Converts a nanosecond count into this unit.
    pub fn from_nanos(self, nanos: i64) -> i64 {
        nanos / self.nanos_per_unit()
    }

    /// Converts `value`, expressed in `source`, into this unit.
    pub fn convert(self, value: i64, source: TimeUnit) -> i64 {
        let from = source.nanos_per_unit();
        let to = self.nanos_per_unit();
        if from >= to {
            value.saturating_mul(from / to)
        } else {
            value / (to / from)
        }
    }
}
