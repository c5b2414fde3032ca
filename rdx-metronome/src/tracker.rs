//! Onset bookkeeping for comparing what happened against what was scheduled.
//!
//! Playback code stamps the moment a stimulus actually began (a sound's
//! first buffer, an animation's first frame). After the run, the stamps are
//! read back as offsets from the start instant returned by
//! `Scheduler::stop`.

use crate::time::{now_nanos, TimeUnit};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Collects monotonic timestamps per label. Cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct TimeTracker {
    stamps: Arc<Mutex<HashMap<String, Vec<i64>>>>,
}

impl TimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current time under `label`.
    pub fn stamp(&self, label: &str) {
        self.stamp_at(label, now_nanos());
    }

    /// Records an already measured time under `label`.
    pub fn stamp_at(&self, label: &str, nanos: i64) {
        self.stamps
            .lock()
            .entry(label.to_string())
            .or_default()
            .push(nanos);
    }

    /// All stamps recorded under `label`, oldest first.
    pub fn stamps(&self, label: &str) -> Vec<i64> {
        self.stamps.lock().get(label).cloned().unwrap_or_default()
    }

    /// Stamps under `label` as offsets from `start_instant`, in `unit`.
    pub fn offsets(&self, label: &str, start_instant: i64, unit: TimeUnit) -> Vec<i64> {
        self.stamps(label)
            .into_iter()
            .map(|stamp| unit.from_nanos(stamp - start_instant))
            .collect()
    }

    /// Removes and returns the stamps recorded under `label`.
    pub fn take(&self, label: &str) -> Vec<i64> {
        self.stamps.lock().remove(label).unwrap_or_default()
    }

    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.stamps.lock().keys().cloned().collect();
        labels.sort();
        labels
    }
}
