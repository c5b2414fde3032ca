//! The alarm and recurring registries behind a `Scheduler`.
//!
//! Both registries share one key space so an `EntryId` is unique across
//! them; the primary slotmap only records what kind of entry a key is.

use crate::common::{EntryId, EntryKind};
use crate::components::entry::{AlarmEntry, MetronomeEntry};
use slotmap::{SecondaryMap, SlotMap};

#[doc(hidden)]
#[derive(Default)]
pub(crate) struct Registry {
    kinds: SlotMap<EntryId, EntryKind>,
    alarms: SecondaryMap<EntryId, AlarmEntry>,
    recurring: SecondaryMap<EntryId, MetronomeEntry>,
}

impl Registry {
    pub(crate) fn add_recurring(&mut self, entry: MetronomeEntry) -> EntryId {
        let id = self.kinds.insert(EntryKind::Recurring);
        self.recurring.insert(id, entry);
        id
    }

    /// Adds an alarm whose entry may need to know its own key.
    pub(crate) fn add_alarm(
        &mut self,
        kind: EntryKind,
        build: impl FnOnce(EntryId) -> AlarmEntry,
    ) -> EntryId {
        let id = self.kinds.insert(kind);
        self.alarms.insert(id, build(id));
        id
    }

    /// Returns `true` if the entry was found and removed.
    pub(crate) fn remove(&mut self, id: EntryId) -> bool {
        if self.kinds.remove(id).is_none() {
            return false;
        }
        self.alarms.remove(id);
        self.recurring.remove(id);
        true
    }

    pub(crate) fn contains(&self, id: EntryId) -> bool {
        self.kinds.contains_key(id)
    }

    pub(crate) fn entries(&self) -> Vec<(EntryId, EntryKind)> {
        self.kinds.iter().map(|(id, kind)| (id, *kind)).collect()
    }

    /// Copies the alarm set so it can be iterated without holding the lock.
    pub(crate) fn alarm_snapshot(&self) -> Vec<AlarmEntry> {
        self.alarms.values().cloned().collect()
    }

    /// Copies the recurring set so it can be iterated without holding the lock.
    pub(crate) fn recurring_snapshot(&self) -> Vec<MetronomeEntry> {
        self.recurring.values().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn alarm(&self, id: EntryId) -> Option<&AlarmEntry> {
        self.alarms.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::target::{alarm_fn, tick_fn};

    #[test]
    fn keys_are_unique_across_both_sets() {
        let mut registry = Registry::default();
        let recurring = registry.add_recurring(MetronomeEntry::new(tick_fn(|_| {})));
        let alarm = registry.add_alarm(EntryKind::Alarm, |_| {
            AlarmEntry::new(alarm_fn(|_| {}), 1_000)
        });

        assert_ne!(recurring, alarm);
        assert_eq!(registry.recurring_snapshot().len(), 1);
        assert_eq!(registry.alarm_snapshot().len(), 1);
        assert_eq!(registry.entries().len(), 2);
    }

    #[test]
    fn removal_is_per_entry() {
        let mut registry = Registry::default();
        let a = registry.add_recurring(MetronomeEntry::new(tick_fn(|_| {})));
        let b = registry.add_recurring(MetronomeEntry::new(tick_fn(|_| {})));

        assert!(registry.remove(a));
        assert!(!registry.remove(a));
        assert!(!registry.contains(a));
        assert!(registry.contains(b));
        assert_eq!(registry.recurring_snapshot().len(), 1);
    }
}
