use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use lingua_core::model::{LearnerId, Session};
use tokio::sync::Mutex as SlotMutex;

/// One learner's slot: empty, or holding the active session.
pub(crate) type Slot = Arc<SlotMutex<Option<Session>>>;

/// Process-wide table of active sessions, at most one per learner.
///
/// Each learner owns a slot guarded by an async mutex; whoever holds the slot
/// lock has exclusive access to that learner's session for the whole
/// operation, including any storage calls made while holding it. The outer
/// map lock only guards slot lookup and is never held across an `.await`, so
/// learners never wait on each other.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<LearnerId, Slot>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<LearnerId, Slot>> {
        // Slot bookkeeping stays consistent even if a holder panicked.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Slot for `learner`, created empty on first use.
    pub(crate) fn slot(&self, learner: LearnerId) -> Slot {
        Arc::clone(self.map().entry(learner).or_default())
    }

    /// Slot for `learner` if one has ever been created.
    pub(crate) fn existing_slot(&self, learner: LearnerId) -> Option<Slot> {
        self.map().get(&learner).map(Arc::clone)
    }

    /// Point-in-time copy of every slot, for sweeps.
    pub(crate) fn snapshot(&self) -> Vec<(LearnerId, Slot)> {
        self.map()
            .iter()
            .map(|(learner, slot)| (*learner, Arc::clone(slot)))
            .collect()
    }

    /// Drop slots that hold no session and are not in use; returns how many.
    pub fn prune(&self) -> usize {
        let mut map = self.map();
        let before = map.len();
        map.retain(|_, slot| {
            let unreferenced = Arc::strong_count(slot) == 1;
            let empty = slot.try_lock().is_ok_and(|guard| guard.is_none());
            !(unreferenced && empty)
        });
        before - map.len()
    }

    /// Number of learners with a live session.
    ///
    /// Slots locked by an in-flight operation count as active.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.map()
            .values()
            .filter(|slot| slot.try_lock().map_or(true, |guard| guard.is_some()))
            .count()
    }

    /// Number of slots currently tracked, live or empty.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.map().len()
    }
}
