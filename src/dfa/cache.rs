use std::collections::HashMap;
use std::sync::{
    Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::dfa::{
    state::{State, StateKey, StatePtr},
    workq::Workq,
};

/// The number of start-state table entries: {unanchored, anchored} crossed
/// with the four surrounding-context kinds.
pub(crate) const MAX_START: usize = 8;

/// Indices into the start table for unanchored searches. Add
/// `START_ANCHORED` for anchored searches.
pub(crate) const START_BEGIN_TEXT: usize = 0;
pub(crate) const START_BEGIN_LINE: usize = 2;
pub(crate) const START_AFTER_WORD_CHAR: usize = 4;
pub(crate) const START_AFTER_NON_WORD_CHAR: usize = 6;
pub(crate) const START_ANCHORED: usize = 1;

/// The mutable core of the DFA: the state intern pool, the start-state
/// table, the scratch work queues and the remaining memory budget.
///
/// Protected by the DFA's plain mutex. The mutex may only be acquired
/// while the cache epoch lock is held (in either mode), and must never be
/// held across an epoch lock upgrade.
pub(crate) struct CacheInner {
    /// All states computed so far, keyed by their identity. This map owns
    /// the only strong references to states; clearing it reclaims the
    /// whole state graph.
    pub(crate) states: HashMap<StateKey, Arc<State>>,
    /// Lazily computed start states, reset to None by a flush.
    pub(crate) starts: [Option<StatePtr>; MAX_START],
    /// Two pre-allocated work queues used while computing a transition.
    pub(crate) q0: Workq,
    pub(crate) q1: Workq,
    /// Pre-allocated stack for the epsilon closure.
    pub(crate) stack: Vec<u32>,
    /// Memory remaining for new states within the current epoch.
    pub(crate) state_budget: usize,
}

impl CacheInner {
    pub(crate) fn new(
        ninst: usize,
        maxmark: usize,
        state_budget: usize,
    ) -> CacheInner {
        CacheInner {
            states: HashMap::new(),
            starts: Default::default(),
            q0: Workq::new(ninst, maxmark),
            q1: Workq::new(ninst, maxmark),
            stack: Vec::with_capacity(ninst + maxmark),
            state_budget,
        }
    }

    /// The fixed scratch cost of this cache, in bytes: the work queues
    /// and the closure stack. Charged against the total budget at
    /// construction time.
    pub(crate) fn scratch_memory_usage(&self) -> usize {
        self.q0.memory_usage()
            + self.q1.memory_usage()
            + self.stack.capacity() * core::mem::size_of::<u32>()
    }

    /// Discard every interned state and start state, and reset the budget.
    /// The caller must hold the epoch lock for writing.
    pub(crate) fn reset(&mut self, state_budget: usize) {
        debug!(
            "flushing DFA cache: dropping {} states, restoring {} budget \
             bytes",
            self.states.len(),
            state_budget,
        );
        self.states.clear();
        self.starts = Default::default();
        self.state_budget = state_budget;
    }
}

impl core::fmt::Debug for CacheInner {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("CacheInner")
            .field("states", &self.states.len())
            .field("state_budget", &self.state_budget)
            .finish()
    }
}

/// A scoped guard over the cache epoch lock.
///
/// Constructed in read mode, which is how searches hold the lock for
/// their entire duration. `lock_for_writing` upgrades to write mode for a
/// cache flush. The upgrade is not atomic: the read lock is released
/// before the write lock is acquired, so any state references obtained
/// before the upgrade are invalid after it. Use a `StateSaver` to carry
/// state identities across.
///
/// Once upgraded, the guard stays in write mode until dropped.
pub(crate) struct RwLocker<'a> {
    lock: &'a RwLock<()>,
    read: Option<RwLockReadGuard<'a, ()>>,
    write: Option<RwLockWriteGuard<'a, ()>>,
}

impl<'a> RwLocker<'a> {
    pub(crate) fn read(lock: &'a RwLock<()>) -> RwLocker<'a> {
        let read = lock.read().unwrap_or_else(|e| e.into_inner());
        RwLocker { lock, read: Some(read), write: None }
    }

    /// If the lock is held for reading, release it and re-acquire it for
    /// writing. Subsequent calls are no-ops.
    pub(crate) fn lock_for_writing(&mut self) {
        if self.write.is_some() {
            return;
        }
        self.read = None;
        self.write =
            Some(self.lock.write().unwrap_or_else(|e| e.into_inner()));
    }

    #[cfg(test)]
    pub(crate) fn is_writing(&self) -> bool {
        self.write.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locker_upgrade_is_sticky() {
        let lock = RwLock::new(());
        let mut guard = RwLocker::read(&lock);
        assert!(!guard.is_writing());
        guard.lock_for_writing();
        assert!(guard.is_writing());
        guard.lock_for_writing();
        assert!(guard.is_writing());
        drop(guard);
        // The lock must be free again.
        assert!(lock.try_write().is_ok());
    }

    #[test]
    fn readers_coexist() {
        let lock = RwLock::new(());
        let g1 = RwLocker::read(&lock);
        let g2 = RwLocker::read(&lock);
        assert!(lock.try_write().is_err());
        drop(g1);
        drop(g2);
        assert!(lock.try_write().is_ok());
    }
}
