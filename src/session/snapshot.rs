//! Snapshot cell - the single shared reference to a registry's current state
//!
//! Registries are immutable values. The process keeps exactly one cell per
//! registry type and swaps the whole `Arc` when a transition succeeds:
//!
//! ```text
//!   load() ──► Arc<old> ──transition (may await)──► new
//!                                                    │
//!   store(new) ◄─────────────────────────────────────┘   (single swap)
//! ```
//!
//! The lock only guards the pointer swap and is never held across an
//! `.await`. Readers always see either the old or the new snapshot.
//!
//! Two writers that load the same snapshot and both store will race: the
//! second store wins for the whole snapshot. Transitions that await should
//! therefore do their slow work first and then apply a small synchronous
//! change to whatever is current, with [`SnapshotCell::modify`] or
//! [`SnapshotCell::try_modify`].

use std::convert::Infallible;
use std::sync::{Arc, PoisonError, RwLock};

pub struct SnapshotCell<T> {
    current: RwLock<Arc<T>>,
}

impl<T> SnapshotCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Current snapshot (cheap `Arc` clone)
    pub fn load(&self) -> Arc<T> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Publish a new snapshot, returning the one it replaced
    pub fn store(&self, next: Arc<T>) -> Arc<T> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }

    /// Publish `next` only if `expected` is still the current snapshot
    ///
    /// Returns `false` (and publishes nothing) when another writer got there first.
    pub fn replace_if_current(&self, expected: &Arc<T>, next: Arc<T>) -> bool {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if Arc::ptr_eq(&guard, expected) {
            *guard = next;
            true
        } else {
            false
        }
    }

    /// Apply a synchronous transition, retrying if another writer swapped first
    ///
    /// Only for transitions that never await: the closure may run more than once.
    pub fn try_update<E>(&self, mut transition: impl FnMut(&T) -> Result<T, E>) -> Result<Arc<T>, E> {
        self.try_modify(|current| transition(current).map(Some))
    }

    /// Like [`try_update`](Self::try_update), but the transition may return
    /// `Ok(None)` to leave the current snapshot published as is
    pub fn try_modify<E>(
        &self,
        mut transition: impl FnMut(&T) -> Result<Option<T>, E>,
    ) -> Result<Arc<T>, E> {
        loop {
            let base = self.load();
            let Some(next) = transition(&base)? else {
                return Ok(base);
            };
            let next = Arc::new(next);
            if self.replace_if_current(&base, Arc::clone(&next)) {
                return Ok(next);
            }
        }
    }

    /// Infallible [`try_modify`](Self::try_modify)
    pub fn modify(&self, mut transition: impl FnMut(&T) -> Option<T>) -> Arc<T> {
        match self.try_modify(|current| Ok::<_, Infallible>(transition(current))) {
            Ok(next) => next,
            Err(never) => match never {},
        }
    }
}

impl<T: Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> std::fmt::Debug for SnapshotCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCell").finish_non_exhaustive()
    }
}
