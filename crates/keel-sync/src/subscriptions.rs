//! Flexible-sync subscription sets, as far as the bootstrap needs them.

use parking_lot::Mutex;
use std::sync::Arc;

use keel_error::KeelError;

use crate::session::Status;

/// Lifecycle of one committed subscription set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Committed locally, not yet acknowledged by the server.
    Pending,
    /// The server is streaming the matching data.
    Bootstrapping,
    /// All matching data has arrived.
    Complete,
    /// The server rejected the subscription set.
    Error,
}

struct SubscriptionSetInner {
    state: Mutex<SubscriptionState>,
    waiters: Mutex<Vec<(SubscriptionState, Box<dyn FnOnce(Status) + Send>)>>,
}

/// One subscription set. Cheap to clone; clones observe the same state.
#[derive(Clone)]
pub struct SubscriptionSet {
    inner: Arc<SubscriptionSetInner>,
}

impl SubscriptionSet {
    #[must_use]
    pub fn new(state: SubscriptionState) -> Self {
        Self {
            inner: Arc::new(SubscriptionSetInner {
                state: Mutex::new(state),
                waiters: Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        *self.inner.state.lock()
    }

    /// Invoke `callback` once the set reaches `target`.
    ///
    /// Fires immediately when the set is already in the target state, and
    /// with an error when the set is (or later enters) the error state.
    pub fn on_state_change_to(
        &self,
        target: SubscriptionState,
        callback: impl FnOnce(Status) + Send + 'static,
    ) {
        let current = self.state();
        if current == target {
            callback(Ok(()));
            return;
        }
        if current == SubscriptionState::Error {
            callback(Err(subscription_error()));
            return;
        }
        self.inner.waiters.lock().push((target, Box::new(callback)));
    }

    /// Transition the set, firing any waiting continuations. Called by the
    /// transport layer (or tests standing in for it).
    pub fn set_state(&self, state: SubscriptionState) {
        *self.inner.state.lock() = state;
        let waiters = std::mem::take(&mut *self.inner.waiters.lock());
        for (target, callback) in waiters {
            if target == state {
                callback(Ok(()));
            } else if state == SubscriptionState::Error {
                callback(Err(subscription_error()));
            } else {
                self.inner.waiters.lock().push((target, callback));
            }
        }
    }
}

impl std::fmt::Debug for SubscriptionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionSet")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn subscription_error() -> KeelError {
    KeelError::IllegalOperation {
        message: "The subscription set entered the error state.".to_owned(),
    }
}

/// Per-realm store of committed subscription sets. Only the latest set
/// matters for the bootstrap handshake.
pub struct SubscriptionStore {
    latest: Mutex<SubscriptionSet>,
}

impl SubscriptionStore {
    /// A fresh store holds an empty, already-complete subscription set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(SubscriptionSet::new(SubscriptionState::Complete)),
        }
    }

    /// The most recently committed subscription set.
    #[must_use]
    pub fn latest(&self) -> SubscriptionSet {
        self.latest.lock().clone()
    }

    /// Commit a new pending subscription set and return it.
    pub fn commit_new_set(&self) -> SubscriptionSet {
        let set = SubscriptionSet::new(SubscriptionState::Pending);
        *self.latest.lock() = set.clone();
        set
    }
}

impl Default for SubscriptionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn waiters_fire_on_matching_transition() {
        let set = SubscriptionSet::new(SubscriptionState::Pending);
        let fired = Arc::new(AtomicUsize::new(0));

        let observed = Arc::clone(&fired);
        set.on_state_change_to(SubscriptionState::Complete, move |status| {
            assert!(status.is_ok());
            observed.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        set.set_state(SubscriptionState::Bootstrapping);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        set.set_state(SubscriptionState::Complete);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn already_complete_sets_fire_immediately() {
        let set = SubscriptionSet::new(SubscriptionState::Complete);
        let fired = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&fired);
        set.on_state_change_to(SubscriptionState::Complete, move |status| {
            assert!(status.is_ok());
            observed.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn error_state_fails_waiters() {
        let set = SubscriptionSet::new(SubscriptionState::Pending);
        let fired = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&fired);
        set.on_state_change_to(SubscriptionState::Complete, move |status| {
            assert!(status.is_err());
            observed.fetch_add(1, Ordering::SeqCst);
        });
        set.set_state(SubscriptionState::Error);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn commit_new_set_replaces_latest() {
        let store = SubscriptionStore::new();
        assert_eq!(store.latest().state(), SubscriptionState::Complete);
        let committed = store.commit_new_set();
        assert_eq!(store.latest().state(), SubscriptionState::Pending);
        committed.set_state(SubscriptionState::Complete);
        assert_eq!(store.latest().state(), SubscriptionState::Complete);
    }
}
