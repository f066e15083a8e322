//! The async-open orchestrator.
//!
//! Drives a sync session from "start" to a usable realm reference:
//!
//! ```text
//! Starting -> WaitingDownload -> (MaybeSchemaMigrate) -> (MaybeBootstrap)
//!          -> Completed | Cancelled | Failed
//! ```
//!
//! Continuations arrive on arbitrary transport threads. All mutable state
//! sits behind one mutex, every continuation re-checks "is the session
//! still set?" under that mutex as its first action, and the user callback
//! fires exactly once. `cancel` moves the session out under the lock and
//! force-closes it outside the lock: force-close synchronously flushes the
//! pending download continuation, which re-acquires the mutex.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use keel_error::{KeelError, Result};

use crate::coordinator::{RealmCoordinator, RealmRef};
use crate::migration::has_pending_migration;
use crate::session::{ProgressCallback, Status, SyncSession};
use crate::subscriptions::SubscriptionState;

/// Terminal continuation handed to [`AsyncOpenTask::start`]. Receives the
/// unbound realm reference on success.
pub type AsyncOpenCallback = Box<dyn FnOnce(Result<RealmRef>) + Send>;

struct TaskState {
    coordinator: Option<Arc<RealmCoordinator>>,
    session: Option<Arc<dyn SyncSession>>,
    registered_tokens: Vec<u64>,
}

/// One in-flight async open. Keeps itself alive across suspension points by
/// cloning its own `Arc` into every continuation.
pub struct AsyncOpenTask {
    state: Mutex<TaskState>,
    db_first_open: bool,
}

impl AsyncOpenTask {
    #[must_use]
    pub fn new(
        coordinator: Arc<RealmCoordinator>,
        session: Arc<dyn SyncSession>,
        db_first_open: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TaskState {
                coordinator: Some(coordinator),
                session: Some(session),
                registered_tokens: Vec::new(),
            }),
            db_first_open,
        })
    }

    /// Begin the open. No-op when the task was already cancelled.
    pub fn start(self: &Arc<Self>, callback: AsyncOpenCallback) {
        let session = {
            let state = self.state.lock();
            let Some(session) = state.session.clone() else {
                return;
            };
            session
        };

        let this = Arc::clone(self);
        session.wait_for_download_completion(Box::new(move |status: Status| {
            let coordinator = {
                let mut state = this.state.lock();
                if state.session.is_none() {
                    // Swallow all events if the task has been cancelled.
                    return;
                }
                // Hold on to the coordinator until the callback has run.
                state.coordinator.take()
            };
            let Some(coordinator) = coordinator else {
                return;
            };

            match status {
                Ok(()) => this.migrate_schema_or_complete(callback, coordinator),
                Err(err) => this.async_open_complete(callback, &coordinator, Err(err)),
            }
        }));
        session.revive_if_needed();
    }

    /// Abort the open. Any in-flight continuation becomes a no-op and the
    /// user callback is never invoked.
    pub fn cancel(&self) {
        let session = {
            let mut state = self.state.lock();
            if state.session.is_none() {
                return;
            }
            let tokens: Vec<_> = state.registered_tokens.drain(..).collect();
            if let Some(session) = state.session.as_ref() {
                for token in tokens {
                    session.unregister_progress_notifier(token);
                }
            }
            state.coordinator = None;
            state.session.take()
        };

        // The mutex must be released before force_close: closing the session
        // fires the pending download-completion continuation, which takes the
        // mutex again.
        if let Some(session) = session {
            debug!("cancelling async open, force-closing session");
            session.force_close();
        }
    }

    /// Register a download progress notifier, remembering the token so it is
    /// unregistered on completion or cancellation. Returns the inactive
    /// sentinel 0 when the session is already gone.
    pub fn register_download_progress_notifier(&self, callback: ProgressCallback) -> u64 {
        let mut state = self.state.lock();
        if let Some(session) = &state.session {
            let token = session.register_progress_notifier(callback);
            state.registered_tokens.push(token);
            token
        } else {
            0
        }
    }

    pub fn unregister_download_progress_notifier(&self, token: u64) {
        let state = self.state.lock();
        if let Some(session) = &state.session {
            session.unregister_progress_notifier(token);
        }
    }

    fn migrate_schema_or_complete(
        self: &Arc<Self>,
        callback: AsyncOpenCallback,
        coordinator: Arc<RealmCoordinator>,
    ) {
        let session = {
            let state = self.state.lock();
            let Some(session) = state.session.clone() else {
                return;
            };
            session
        };

        let pending_migration = match coordinator.begin_read(has_pending_migration) {
            Ok(pending) => pending,
            Err(err) => {
                self.async_open_complete(callback, &coordinator, Err(err));
                return;
            }
        };

        if !pending_migration {
            self.wait_for_bootstrap_or_complete(callback, coordinator, Ok(()));
            return;
        }

        // The subscriptions in the current file may not be compatible with
        // the new schema, so a migration needs an initializer to re-declare
        // the data subset.
        let lacks_initializer = !coordinator
            .config()
            .sync_config
            .as_ref()
            .is_some_and(|sync| sync.subscription_initializer.is_some());
        if lacks_initializer {
            let status = KeelError::SyncSchemaMigrationError {
                message: "Sync schema migrations must provide a subscription initializer \
                          callback in the sync config"
                    .to_owned(),
            };
            self.async_open_complete(callback, &coordinator, Err(status));
            return;
        }

        debug!("pending sync schema migration, uploading changes at the old schema version");
        let this = Arc::clone(self);
        let pause_session = Arc::clone(&session);
        session.wait_for_upload_completion(Box::new(move |status: Status| {
            {
                let state = this.state.lock();
                if state.session.is_none() {
                    return;
                }
            }
            if let Err(err) = status {
                this.async_open_complete(callback, &coordinator, Err(err));
                return;
            }

            let inner = Arc::clone(&this);
            pause_session.pause_async(Box::new(move |status: Status| {
                {
                    let state = inner.state.lock();
                    if state.session.is_none() {
                        return;
                    }
                }
                if let Err(err) = status {
                    inner.async_open_complete(callback, &coordinator, Err(err));
                    return;
                }

                // Delete the realm file and reopen it at the new schema.
                let reopened = inner.recreate_realm_file(&coordinator);
                match reopened {
                    Ok(new_coordinator) => {
                        inner.wait_for_bootstrap_or_complete(callback, new_coordinator, Ok(()));
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to recreate realm file for sync schema migration");
                        inner.async_open_complete(callback, &coordinator, Err(err));
                    }
                }
            }));
        }));
    }

    /// Drop the coordinator's hold on the file, delete it, and bring up a
    /// fresh coordinator and session for the same config.
    fn recreate_realm_file(
        &self,
        coordinator: &Arc<RealmCoordinator>,
    ) -> Result<Arc<RealmCoordinator>> {
        let mut state = self.state.lock();
        let config = coordinator.config().clone();
        coordinator.close();
        // The old session stays in place until the new one is ready, so an
        // error on any of these steps can still be delivered.
        std::fs::remove_file(&config.path)?;
        let new_coordinator = RealmCoordinator::get_coordinator(config);
        state.session = Some(new_coordinator.sync_session()?);
        Ok(new_coordinator)
    }

    fn wait_for_bootstrap_or_complete(
        self: &Arc<Self>,
        callback: AsyncOpenCallback,
        coordinator: Arc<RealmCoordinator>,
        status: Status,
    ) {
        let wants_bootstrap = status.is_ok()
            && coordinator.config().sync_config.as_ref().is_some_and(|sync| {
                sync.flexible_sync && sync.subscription_initializer.is_some()
            });
        if wants_bootstrap {
            let rerun_on_launch = coordinator
                .config()
                .sync_config
                .as_ref()
                .is_some_and(|sync| sync.rerun_init_subscription_on_open);
            self.attach_to_subscription_initializer(callback, coordinator, rerun_on_launch);
        } else {
            self.async_open_complete(callback, &coordinator, status);
        }
    }

    fn attach_to_subscription_initializer(
        self: &Arc<Self>,
        callback: AsyncOpenCallback,
        coordinator: Arc<RealmCoordinator>,
        rerun_on_launch: bool,
    ) {
        // Waiting on the latest committed subscription set is enough to know
        // that the set committed by the initializer has bootstrapped, both on
        // first creation and on a rerun-on-launch open.
        if let Err(err) = coordinator.get_realm(self.db_first_open) {
            self.async_open_complete(callback, &coordinator, Err(err));
            return;
        }
        let init_subscription = coordinator.subscription_store().latest();
        let sub_state = init_subscription.state();

        if sub_state != SubscriptionState::Complete || (self.db_first_open && rerun_on_launch) {
            debug!("waiting for subscription bootstrap to complete");
            let this = Arc::clone(self);
            init_subscription.on_state_change_to(SubscriptionState::Complete, move |status| {
                this.async_open_complete(callback, &coordinator, status);
            });
        } else {
            self.async_open_complete(callback, &coordinator, Ok(()));
        }
    }

    /// Deliver the terminal event: unregister notifiers, drop the session,
    /// and invoke the user callback exactly once.
    fn async_open_complete(
        &self,
        callback: AsyncOpenCallback,
        coordinator: &Arc<RealmCoordinator>,
        status: Status,
    ) {
        {
            let mut state = self.state.lock();
            // Cancel may have won the race just before the terminal event.
            if state.session.is_none() {
                return;
            }
            let tokens: Vec<_> = state.registered_tokens.drain(..).collect();
            if let Some(session) = state.session.as_ref() {
                for token in tokens {
                    session.unregister_progress_notifier(token);
                }
            }
            state.session = None;
        }

        match status {
            Ok(()) => callback(coordinator.get_unbound_realm()),
            Err(err) => callback(Err(err)),
        }
    }
}

impl std::fmt::Debug for AsyncOpenTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AsyncOpenTask")
            .field("cancelled", &state.session.is_none())
            .field("db_first_open", &self.db_first_open)
            .finish_non_exhaustive()
    }
}
