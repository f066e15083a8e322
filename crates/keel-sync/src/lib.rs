//! Sync-facing realm lifecycle for keel.
//!
//! The centrepiece is [`AsyncOpenTask`], which drives a remote sync
//! handshake to a usable realm reference: download completion, an optional
//! schema-migration round-trip (upload, pause, delete-and-recreate file,
//! re-open), an optional subscription bootstrap, and finally the user
//! callback, invoked exactly once on whichever thread delivers the
//! terminal event.
//!
//! No async runtime is involved: continuations are plain callbacks invoked
//! by the transport on arbitrary threads, and all task state lives behind
//! one mutex.

pub mod async_open;
pub mod config;
pub mod coordinator;
pub mod migration;
pub mod session;
pub mod subscriptions;

pub use async_open::{AsyncOpenCallback, AsyncOpenTask};
pub use config::{RealmConfig, SessionFactory, SubscriptionInitializer, SyncConfig};
pub use coordinator::{Realm, RealmCoordinator, RealmRef};
pub use migration::{has_pending_migration, set_pending_migration};
pub use session::{CompletionCallback, ProgressCallback, Status, SyncSession};
pub use subscriptions::{SubscriptionSet, SubscriptionState, SubscriptionStore};
