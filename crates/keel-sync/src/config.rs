//! Realm and sync configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use keel_error::Result;
use keel_store::Group;
use keel_types::{Schema, SchemaMode};

use crate::session::SyncSession;
use crate::subscriptions::SubscriptionStore;

/// User-supplied function that declares the wanted data subset by
/// committing a subscription set.
pub type SubscriptionInitializer = Arc<dyn Fn(&SubscriptionStore) + Send + Sync>;

/// Factory the coordinator uses to (re)acquire a sync session for a config.
pub type SessionFactory = Arc<dyn Fn(&RealmConfig) -> Arc<dyn SyncSession> + Send + Sync>;

/// Shared migration callback carried by a config.
pub type ConfiguredMigration = Arc<dyn Fn(&mut Group, &mut Schema) -> Result<()> + Send + Sync>;

/// Sync-specific configuration.
#[derive(Clone)]
pub struct SyncConfig {
    /// Whether the realm uses flexible sync (query-based subscriptions).
    pub flexible_sync: bool,
    pub subscription_initializer: Option<SubscriptionInitializer>,
    /// Re-run the subscription initializer on the first open of each launch
    /// even when one has run before.
    pub rerun_init_subscription_on_open: bool,
    pub session_factory: SessionFactory,
}

impl SyncConfig {
    #[must_use]
    pub fn new(session_factory: SessionFactory) -> Self {
        Self {
            flexible_sync: false,
            subscription_initializer: None,
            rerun_init_subscription_on_open: false,
            session_factory,
        }
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("flexible_sync", &self.flexible_sync)
            .field(
                "has_subscription_initializer",
                &self.subscription_initializer.is_some(),
            )
            .field(
                "rerun_init_subscription_on_open",
                &self.rerun_init_subscription_on_open,
            )
            .finish_non_exhaustive()
    }
}

/// Everything needed to open a realm.
#[derive(Clone)]
pub struct RealmConfig {
    pub path: PathBuf,
    /// Declared schema; `None` means "whatever is on disk".
    pub schema: Option<Schema>,
    pub schema_version: u64,
    pub schema_mode: SchemaMode,
    pub migration_function: Option<ConfiguredMigration>,
    /// Forwarded to the storage engine when a migration converts a class to
    /// embedded: fix up incoming links automatically instead of erroring.
    pub automatically_handle_backlinks: bool,
    pub sync_config: Option<SyncConfig>,
}

impl RealmConfig {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            schema: None,
            schema_version: 0,
            schema_mode: SchemaMode::Automatic,
            migration_function: None,
            automatically_handle_backlinks: false,
            sync_config: None,
        }
    }
}

impl fmt::Debug for RealmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmConfig")
            .field("path", &self.path)
            .field("schema_version", &self.schema_version)
            .field("schema_mode", &self.schema_mode)
            .field("has_schema", &self.schema.is_some())
            .field("has_migration_function", &self.migration_function.is_some())
            .field("sync_config", &self.sync_config)
            .finish_non_exhaustive()
    }
}
