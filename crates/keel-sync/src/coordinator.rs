//! The realm coordinator: one per file path, owning the database handle and
//! the mode-aware schema engine that runs on open.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use keel_core::{
    apply_schema_changes, get_schema_version, schema_from_group, set_schema_keys,
    verify_compatible_for_immutable_and_readonly, verify_schema_version,
    verify_valid_additive_changes, NOT_VERSIONED,
};
use keel_error::{ErrorCode, KeelError, Result};
use keel_store::{Db, Group};
use keel_types::{Schema, SchemaMode};

use crate::config::RealmConfig;
use crate::session::SyncSession;
use crate::subscriptions::SubscriptionStore;

static REGISTRY: Mutex<BTreeMap<PathBuf, Weak<RealmCoordinator>>> = Mutex::new(BTreeMap::new());

/// Coordinates access to one realm file: the database handle, the bound
/// schema, the sync session, and the subscription store.
pub struct RealmCoordinator {
    config: RealmConfig,
    db: Mutex<Option<Arc<Mutex<Db>>>>,
    session: Mutex<Option<Arc<dyn SyncSession>>>,
    schema: Mutex<Option<Schema>>,
    subscriptions: SubscriptionStore,
}

impl RealmCoordinator {
    /// The live coordinator for `config.path`, created on first use.
    #[must_use]
    pub fn get_coordinator(config: RealmConfig) -> Arc<Self> {
        let mut registry = REGISTRY.lock();
        registry.retain(|_, weak| weak.strong_count() > 0);
        if let Some(existing) = registry.get(&config.path).and_then(Weak::upgrade) {
            return existing;
        }
        let coordinator = Arc::new(Self {
            db: Mutex::new(None),
            session: Mutex::new(None),
            schema: Mutex::new(None),
            subscriptions: SubscriptionStore::new(),
            config: config.clone(),
        });
        registry.insert(config.path, Arc::downgrade(&coordinator));
        coordinator
    }

    #[must_use]
    pub fn config(&self) -> &RealmConfig {
        &self.config
    }

    #[must_use]
    pub fn subscription_store(&self) -> &SubscriptionStore {
        &self.subscriptions
    }

    /// The sync session for this realm, created through the configured
    /// factory on first use.
    pub fn sync_session(&self) -> Result<Arc<dyn SyncSession>> {
        let mut guard = self.session.lock();
        if let Some(session) = &*guard {
            return Ok(Arc::clone(session));
        }
        let sync = self.config.sync_config.as_ref().ok_or_else(|| {
            KeelError::IllegalOperation {
                message: "Realm is not configured for sync.".to_owned(),
            }
        })?;
        let session = (*sync.session_factory)(&self.config);
        *guard = Some(Arc::clone(&session));
        Ok(session)
    }

    fn ensure_db(&self) -> Result<Arc<Mutex<Db>>> {
        let mut guard = self.db.lock();
        if let Some(db) = &*guard {
            return Ok(Arc::clone(db));
        }
        debug!(path = %self.config.path.display(), "opening realm file");
        let db = Arc::new(Mutex::new(Db::open(&self.config.path)?));
        *guard = Some(Arc::clone(&db));
        Ok(db)
    }

    /// Run a read-only closure against the group, opening the file if
    /// necessary. Does not apply the configured schema.
    pub fn begin_read<R>(&self, f: impl FnOnce(&Group) -> R) -> Result<R> {
        let db = self.ensure_db()?;
        let guard = db.lock();
        Ok(guard.read(f))
    }

    /// Open the realm: load the file, run the mode-aware schema engine, and
    /// run the subscription initializer when flexible sync asks for it.
    pub fn get_realm(self: &Arc<Self>, first_open: bool) -> Result<Realm> {
        let db = self.ensure_db()?;
        let bound = self.update_schema(&db)?;
        *self.schema.lock() = Some(bound.clone());
        self.run_subscription_initializer(first_open);
        Ok(Realm {
            coordinator: Arc::clone(self),
            db,
            schema: bound,
        })
    }

    /// Open the realm and hand back an unbound reference that any thread
    /// may later resolve.
    pub fn get_unbound_realm(self: &Arc<Self>) -> Result<RealmRef> {
        let db = self.ensure_db()?;
        let bound = self.update_schema(&db)?;
        *self.schema.lock() = Some(bound);
        Ok(RealmRef {
            coordinator: Arc::clone(self),
        })
    }

    /// Release the database handle and session so the file can be removed.
    /// The coordinator itself stays registered and reopens lazily.
    pub fn close(&self) {
        debug!(path = %self.config.path.display(), "closing coordinator");
        *self.session.lock() = None;
        *self.db.lock() = None;
        *self.schema.lock() = None;
    }

    /// The schema bound by the most recent open, if any.
    #[must_use]
    pub fn schema(&self) -> Option<Schema> {
        self.schema.lock().clone()
    }

    fn run_subscription_initializer(&self, first_open: bool) {
        let Some(sync) = &self.config.sync_config else {
            return;
        };
        if !sync.flexible_sync {
            return;
        }
        let Some(initializer) = &sync.subscription_initializer else {
            return;
        };
        if first_open || sync.rerun_init_subscription_on_open {
            debug!("running subscription initializer");
            (**initializer)(&self.subscriptions);
        }
    }

    fn update_schema(&self, db: &Arc<Mutex<Db>>) -> Result<Schema> {
        let mut db_guard = db.lock();
        let Some(declared) = &self.config.schema else {
            // No declared schema: take whatever the file holds.
            return Ok(db_guard.read(schema_from_group));
        };

        let mut target = declared.clone();
        target.validate()?;
        let mode = self.config.schema_mode;

        if mode == SchemaMode::HardResetFile {
            db_guard.wipe()?;
        }

        match self.apply_declared(&mut db_guard, &mut target) {
            Ok(()) => Ok(target),
            Err(err) if mode == SchemaMode::SoftResetFile && is_compatibility_error(&err) => {
                warn!(error = %err, "schema incompatible with file contents, resetting file");
                db_guard.wipe()?;
                let mut fresh = declared.clone();
                self.apply_declared(&mut db_guard, &mut fresh)?;
                Ok(fresh)
            }
            Err(err) => Err(err),
        }
    }

    /// The verifier-then-applicator engine for one open attempt.
    fn apply_declared(&self, db: &mut Db, target: &mut Schema) -> Result<()> {
        let mode = self.config.schema_mode;
        let target_version = self.config.schema_version;
        let handle_backlinks = self.config.automatically_handle_backlinks;
        let (stored, current) = db.read(|g| (get_schema_version(g), schema_from_group(g)));

        let must_equal = matches!(mode, SchemaMode::Immutable | SchemaMode::ReadOnly);
        verify_schema_version(stored, target_version, must_equal)?;

        let changes = current.compare(target, mode, false);

        match mode {
            SchemaMode::Immutable => {
                verify_compatible_for_immutable_and_readonly(&changes)?;
                db.read(|g| set_schema_keys(g, target));
                Ok(())
            }
            SchemaMode::ReadOnly => {
                if stored == NOT_VERSIONED {
                    db.write(|g| {
                        apply_schema_changes(
                            g,
                            stored,
                            target,
                            target_version,
                            mode,
                            &changes,
                            handle_backlinks,
                            None,
                            false,
                        )
                    })
                } else {
                    verify_compatible_for_immutable_and_readonly(&changes)?;
                    db.read(|g| set_schema_keys(g, target));
                    Ok(())
                }
            }
            SchemaMode::AdditiveDiscovered | SchemaMode::AdditiveExplicit => {
                let needs_write = verify_valid_additive_changes(&changes, true)?
                    || stored == NOT_VERSIONED
                    || stored < target_version;
                if !needs_write {
                    db.read(|g| set_schema_keys(g, target));
                    return Ok(());
                }
                db.write(|g| {
                    apply_schema_changes(
                        g,
                        stored,
                        target,
                        target_version,
                        mode,
                        &changes,
                        handle_backlinks,
                        None,
                        false,
                    )
                })
            }
            SchemaMode::Automatic
            | SchemaMode::SoftResetFile
            | SchemaMode::HardResetFile
            | SchemaMode::Manual => {
                let migration = self.config.migration_function.clone();
                db.write(|g| match &migration {
                    Some(configured) => {
                        let configured = Arc::clone(configured);
                        let mut callback =
                            move |g: &mut Group, s: &mut Schema| (*configured)(g, s);
                        apply_schema_changes(
                            g,
                            stored,
                            target,
                            target_version,
                            mode,
                            &changes,
                            handle_backlinks,
                            Some(&mut callback),
                            false,
                        )
                    }
                    None => apply_schema_changes(
                        g,
                        stored,
                        target,
                        target_version,
                        mode,
                        &changes,
                        handle_backlinks,
                        None,
                        false,
                    ),
                })
            }
        }
    }
}

impl std::fmt::Debug for RealmCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealmCoordinator")
            .field("path", &self.config.path)
            .finish_non_exhaustive()
    }
}

fn is_compatibility_error(err: &KeelError) -> bool {
    matches!(
        err.error_code(),
        ErrorCode::SchemaMismatch | ErrorCode::InvalidSchemaChange | ErrorCode::InvalidSchemaVersion
    )
}

/// An opened realm bound to its coordinator.
pub struct Realm {
    coordinator: Arc<RealmCoordinator>,
    db: Arc<Mutex<Db>>,
    schema: Schema,
}

impl Realm {
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn config(&self) -> &RealmConfig {
        self.coordinator.config()
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<RealmCoordinator> {
        &self.coordinator
    }

    pub fn read<R>(&self, f: impl FnOnce(&Group) -> R) -> R {
        self.db.lock().read(f)
    }

    /// Run a write transaction. Rejected for read-only schema modes.
    pub fn write<R>(&self, f: impl FnOnce(&mut Group) -> Result<R>) -> Result<R> {
        if matches!(
            self.config().schema_mode,
            SchemaMode::Immutable | SchemaMode::ReadOnly
        ) {
            return Err(KeelError::ReadOnly);
        }
        self.db.lock().write(f)
    }
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("path", &self.config().path)
            .finish_non_exhaustive()
    }
}

/// An unbound realm reference: resolvable into a [`Realm`] on any thread.
#[derive(Clone)]
pub struct RealmRef {
    coordinator: Arc<RealmCoordinator>,
}

impl RealmRef {
    pub fn resolve(&self) -> Result<Realm> {
        self.coordinator.get_realm(false)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.coordinator.config().path
    }
}

impl std::fmt::Debug for RealmRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealmRef")
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}
