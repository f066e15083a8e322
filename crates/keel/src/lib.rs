//! Keel: an embedded object database.
//!
//! This crate re-exports the public surface of the keel workspace:
//!
//! - [`types`]: the schema data model and change classifier.
//! - [`store`]: the storage engine (`Group`, `Table`, `Db`).
//! - [`core`]: the schema-evolution core (verifiers, applicators, driver).
//! - [`sync`]: the realm coordinator and async-open orchestrator.
//!
//! The most commonly used items are re-exported at the root.

pub use keel_core as core;
pub use keel_error as error;
pub use keel_store as store;
pub use keel_sync as sync;
pub use keel_types as types;

pub use keel_core::{
    apply_schema_changes, get_schema_version, rename_property, schema_from_group, set_schema_keys,
    set_schema_version, NOT_VERSIONED,
};
pub use keel_error::{ErrorCode, KeelError, Result};
pub use keel_store::{Db, Group};
pub use keel_sync::{AsyncOpenTask, Realm, RealmConfig, RealmCoordinator, RealmRef, SyncConfig};
pub use keel_types::{
    needs_migration, BaseType, ObjectSchema, Property, PropertyType, Schema, SchemaChange,
    SchemaMode, TableType,
};
