//! Schema-evolution core of the keel object store.
//!
//! Given a target [`Schema`](keel_types::Schema) and a versioned group of
//! tables, this crate classifies the differences, verifies them against the
//! active [`SchemaMode`](keel_types::SchemaMode), and applies them, with
//! the user migration callback fenced between the pre- and post-migration
//! applicators. It also owns the metadata versioning contract, the
//! `class_` table-name codec, and data-preserving property renames.
//!
//! Everything operates inside a caller-owned write transaction; nothing
//! here commits or rolls back.

pub mod apply;
mod columns;
pub mod discovery;
pub mod metadata;
pub mod naming;
pub mod rename;
pub mod verify;

pub use apply::{
    apply_additive_changes, apply_non_migration_changes, apply_post_migration_changes,
    apply_pre_migration_changes, apply_schema_changes, create_initial_tables, MigrationFunction,
};
pub use discovery::{
    delete_data_for_object, is_empty, object_schema_from_table, schema_from_group, set_schema_keys,
};
pub use metadata::{create_metadata_tables, get_schema_version, set_schema_version, NOT_VERSIONED};
pub use naming::{
    object_type_for_table_name, table_key_for_object_type, table_name_for_object_type,
    OBJECT_TABLE_PREFIX,
};
pub use rename::rename_property;
pub use verify::{
    verify_compatible_for_immutable_and_readonly, verify_no_changes_required,
    verify_no_migration_required, verify_schema_version, verify_valid_additive_changes,
    verify_valid_external_changes, DEVELOPMENT_MODE_HINT,
};
