//! The applicator pipeline: executing a change sequence against storage.
//!
//! Five applicators exist, each an exhaustive match over every change
//! variant. All of them run inside the caller's write transaction and never
//! commit; on failure the surrounding transaction is rolled back by the
//! caller.

use std::time::Instant;

use keel_error::{KeelError, Result};
use keel_store::Group;
use keel_types::{Schema, SchemaChange, SchemaMode};
use tracing::debug;

use crate::columns::{
    add_column, add_initial_columns, create_table, make_property_optional, make_property_required,
    replace_column, set_primary_key, stale_column_key, table_key_for, table_mut,
};
use crate::discovery::{schema_from_group, set_schema_keys};
use crate::metadata::{create_metadata_tables, set_schema_version, NOT_VERSIONED};
use crate::verify::{schema_mismatch_error, verify_no_changes_required};

/// User-supplied migration callback, run inside the write transaction
/// between the pre- and post-migration applicators. It may mutate both data
/// and schema, including through [`crate::rename_property`]. It must not
/// commit.
pub type MigrationFunction<'a> = &'a mut dyn FnMut(&mut Group, &mut Schema) -> Result<()>;

/// Applicator for brand-new files.
///
/// Only `AddTable`/`AddInitialProperties` occur in normal operation, but
/// every variant is implemented with its usual semantics to tolerate
/// slightly malformed files produced by older writers.
pub fn create_initial_tables(group: &mut Group, changes: &[SchemaChange]) -> Result<()> {
    for change in changes {
        match change {
            SchemaChange::AddTable { object } => {
                create_table(group, object)?;
            }
            SchemaChange::RemoveTable { .. } => {}
            SchemaChange::AddInitialProperties { object } => add_initial_columns(group, object)?,
            SchemaChange::ChangeTableType {
                object,
                new_table_type,
                ..
            } => {
                let key = table_key_for(group, object)?;
                group.set_table_type(key, *new_table_type, false)?;
            }
            SchemaChange::AddProperty { object, property } => {
                let key = table_key_for(group, object)?;
                add_column(group, key, property)?;
            }
            SchemaChange::RemoveProperty { object, property } => {
                let key = table_key_for(group, object)?;
                let col = stale_column_key(property)?;
                table_mut(group, key)?.remove_column(col)?;
            }
            SchemaChange::ChangePropertyType {
                object,
                old_property,
                new_property,
            } => {
                let key = table_key_for(group, object)?;
                replace_column(group, key, old_property, new_property)?;
            }
            SchemaChange::MakePropertyNullable { object, property } => {
                let key = table_key_for(group, object)?;
                make_property_optional(group, key, property)?;
            }
            SchemaChange::MakePropertyRequired { object, property } => {
                let key = table_key_for(group, object)?;
                make_property_required(group, key, property)?;
            }
            SchemaChange::ChangePrimaryKey { object, property, .. } => {
                let key = table_key_for(group, object)?;
                set_primary_key(group, key, property.as_ref())?;
            }
            SchemaChange::AddIndex { object, property, kind } => {
                let key = table_key_for(group, object)?;
                let table = table_mut(group, key)?;
                let col = table.column_key_for_name(&property.name).ok_or_else(|| {
                    KeelError::Internal(format!("no column named '{}'", property.name))
                })?;
                table.add_search_index(col, *kind)?;
            }
            SchemaChange::RemoveIndex { object, property } => {
                let key = table_key_for(group, object)?;
                let table = table_mut(group, key)?;
                let col = table.column_key_for_name(&property.name).ok_or_else(|| {
                    KeelError::Internal(format!("no column named '{}'", property.name))
                })?;
                table.remove_search_index(col)?;
            }
        }
    }
    Ok(())
}

/// Applicator for same-version opens: only the additive set is executed,
/// anything else is collected into a `SchemaMismatch`.
pub fn apply_non_migration_changes(group: &mut Group, changes: &[SchemaChange]) -> Result<()> {
    let mut problems = Vec::new();
    for change in changes {
        match change {
            SchemaChange::AddTable { object } => {
                create_table(group, object)?;
            }
            SchemaChange::AddInitialProperties { object } => add_initial_columns(group, object)?,
            SchemaChange::AddIndex { object, property, kind } => {
                let key = table_key_for(group, object)?;
                let col = stale_column_key(property)?;
                table_mut(group, key)?.add_search_index(col, *kind)?;
            }
            SchemaChange::RemoveIndex { object, property } => {
                let key = table_key_for(group, object)?;
                let col = stale_column_key(property)?;
                table_mut(group, key)?.remove_search_index(col)?;
            }
            other => {
                problems.extend(crate::verify::describe_change(other));
            }
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(schema_mismatch_error(problems))
    }
}

/// Applicator for the additive modes. The verifier has already rejected
/// anything destructive; the remaining migration-requiring variants are
/// silent no-ops here.
pub fn apply_additive_changes(
    group: &mut Group,
    changes: &[SchemaChange],
    update_indexes: bool,
) -> Result<()> {
    for change in changes {
        match change {
            SchemaChange::AddTable { object } => {
                create_table(group, object)?;
            }
            SchemaChange::RemoveTable { .. } => {}
            SchemaChange::AddInitialProperties { object } => add_initial_columns(group, object)?,
            SchemaChange::AddProperty { object, property } => {
                let key = table_key_for(group, object)?;
                add_column(group, key, property)?;
            }
            SchemaChange::AddIndex { object, property, kind } => {
                if update_indexes {
                    let key = table_key_for(group, object)?;
                    let table = table_mut(group, key)?;
                    let col = table.column_key_for_name(&property.name).ok_or_else(|| {
                        KeelError::Internal(format!("no column named '{}'", property.name))
                    })?;
                    table.add_search_index(col, *kind)?;
                }
            }
            SchemaChange::RemoveIndex { object, property } => {
                if update_indexes {
                    let key = table_key_for(group, object)?;
                    let col = stale_column_key(property)?;
                    table_mut(group, key)?.remove_search_index(col)?;
                }
            }
            SchemaChange::RemoveProperty { .. }
            | SchemaChange::ChangeTableType { .. }
            | SchemaChange::ChangePrimaryKey { .. }
            | SchemaChange::ChangePropertyType { .. }
            | SchemaChange::MakePropertyNullable { .. }
            | SchemaChange::MakePropertyRequired { .. } => {}
        }
    }
    Ok(())
}

/// Applicator run before the user migration callback.
///
/// Structural growth happens here so the callback can see the target shape;
/// removals and table-type changes are deferred until after the callback.
/// A primary-key change only clears the key here, the final binding happens
/// post-migration.
pub fn apply_pre_migration_changes(group: &mut Group, changes: &[SchemaChange]) -> Result<()> {
    for change in changes {
        match change {
            SchemaChange::AddTable { object } => {
                create_table(group, object)?;
            }
            SchemaChange::RemoveTable { .. } => {}
            // Deferred until after the migration.
            SchemaChange::ChangeTableType { .. } | SchemaChange::RemoveProperty { .. } => {}
            SchemaChange::AddInitialProperties { object } => add_initial_columns(group, object)?,
            SchemaChange::AddProperty { object, property } => {
                let key = table_key_for(group, object)?;
                add_column(group, key, property)?;
            }
            SchemaChange::ChangePropertyType {
                object,
                old_property,
                new_property,
            } => {
                let key = table_key_for(group, object)?;
                replace_column(group, key, old_property, new_property)?;
            }
            SchemaChange::MakePropertyNullable { object, property } => {
                let key = table_key_for(group, object)?;
                make_property_optional(group, key, property)?;
            }
            SchemaChange::MakePropertyRequired { object, property } => {
                let key = table_key_for(group, object)?;
                make_property_required(group, key, property)?;
            }
            SchemaChange::ChangePrimaryKey { object, .. } => {
                let key = table_key_for(group, object)?;
                table_mut(group, key)?.set_primary_key_column(None)?;
            }
            SchemaChange::AddIndex { object, property, kind } => {
                let key = table_key_for(group, object)?;
                let table = table_mut(group, key)?;
                let col = table.column_key_for_name(&property.name).ok_or_else(|| {
                    KeelError::Internal(format!("no column named '{}'", property.name))
                })?;
                table.add_search_index(col, *kind)?;
            }
            SchemaChange::RemoveIndex { object, property } => {
                let key = table_key_for(group, object)?;
                let table = table_mut(group, key)?;
                let col = table.column_key_for_name(&property.name).ok_or_else(|| {
                    KeelError::Internal(format!("no column named '{}'", property.name))
                })?;
                table.remove_search_index(col)?;
            }
        }
    }
    Ok(())
}

/// Applicator run after the user migration callback, against a possibly
/// rediscovered change sequence.
///
/// `initial_schema` is the on-disk schema captured before the migration;
/// a property removal whose column was not present back then is a dangling
/// rename left by the callback. `did_reread_schema` is set when the schema
/// was re-read after the callback, making `AddInitialProperties` meaningful
/// again. `handle_backlinks` is forwarded verbatim to the storage engine
/// when a table becomes embedded.
pub fn apply_post_migration_changes(
    group: &mut Group,
    changes: &[SchemaChange],
    initial_schema: &Schema,
    did_reread_schema: bool,
    handle_backlinks: bool,
) -> Result<()> {
    for change in changes {
        match change {
            SchemaChange::RemoveProperty { object, property } => {
                if !initial_schema.is_empty() {
                    if let Some(initial_object) = initial_schema.find(object) {
                        if initial_object.property_for_name(&property.name).is_none() {
                            return Err(KeelError::InvalidProperty {
                                message: format!(
                                    "Renamed property '{object}.{}' does not exist.",
                                    property.name
                                ),
                            });
                        }
                    }
                }
                let key = table_key_for(group, object)?;
                let col = stale_column_key(property)?;
                table_mut(group, key)?.remove_column(col)?;
            }
            SchemaChange::ChangePrimaryKey { object, property, .. } => {
                let key = table_key_for(group, object)?;
                set_primary_key(group, key, property.as_ref())?;
            }
            SchemaChange::AddTable { object } => {
                create_table(group, object)?;
            }
            SchemaChange::AddInitialProperties { object } => {
                if did_reread_schema {
                    add_initial_columns(group, object)?;
                }
                // Otherwise the pre-migration applicator already added them.
            }
            SchemaChange::AddIndex { object, property, kind } => {
                let key = table_key_for(group, object)?;
                let col = stale_column_key(property)?;
                table_mut(group, key)?.add_search_index(col, *kind)?;
            }
            SchemaChange::RemoveIndex { object, property } => {
                let key = table_key_for(group, object)?;
                let col = stale_column_key(property)?;
                table_mut(group, key)?.remove_search_index(col)?;
            }
            SchemaChange::ChangeTableType {
                object,
                new_table_type,
                ..
            } => {
                let key = table_key_for(group, object)?;
                group.set_table_type(key, *new_table_type, handle_backlinks)?;
            }
            SchemaChange::RemoveTable { .. }
            | SchemaChange::ChangePropertyType { .. }
            | SchemaChange::MakePropertyNullable { .. }
            | SchemaChange::MakePropertyRequired { .. }
            | SchemaChange::AddProperty { .. } => {}
        }
    }
    Ok(())
}

/// Apply a change sequence under the given mode, fencing the user migration
/// callback between the pre- and post-migration applicators.
///
/// Runs inside the caller's write transaction and never commits. Every path
/// writes the target version and refreshes the target schema's storage keys
/// exactly once (or skips them per the mode's rules).
#[allow(clippy::too_many_arguments)]
pub fn apply_schema_changes(
    group: &mut Group,
    schema_version: u64,
    target_schema: &mut Schema,
    target_schema_version: u64,
    mode: SchemaMode,
    changes: &[SchemaChange],
    handle_backlinks_automatically: bool,
    migration_function: Option<MigrationFunction<'_>>,
    set_schema_version_on_version_decrease: bool,
) -> Result<()> {
    let started = Instant::now();
    if schema_version == NOT_VERSIONED {
        debug!(
            target_version = target_schema_version,
            mode = mode.as_str(),
            "creating schema"
        );
    } else {
        debug!(
            from_version = schema_version,
            to_version = target_schema_version,
            mode = mode.as_str(),
            "migrating schema"
        );
    }

    let result = apply_schema_changes_inner(
        group,
        schema_version,
        target_schema,
        target_schema_version,
        mode,
        changes,
        handle_backlinks_automatically,
        migration_function,
        set_schema_version_on_version_decrease,
    );

    debug!(
        elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
        change_count = changes.len(),
        ok = result.is_ok(),
        "schema update finished"
    );
    result
}

#[allow(clippy::too_many_arguments)]
fn apply_schema_changes_inner(
    group: &mut Group,
    schema_version: u64,
    target_schema: &mut Schema,
    target_schema_version: u64,
    mode: SchemaMode,
    changes: &[SchemaChange],
    handle_backlinks_automatically: bool,
    mut migration_function: Option<MigrationFunction<'_>>,
    set_schema_version_on_version_decrease: bool,
) -> Result<()> {
    create_metadata_tables(group)?;

    if mode.is_additive() {
        let set_version = schema_version < target_schema_version
            || schema_version == NOT_VERSIONED
            || set_schema_version_on_version_decrease;

        // Indexes are not replicated, so there is no reason to avoid
        // creating them.
        let update_indexes = true;
        apply_additive_changes(group, changes, update_indexes)?;

        if set_version {
            set_schema_version(group, target_schema_version)?;
        }
        set_schema_keys(group, target_schema);
        return Ok(());
    }

    if schema_version == NOT_VERSIONED {
        if mode != SchemaMode::ReadOnly {
            create_initial_tables(group, changes)?;
        }
        set_schema_version(group, target_schema_version)?;
        set_schema_keys(group, target_schema);
        return Ok(());
    }

    if mode == SchemaMode::Manual {
        if let Some(migration) = migration_function.as_deref_mut() {
            run_migration_function(migration, group, target_schema)?;
        }
        let observed = schema_from_group(group).compare(target_schema, mode, false);
        verify_no_changes_required(&observed)?;
        group.validate_primary_columns()?;
        set_schema_keys(group, target_schema);
        set_schema_version(group, target_schema_version)?;
        return Ok(());
    }

    if schema_version == target_schema_version {
        apply_non_migration_changes(group, changes)?;
        set_schema_keys(group, target_schema);
        return Ok(());
    }

    let old_schema = schema_from_group(group);
    apply_pre_migration_changes(group, changes)?;

    if let Some(migration) = migration_function.as_deref_mut() {
        // The callback may observe the target keys.
        set_schema_keys(group, target_schema);
        run_migration_function(migration, group, target_schema)?;

        // The callback may have performed arbitrary storage writes; the only
        // safe recovery is a fresh read of the schema.
        let rediscovered = schema_from_group(group);
        let post_changes = rediscovered.compare(target_schema, mode, false);
        apply_post_migration_changes(
            group,
            &post_changes,
            &old_schema,
            true,
            handle_backlinks_automatically,
        )?;
        group.validate_primary_columns()?;
    } else {
        apply_post_migration_changes(
            group,
            changes,
            &Schema::empty(),
            false,
            handle_backlinks_automatically,
        )?;
    }

    set_schema_version(group, target_schema_version)?;
    set_schema_keys(group, target_schema);
    Ok(())
}

fn run_migration_function(
    migration: MigrationFunction<'_>,
    group: &mut Group,
    target_schema: &mut Schema,
) -> Result<()> {
    debug!("calling migration function");
    let started = Instant::now();
    let result = migration(group, target_schema);
    debug!(
        elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
        ok = result.is_ok(),
        "migration function finished"
    );
    result
}
