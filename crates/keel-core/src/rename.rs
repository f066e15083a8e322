//! Renaming a property inside a migration callback while preserving its
//! column data.

use keel_error::{KeelError, Result};
use keel_store::Group;
use keel_types::Schema;

use crate::columns::{make_property_optional, stale_column_key};
use crate::discovery::object_schema_from_table;
use crate::naming::table_name_for_object_type;

/// Rename `object_type.old_name` to `new_name`, reusing the old column so
/// its data survives.
///
/// Intended to be called from a user migration callback. The preconditions
/// are checked in order and each failure carries a distinct error kind:
///
/// 1. the table for `object_type` must exist;
/// 2. `object_type` must still be part of the target schema;
/// 3. the target schema must no longer declare `old_name`;
/// 4. the on-disk table must still hold `old_name`;
/// 5. if the on-disk table does not yet hold `new_name`, the column is
///    simply renamed (an intermediate step of a multi-version rename);
/// 6. otherwise the types and link targets of both properties must match;
/// 7. and nullability may not shrink (required to optional is fine and
///    widens the reused column in place).
pub fn rename_property(
    group: &mut Group,
    target_schema: &mut Schema,
    object_type: &str,
    old_name: &str,
    new_name: &str,
) -> Result<()> {
    let table_name = table_name_for_object_type(object_type);
    let Some(table) = group.table_for_name(&table_name) else {
        return Err(KeelError::NoSuchTable {
            message: format!(
                "Cannot rename properties for type '{object_type}' because it does not exist."
            ),
        });
    };
    let table_key = table.key();

    let Some(target_object) = target_schema.find(object_type) else {
        return Err(KeelError::NoSuchTable {
            message: format!(
                "Cannot rename properties for type '{object_type}' because it has been removed from the Realm."
            ),
        });
    };

    if target_object.property_for_name(old_name).is_some() {
        return Err(KeelError::IllegalOperation {
            message: format!(
                "Cannot rename property '{object_type}.{old_name}' to '{new_name}' because the source property still exists."
            ),
        });
    }

    let on_disk = object_schema_from_table(group, table);
    let Some(old_property) = on_disk.property_for_name(old_name).cloned() else {
        return Err(KeelError::InvalidProperty {
            message: format!(
                "Cannot rename property '{object_type}.{old_name}' because it does not exist."
            ),
        });
    };
    let old_col = stale_column_key(&old_property)?;

    let Some(new_property) = on_disk.property_for_name(new_name).cloned() else {
        // Renaming to an intermediate name in a multi-version migration.
        // Safe: schema validation fails later unless the property is renamed
        // again to a declared name before the migration ends.
        let table = group
            .table_mut(table_key)
            .ok_or_else(|| KeelError::Internal(format!("no table with key {table_key}")))?;
        return table.rename_column(old_col, new_name);
    };

    if !old_property.ty.same_shape(new_property.ty)
        || old_property.object_type != new_property.object_type
    {
        return Err(KeelError::IllegalOperation {
            message: format!(
                "Cannot rename property '{object_type}.{old_name}' to '{new_name}' because it would change from type '{}' to '{}'.",
                old_property.type_string(),
                new_property.type_string()
            ),
        });
    }

    if old_property.ty.is_nullable() && !new_property.ty.is_nullable() {
        return Err(KeelError::IllegalOperation {
            message: format!(
                "Cannot rename property '{object_type}.{old_name}' to '{new_name}' because it would change from optional to required."
            ),
        });
    }

    let new_col = stale_column_key(&new_property)?;
    {
        let table = group
            .table_mut(table_key)
            .ok_or_else(|| KeelError::Internal(format!("no table with key {table_key}")))?;
        table.remove_column(new_col)?;
        table.rename_column(old_col, new_name)?;
    }

    if let Some(target_object) = target_schema.find_mut(object_type) {
        if let Some(property) = target_object.persisted_property_for_name_mut(new_name) {
            property.column_key = Some(old_col);
        }
    }

    // The reused column keeps the old property's nullability; widen it when
    // the new property is optional.
    if new_property.ty.is_nullable() && !old_property.ty.is_nullable() {
        let mut reused = new_property;
        reused.column_key = Some(old_col);
        make_property_optional(group, table_key, &reused)?;
    }

    Ok(())
}
