//! Column-level helpers shared by the applicators.

use keel_error::{KeelError, Result};
use keel_store::{ColumnType, Group, Table};
use keel_types::{BaseType, ColKey, ObjectSchema, Property, PropertyType, TableKey, TableType};

use crate::naming::table_name_for_object_type;

/// Map a property type to the storage engine's column type.
///
/// `Object` is handled through the link overload and `LinkingObjects` is
/// never materialised; hitting either here is a programming error.
pub(crate) fn to_core_type(ty: PropertyType) -> ColumnType {
    match ty.base() {
        BaseType::Int => ColumnType::Int,
        BaseType::Bool => ColumnType::Bool,
        BaseType::Float => ColumnType::Float,
        BaseType::Double => ColumnType::Double,
        BaseType::String => ColumnType::String,
        BaseType::Date => ColumnType::Timestamp,
        BaseType::Data => ColumnType::Binary,
        BaseType::ObjectId => ColumnType::ObjectId,
        BaseType::Decimal => ColumnType::Decimal,
        BaseType::Uuid => ColumnType::Uuid,
        BaseType::Mixed => ColumnType::Mixed,
        BaseType::Object | BaseType::LinkingObjects => {
            unreachable!("link properties are not mapped to scalar column types")
        }
    }
}

pub(crate) fn table_mut(group: &mut Group, key: TableKey) -> Result<&mut Table> {
    group
        .table_mut(key)
        .ok_or_else(|| KeelError::Internal(format!("no table with key {key}")))
}

/// Key of the table backing a class, failing with an internal error when the
/// applicator sequencing guarantee is violated.
pub(crate) fn table_key_for(group: &Group, object_type: &str) -> Result<TableKey> {
    group
        .key_for_name(&table_name_for_object_type(object_type))
        .ok_or_else(|| KeelError::Internal(format!("no table for object type '{object_type}'")))
}

/// Add the column for one persisted property.
///
/// Primary-key columns are created together with their table, so an already
/// present column is simply returned for primary properties. Search indexes
/// requested by the property are created with the column.
pub(crate) fn add_column(group: &mut Group, table: TableKey, property: &Property) -> Result<ColKey> {
    assert!(
        !property.is_computed(),
        "computed properties are never materialised as columns"
    );

    if property.is_primary {
        if let Some(col) = group
            .table(table)
            .and_then(|t| t.column_key_for_name(&property.name))
        {
            return Ok(col);
        }
    }

    let collection = property.ty.collection();
    if property.ty.base() == BaseType::Object {
        let target_name =
            table_name_for_object_type(property.object_type.as_deref().unwrap_or_default());
        let target = group.key_for_name(&target_name).ok_or_else(|| {
            KeelError::Internal(format!("link target table '{target_name}' does not exist"))
        })?;
        table_mut(group, table)?.add_link_column(target, &property.name, collection)
    } else {
        let table = table_mut(group, table)?;
        let col = table.add_column(
            to_core_type(property.ty),
            &property.name,
            property.ty.is_nullable(),
            collection,
        )?;
        if let Some(kind) = property.requested_index() {
            table.add_search_index(col, kind)?;
        }
        Ok(col)
    }
}

/// Drop `old` and re-add `new`, losing the column's data.
pub(crate) fn replace_column(
    group: &mut Group,
    table: TableKey,
    old: &Property,
    new: &Property,
) -> Result<()> {
    let col = stale_column_key(old)?;
    table_mut(group, table)?.remove_column(col)?;
    add_column(group, table, new)?;
    Ok(())
}

/// Create the physical table for a class, if it does not already exist.
///
/// Classes with a primary key are created through the primary-key overload
/// so the key column exists from the start.
pub(crate) fn create_table(group: &mut Group, object_schema: &ObjectSchema) -> Result<TableKey> {
    let name = table_name_for_object_type(&object_schema.name);
    if let Some(key) = group.key_for_name(&name) {
        return Ok(key);
    }

    if let Some(pk) = object_schema.primary_key_property() {
        let table_type = if object_schema.table_type == TableType::TopLevelAsymmetric {
            TableType::TopLevelAsymmetric
        } else {
            TableType::TopLevel
        };
        group.add_table_with_primary_key(
            &name,
            to_core_type(pk.ty),
            &pk.name,
            pk.ty.is_nullable(),
            table_type,
        )
    } else if object_schema.table_type == TableType::Embedded {
        group.add_table(&name, TableType::Embedded)
    } else {
        group.get_or_add_table(&name, object_schema.table_type)
    }
}

/// Add the columns for every persisted property of a freshly created class.
pub(crate) fn add_initial_columns(group: &mut Group, object_schema: &ObjectSchema) -> Result<()> {
    let key = table_key_for(group, &object_schema.name)?;
    for property in &object_schema.persisted_properties {
        add_column(group, key, property)?;
    }
    Ok(())
}

/// Widen a column to nullable in place, preserving its values.
pub(crate) fn make_property_optional(
    group: &mut Group,
    table: TableKey,
    property: &Property,
) -> Result<()> {
    let col = stale_column_key(property)?;
    table_mut(group, table)?.set_nullability(col, true, false)?;
    Ok(())
}

/// Narrow a column to required by dropping and re-adding it. Data in the
/// column is discarded.
pub(crate) fn make_property_required(
    group: &mut Group,
    table: TableKey,
    property: &Property,
) -> Result<()> {
    let col = stale_column_key(property)?;
    table_mut(group, table)?.remove_column(col)?;
    let mut required = property.clone();
    required.ty = required.ty.make_required();
    required.column_key = None;
    add_column(group, table, &required)?;
    Ok(())
}

/// Bind the table's primary key to `property`, or clear it.
pub(crate) fn set_primary_key(
    group: &mut Group,
    table: TableKey,
    property: Option<&Property>,
) -> Result<()> {
    let table = table_mut(group, table)?;
    let col = match property {
        Some(property) => Some(
            table
                .column_key_for_name(&property.name)
                .ok_or_else(|| {
                    KeelError::Internal(format!(
                        "primary key column '{}' does not exist",
                        property.name
                    ))
                })?,
        ),
        None => None,
    };
    table.set_primary_key_column(col)
}

pub(crate) fn stale_column_key(property: &Property) -> Result<ColKey> {
    property.column_key.ok_or_else(|| {
        KeelError::Internal(format!("property '{}' is not bound to a column", property.name))
    })
}
