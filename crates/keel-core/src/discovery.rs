//! Reading a [`Schema`] back out of a group, and rebinding storage keys.

use keel_store::{Column, ColumnType, Group, Table};
use keel_error::Result;
use keel_types::{
    BaseType, CollectionType, IndexKind, ObjectSchema, Property, PropertyFlags, PropertyType,
    Schema,
};

use crate::naming::{
    is_internal_object_type, object_type_for_table_name, table_name_for_object_type,
};

/// Discover the user schema stored in a group.
///
/// Internal tables (no `class_` prefix, empty decoded name, or a `__`
/// prefix) are invisible here.
#[must_use]
pub fn schema_from_group(group: &Group) -> Schema {
    let mut objects = Vec::new();
    for key in group.table_keys() {
        let Some(table) = group.table(key) else {
            continue;
        };
        let Some(object_type) = object_type_for_table_name(table.name()) else {
            continue;
        };
        if is_internal_object_type(object_type) {
            continue;
        }
        objects.push(object_schema_from_table(group, table));
    }
    Schema::new(objects)
}

/// Build the object schema describing one physical table.
#[must_use]
pub fn object_schema_from_table(group: &Group, table: &Table) -> ObjectSchema {
    let object_type = object_type_for_table_name(table.name()).unwrap_or_default();
    let pk_col = table.primary_key_column();

    let mut properties = Vec::with_capacity(table.columns().len());
    for column in table.columns() {
        let mut property = property_from_column(group, column);
        if Some(column.key) == pk_col {
            property.is_primary = true;
        }
        properties.push(property);
    }

    let mut object = ObjectSchema::new(object_type, table.table_type(), properties);
    object.table_key = Some(table.key());
    object
}

fn property_from_column(group: &Group, column: &Column) -> Property {
    let base = match column.ty {
        ColumnType::Int => BaseType::Int,
        ColumnType::Bool => BaseType::Bool,
        ColumnType::Float => BaseType::Float,
        ColumnType::Double => BaseType::Double,
        ColumnType::String => BaseType::String,
        ColumnType::Timestamp => BaseType::Date,
        ColumnType::Binary => BaseType::Data,
        ColumnType::ObjectId => BaseType::ObjectId,
        ColumnType::Decimal => BaseType::Decimal,
        ColumnType::Uuid => BaseType::Uuid,
        ColumnType::Mixed => BaseType::Mixed,
        ColumnType::Link => BaseType::Object,
    };
    let mut flags = PropertyFlags::empty();
    if column.nullable {
        flags |= PropertyFlags::NULLABLE;
    }
    match column.collection {
        Some(CollectionType::List) => flags |= PropertyFlags::ARRAY,
        Some(CollectionType::Set) => flags |= PropertyFlags::SET,
        Some(CollectionType::Dictionary) => flags |= PropertyFlags::DICTIONARY,
        None => {}
    }

    Property {
        name: column.name.clone(),
        ty: PropertyType::with_flags(base, flags),
        object_type: column
            .target_table
            .and_then(|key| group.table_name(key))
            .and_then(object_type_for_table_name)
            .map(str::to_owned),
        is_primary: false,
        is_indexed: column.index == Some(IndexKind::General),
        is_fulltext_indexed: column.index == Some(IndexKind::Fulltext),
        column_key: Some(column.key),
    }
}

/// Resolve `table_key` and per-property `column_key` against live storage.
///
/// Classes without a backing table are skipped; their keys stay unset.
pub fn set_schema_keys(group: &Group, schema: &mut Schema) {
    for object in schema.iter_mut() {
        let Some(table) = group.table_for_name(&table_name_for_object_type(&object.name)) else {
            continue;
        };
        object.table_key = Some(table.key());
        for property in &mut object.persisted_properties {
            property.column_key = table.column_key_for_name(&property.name);
        }
    }
}

/// Whether the group holds no user data. Internal tables are ignored.
#[must_use]
pub fn is_empty(group: &Group) -> bool {
    for key in group.table_keys() {
        let Some(table) = group.table(key) else {
            continue;
        };
        let Some(object_type) = object_type_for_table_name(table.name()) else {
            continue;
        };
        if is_internal_object_type(object_type) {
            continue;
        }
        if !table.is_empty() {
            return false;
        }
    }
    true
}

/// Drop the table backing an object type, if it exists.
pub fn delete_data_for_object(group: &mut Group, object_type: &str) -> Result<()> {
    if let Some(key) = group.key_for_name(&table_name_for_object_type(object_type)) {
        group.remove_table(key)?;
    }
    Ok(())
}
