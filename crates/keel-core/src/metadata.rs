//! The reserved metadata table holding the schema version.

use keel_error::{KeelError, Result};
use keel_store::{ColumnType, Group, Value};
use keel_types::TableType;

/// Sentinel version meaning "never initialised".
pub const NOT_VERSIONED: u64 = u64::MAX;

/// Name of the metadata table. Sync replication excludes it by this name.
const METADATA_TABLE: &str = "metadata";
const VERSION_COLUMN: &str = "version";

/// Create the metadata table if needed. Idempotent: an existing table with
/// at least one column is left alone.
pub fn create_metadata_tables(group: &mut Group) -> Result<()> {
    let key = group.get_or_add_table(METADATA_TABLE, TableType::TopLevel)?;
    let table = group
        .table_mut(key)
        .ok_or_else(|| KeelError::Internal("metadata table vanished after creation".to_owned()))?;
    if table.column_count() == 0 {
        let col = table.add_column(ColumnType::Int, VERSION_COLUMN, false, None)?;
        let obj = table.create_object();
        table.set_value(obj, col, Value::Int(encode_version(NOT_VERSIONED)))?;
    }
    Ok(())
}

/// Read the stored schema version, or [`NOT_VERSIONED`] for files that have
/// never been initialised.
#[must_use]
pub fn get_schema_version(group: &Group) -> u64 {
    let Some(table) = group.table_for_name(METADATA_TABLE) else {
        return NOT_VERSIONED;
    };
    if table.column_count() == 0 {
        return NOT_VERSIONED;
    }
    let Some(col) = table.column_key_for_name(VERSION_COLUMN) else {
        return NOT_VERSIONED;
    };
    let Some(obj) = table.object_keys().first().copied() else {
        return NOT_VERSIONED;
    };
    table
        .value(obj, col)
        .and_then(|v| v.as_int())
        .map_or(NOT_VERSIONED, decode_version)
}

/// Write the schema version, creating the metadata table if needed.
pub fn set_schema_version(group: &mut Group, version: u64) -> Result<()> {
    create_metadata_tables(group)?;
    let table = group
        .table_for_name_mut(METADATA_TABLE)
        .ok_or_else(|| KeelError::Internal("metadata table vanished".to_owned()))?;
    let col = table
        .column_key_for_name(VERSION_COLUMN)
        .ok_or_else(|| KeelError::Internal("metadata version column vanished".to_owned()))?;
    let obj = table
        .object_keys()
        .first()
        .copied()
        .ok_or_else(|| KeelError::Internal("metadata row vanished".to_owned()))?;
    table.set_value(obj, col, Value::Int(encode_version(version)))
}

// The version is stored in an Int column; the sentinel round-trips through
// the sign bit.
#[allow(clippy::cast_possible_wrap)]
const fn encode_version(version: u64) -> i64 {
    version as i64
}

#[allow(clippy::cast_sign_loss)]
const fn decode_version(raw: i64) -> u64 {
    raw as u64
}
