//! Server-initiated schema migration flag.
//!
//! When the server moves a realm to a new schema version, the sync client
//! records a pending-migration marker in the file. The async-open
//! orchestrator checks it after download completion and, if set, performs
//! the delete-and-recreate round-trip. The marker lives in an internal
//! table (no `class_` prefix) and is invisible to schema discovery.

use keel_error::{KeelError, Result};
use keel_store::{ColumnType, Group, Value};
use keel_types::TableType;

const MIGRATION_TABLE: &str = "sync_schema_migration";
const PENDING_COLUMN: &str = "pending";

/// Whether a server-initiated schema migration is waiting to be performed.
#[must_use]
pub fn has_pending_migration(group: &Group) -> bool {
    let Some(table) = group.table_for_name(MIGRATION_TABLE) else {
        return false;
    };
    let Some(col) = table.column_key_for_name(PENDING_COLUMN) else {
        return false;
    };
    let Some(obj) = table.object_keys().first().copied() else {
        return false;
    };
    table.value(obj, col).and_then(|v| v.as_int()) == Some(1)
}

/// Record that the server requires a schema migration. Idempotent.
pub fn set_pending_migration(group: &mut Group) -> Result<()> {
    let key = group.get_or_add_table(MIGRATION_TABLE, TableType::TopLevel)?;
    let table = group
        .table_mut(key)
        .ok_or_else(|| KeelError::Internal("migration marker table vanished".to_owned()))?;
    let col = match table.column_key_for_name(PENDING_COLUMN) {
        Some(col) => col,
        None => table.add_column(ColumnType::Int, PENDING_COLUMN, false, None)?,
    };
    let obj = match table.object_keys().first().copied() {
        Some(obj) => obj,
        None => table.create_object(),
    };
    table.set_value(obj, col, Value::Int(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::schema_from_group;

    #[test]
    fn marker_round_trips_and_stays_internal() {
        let mut group = Group::new();
        assert!(!has_pending_migration(&group));

        set_pending_migration(&mut group).unwrap();
        assert!(has_pending_migration(&group));
        set_pending_migration(&mut group).unwrap();
        assert!(has_pending_migration(&group));

        assert!(schema_from_group(&group).is_empty());
    }
}
