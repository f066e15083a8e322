//! File-backed database handle with closure-scoped transactions.

use std::fs;
use std::path::{Path, PathBuf};

use keel_error::{KeelError, Result};
use tracing::debug;

use crate::group::Group;

/// A database: one [`Group`] plus an optional backing file.
///
/// Writes run inside a closure; if the closure fails, the group is restored
/// to its pre-write state, so the caller's transaction is rolled back as a
/// whole. On success the group is re-snapshotted to the backing file.
#[derive(Debug)]
pub struct Db {
    path: Option<PathBuf>,
    group: Group,
}

impl Db {
    /// An in-memory database with no backing file.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            group: Group::new(),
        }
    }

    /// Open a file-backed database, loading the snapshot if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let group = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Group::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| KeelError::InvalidSnapshot {
                detail: err.to_string(),
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Group::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path: Some(path),
            group,
        })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a read-only closure against the group.
    pub fn read<R>(&self, f: impl FnOnce(&Group) -> R) -> R {
        f(&self.group)
    }

    /// Run a write transaction.
    ///
    /// The group is snapshotted before the closure runs; any error restores
    /// the snapshot and nothing reaches the backing file.
    pub fn write<R>(&mut self, f: impl FnOnce(&mut Group) -> Result<R>) -> Result<R> {
        let backup = self.group.clone();
        match f(&mut self.group) {
            Ok(value) => {
                self.persist()?;
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "rolling back write transaction");
                self.group = backup;
                Err(err)
            }
        }
    }

    /// Replace the group with an empty one and persist the result.
    pub fn wipe(&mut self) -> Result<()> {
        self.group = Group::new();
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(&self.group).map_err(|err| KeelError::InvalidSnapshot {
            detail: err.to_string(),
        })?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ColumnType, Value};
    use keel_types::TableType;

    #[test]
    fn failed_writes_roll_back() {
        let mut db = Db::in_memory();
        db.write(|group| {
            group.add_table("class_Dog", TableType::TopLevel)?;
            Ok(())
        })
        .unwrap();

        let err = db.write(|group| {
            group.add_table("class_Cat", TableType::TopLevel)?;
            Err::<(), _>(KeelError::Internal("forced failure".to_owned()))
        });
        assert!(err.is_err());
        db.read(|group| {
            assert!(group.has_table("class_Dog"));
            assert!(!group.has_table("class_Cat"));
        });
    }

    #[test]
    fn snapshot_round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pets.realm");

        {
            let mut db = Db::open(&path).unwrap();
            db.write(|group| {
                let key = group.add_table_with_primary_key(
                    "class_Dog",
                    ColumnType::String,
                    "name",
                    false,
                    TableType::TopLevel,
                )?;
                let table = group.table_mut(key).ok_or_else(|| {
                    KeelError::Internal("table vanished".to_owned())
                })?;
                table.create_object_with_primary_key(Value::String("rex".to_owned()))?;
                Ok(())
            })
            .unwrap();
        }

        let db = Db::open(&path).unwrap();
        db.read(|group| {
            let table = group.table_for_name("class_Dog").unwrap();
            assert_eq!(table.len(), 1);
            let pk = table.primary_key_column().unwrap();
            let obj = table.object_keys()[0];
            assert_eq!(table.value(obj, pk), Some(Value::String("rex".to_owned())));
        });
    }

    #[test]
    fn wipe_clears_tables_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pets.realm");

        let mut db = Db::open(&path).unwrap();
        db.write(|group| group.add_table("class_Dog", TableType::TopLevel).map(|_| ()))
            .unwrap();
        db.wipe().unwrap();
        db.read(|group| assert_eq!(group.table_count(), 0));

        let reopened = Db::open(&path).unwrap();
        reopened.read(|group| assert_eq!(group.table_count(), 0));
    }
}
