//! A group of tables: the root object of one realm file.

use keel_error::{KeelError, Result};
use keel_types::{ColKey, TableKey, TableType};

use crate::table::Table;
use crate::value::{ColumnType, ObjKey, Value};

/// All tables of one realm file.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Group {
    tables: Vec<Table>,
    next_table_key: u64,
}

impl Group {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            next_table_key: 1,
        }
    }

    fn alloc_table_key(&mut self) -> TableKey {
        if self.next_table_key == 0 {
            self.next_table_key = 1;
        }
        let key = TableKey::new(self.next_table_key);
        self.next_table_key += 1;
        match key {
            Some(key) => key,
            None => unreachable!("table key counter wrapped"),
        }
    }

    /// Add a table. Fails if a table with this name already exists.
    pub fn add_table(&mut self, name: &str, table_type: TableType) -> Result<TableKey> {
        if self.key_for_name(name).is_some() {
            return Err(KeelError::IllegalOperation {
                message: format!("Table '{name}' already exists."),
            });
        }
        let key = self.alloc_table_key();
        self.tables.push(Table::new(key, name.to_owned(), table_type));
        Ok(key)
    }

    /// Get the table with this name, creating it if absent.
    pub fn get_or_add_table(&mut self, name: &str, table_type: TableType) -> Result<TableKey> {
        match self.key_for_name(name) {
            Some(key) => Ok(key),
            None => self.add_table(name, table_type),
        }
    }

    /// Add a table together with its primary-key column.
    pub fn add_table_with_primary_key(
        &mut self,
        name: &str,
        pk_type: ColumnType,
        pk_name: &str,
        nullable: bool,
        table_type: TableType,
    ) -> Result<TableKey> {
        let key = self.add_table(name, table_type)?;
        let table = self.table_mut_or_internal(key)?;
        let col = table.add_column(pk_type, pk_name, nullable, None)?;
        table.set_primary_key_column(Some(col))?;
        Ok(key)
    }

    pub fn remove_table(&mut self, key: TableKey) -> Result<()> {
        let position = self
            .tables
            .iter()
            .position(|t| t.key() == key)
            .ok_or_else(|| KeelError::Internal(format!("no table with key {key}")))?;
        self.tables.remove(position);
        Ok(())
    }

    #[must_use]
    pub fn table(&self, key: TableKey) -> Option<&Table> {
        self.tables.iter().find(|t| t.key() == key)
    }

    pub fn table_mut(&mut self, key: TableKey) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.key() == key)
    }

    fn table_mut_or_internal(&mut self, key: TableKey) -> Result<&mut Table> {
        self.table_mut(key)
            .ok_or_else(|| KeelError::Internal(format!("no table with key {key}")))
    }

    #[must_use]
    pub fn table_for_name(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name() == name)
    }

    pub fn table_for_name_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.name() == name)
    }

    #[must_use]
    pub fn key_for_name(&self, name: &str) -> Option<TableKey> {
        self.tables.iter().find(|t| t.name() == name).map(Table::key)
    }

    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.key_for_name(name).is_some()
    }

    /// Keys of all tables, in creation order.
    #[must_use]
    pub fn table_keys(&self) -> Vec<TableKey> {
        self.tables.iter().map(Table::key).collect()
    }

    #[must_use]
    pub fn table_name(&self, key: TableKey) -> Option<&str> {
        self.table(key).map(Table::name)
    }

    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Change a table's type.
    ///
    /// Converting to `Embedded` requires every object in the table to have
    /// exactly one incoming link. Objects with no incoming links are deleted
    /// when `handle_backlinks` is set and rejected otherwise; objects with
    /// multiple incoming links are always rejected.
    pub fn set_table_type(
        &mut self,
        key: TableKey,
        table_type: TableType,
        handle_backlinks: bool,
    ) -> Result<()> {
        let current = self
            .table(key)
            .ok_or_else(|| KeelError::Internal(format!("no table with key {key}")))?
            .table_type();
        if current == table_type {
            return Ok(());
        }

        if table_type == TableType::Embedded {
            self.embed_table(key, handle_backlinks)?;
        }
        self.table_mut_or_internal(key)?.set_table_type_raw(table_type);
        Ok(())
    }

    fn embed_table(&mut self, key: TableKey, handle_backlinks: bool) -> Result<()> {
        let name = self
            .table_name(key)
            .map(str::to_owned)
            .unwrap_or_default();
        let mut incoming: std::collections::BTreeMap<ObjKey, usize> = self
            .table(key)
            .map(|t| t.object_keys().into_iter().map(|obj| (obj, 0)).collect())
            .unwrap_or_default();

        for table in &self.tables {
            for column in table.columns() {
                if column.ty != ColumnType::Link || column.target_table != Some(key) {
                    continue;
                }
                for obj in table.object_keys() {
                    match table.value(obj, column.key) {
                        Some(Value::Link(target)) => {
                            if let Some(count) = incoming.get_mut(&target) {
                                *count += 1;
                            }
                        }
                        Some(Value::List(values)) => {
                            for target in values.iter().filter_map(Value::as_link) {
                                if let Some(count) = incoming.get_mut(&target) {
                                    *count += 1;
                                }
                            }
                        }
                        Some(Value::Dictionary(values)) => {
                            for target in values.values().filter_map(Value::as_link) {
                                if let Some(count) = incoming.get_mut(&target) {
                                    *count += 1;
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        if incoming.values().any(|&count| count > 1) {
            return Err(KeelError::IllegalOperation {
                message: format!(
                    "Cannot convert '{name}' to embedded: at least one object has multiple incoming links."
                ),
            });
        }
        let orphans: Vec<ObjKey> = incoming
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&obj, _)| obj)
            .collect();
        if !orphans.is_empty() {
            if !handle_backlinks {
                return Err(KeelError::IllegalOperation {
                    message: format!(
                        "Cannot convert '{name}' to embedded: at least one object has no incoming links and would be deleted."
                    ),
                });
            }
            let table = self.table_mut_or_internal(key)?;
            for obj in orphans {
                table.remove_object(obj)?;
            }
        }
        Ok(())
    }

    /// Verify that every primary-key column holds unique, non-null values.
    pub fn validate_primary_columns(&self) -> Result<()> {
        for table in &self.tables {
            let Some(pk) = table.primary_key_column() else {
                continue;
            };
            let column_name = table
                .column(pk)
                .map(|c| c.name.clone())
                .unwrap_or_default();
            let mut seen: Vec<Value> = Vec::new();
            for obj in table.object_keys() {
                let Some(value) = table.value(obj, pk) else {
                    continue;
                };
                if seen.contains(&value) {
                    return Err(KeelError::IllegalOperation {
                        message: format!(
                            "Primary key column '{}.{column_name}' contains duplicate values after migration.",
                            table.name()
                        ),
                    });
                }
                seen.push(value);
            }
        }
        Ok(())
    }

    /// Look up a column key by table and column name.
    #[must_use]
    pub fn column_key(&self, table: TableKey, column_name: &str) -> Option<ColKey> {
        self.table(table)
            .and_then(|t| t.column_key_for_name(column_name))
    }
}
