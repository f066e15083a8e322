//! One physical table: columns, indexes, primary key, and rows.

use std::collections::BTreeMap;

use keel_error::{KeelError, Result};
use keel_types::{ColKey, CollectionType, IndexKind, TableKey, TableType};

use crate::value::{ColumnType, ObjKey, Value};

/// Metadata for one column.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Column {
    pub key: ColKey,
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub collection: Option<CollectionType>,
    /// Target table for link columns.
    pub target_table: Option<TableKey>,
    /// Search index on this column, if any.
    pub index: Option<IndexKind>,
}

/// One physical table.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Table {
    key: TableKey,
    name: String,
    table_type: TableType,
    columns: Vec<Column>,
    primary_key: Option<ColKey>,
    rows: BTreeMap<ObjKey, BTreeMap<ColKey, Value>>,
    next_col_key: u64,
    next_obj_key: u64,
}

impl Table {
    pub(crate) fn new(key: TableKey, name: String, table_type: TableType) -> Self {
        Self {
            key,
            name,
            table_type,
            columns: Vec::new(),
            primary_key: None,
            rows: BTreeMap::new(),
            next_col_key: 1,
            next_obj_key: 1,
        }
    }

    #[must_use]
    pub const fn key(&self) -> TableKey {
        self.key
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn table_type(&self) -> TableType {
        self.table_type
    }

    pub(crate) fn set_table_type_raw(&mut self, table_type: TableType) {
        self.table_type = table_type;
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, col: ColKey) -> Option<&Column> {
        self.columns.iter().find(|c| c.key == col)
    }

    fn column_mut(&mut self, col: ColKey) -> Result<&mut Column> {
        self.columns
            .iter_mut()
            .find(|c| c.key == col)
            .ok_or_else(|| KeelError::Internal(format!("no column with key {col}")))
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn column_key_for_name(&self, name: &str) -> Option<ColKey> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.key)
    }

    fn alloc_col_key(&mut self) -> ColKey {
        let key = ColKey::new(self.next_col_key);
        self.next_col_key += 1;
        match key {
            Some(key) => key,
            // next_col_key starts at 1 and only increments.
            None => unreachable!("column key counter wrapped"),
        }
    }

    /// Add a scalar (or scalar-collection) column.
    pub fn add_column(
        &mut self,
        ty: ColumnType,
        name: &str,
        nullable: bool,
        collection: Option<CollectionType>,
    ) -> Result<ColKey> {
        if ty == ColumnType::Link {
            return Err(KeelError::Internal(
                "link columns must be added through add_link_column".to_owned(),
            ));
        }
        self.add_column_inner(ty, name, nullable, collection, None)
    }

    /// Add a link column targeting `target`.
    pub fn add_link_column(
        &mut self,
        target: TableKey,
        name: &str,
        collection: Option<CollectionType>,
    ) -> Result<ColKey> {
        // Scalar links are implicitly nullable; collections of links are not.
        let nullable = collection.is_none();
        self.add_column_inner(ColumnType::Link, name, nullable, collection, Some(target))
    }

    fn add_column_inner(
        &mut self,
        ty: ColumnType,
        name: &str,
        nullable: bool,
        collection: Option<CollectionType>,
        target_table: Option<TableKey>,
    ) -> Result<ColKey> {
        if self.column_key_for_name(name).is_some() {
            return Err(KeelError::Internal(format!(
                "table '{}' already has a column named '{name}'",
                self.name
            )));
        }
        let key = self.alloc_col_key();
        self.columns.push(Column {
            key,
            name: name.to_owned(),
            ty,
            nullable,
            collection,
            target_table,
            index: None,
        });
        Ok(key)
    }

    /// Remove a column and every value stored in it.
    pub fn remove_column(&mut self, col: ColKey) -> Result<()> {
        let position = self
            .columns
            .iter()
            .position(|c| c.key == col)
            .ok_or_else(|| KeelError::Internal(format!("no column with key {col}")))?;
        self.columns.remove(position);
        for cells in self.rows.values_mut() {
            cells.remove(&col);
        }
        if self.primary_key == Some(col) {
            self.primary_key = None;
        }
        Ok(())
    }

    pub fn rename_column(&mut self, col: ColKey, new_name: &str) -> Result<()> {
        if self
            .columns
            .iter()
            .any(|c| c.key != col && c.name == new_name)
        {
            return Err(KeelError::Internal(format!(
                "table '{}' already has a column named '{new_name}'",
                self.name
            )));
        }
        let column = self.column_mut(col)?;
        column.name = new_name.to_owned();
        Ok(())
    }

    /// Toggle a column's nullability in place, keeping its key and values.
    ///
    /// When making a column required, null cells are rejected if
    /// `throw_on_null` is set and overwritten with the zero value otherwise.
    pub fn set_nullability(&mut self, col: ColKey, nullable: bool, throw_on_null: bool) -> Result<ColKey> {
        let (ty, name, collection) = {
            let column = self.column_mut(col)?;
            (column.ty, column.name.clone(), column.collection)
        };
        if !nullable && collection.is_none() {
            let has_null = self
                .rows
                .values()
                .any(|cells| cells.get(&col).is_some_and(Value::is_null));
            if has_null && throw_on_null {
                return Err(KeelError::IllegalOperation {
                    message: format!(
                        "Cannot make column '{}.{name}' required: it contains null values.",
                        self.name
                    ),
                });
            }
            for cells in self.rows.values_mut() {
                if cells.get(&col).is_some_and(Value::is_null) {
                    cells.insert(col, Value::zero_for(ty));
                }
            }
        }
        self.column_mut(col)?.nullable = nullable;
        Ok(col)
    }

    /// Bind or clear the primary-key column.
    pub fn set_primary_key_column(&mut self, col: Option<ColKey>) -> Result<()> {
        if let Some(col) = col {
            if self.column(col).is_none() {
                return Err(KeelError::Internal(format!("no column with key {col}")));
            }
        }
        self.primary_key = col;
        Ok(())
    }

    #[must_use]
    pub const fn primary_key_column(&self) -> Option<ColKey> {
        self.primary_key
    }

    pub fn add_search_index(&mut self, col: ColKey, kind: IndexKind) -> Result<()> {
        self.column_mut(col)?.index = Some(kind);
        Ok(())
    }

    pub fn remove_search_index(&mut self, col: ColKey) -> Result<()> {
        self.column_mut(col)?.index = None;
        Ok(())
    }

    #[must_use]
    pub fn search_index_kind(&self, col: ColKey) -> Option<IndexKind> {
        self.column(col).and_then(|c| c.index)
    }

    fn alloc_obj_key(&mut self) -> ObjKey {
        let key = ObjKey::new(self.next_obj_key);
        self.next_obj_key += 1;
        match key {
            Some(key) => key,
            None => unreachable!("object key counter wrapped"),
        }
    }

    /// Create an object with all cells at their defaults.
    pub fn create_object(&mut self) -> ObjKey {
        let key = self.alloc_obj_key();
        self.rows.insert(key, BTreeMap::new());
        key
    }

    /// Create an object and set its primary-key cell.
    pub fn create_object_with_primary_key(&mut self, value: Value) -> Result<ObjKey> {
        let pk = self.primary_key.ok_or_else(|| {
            KeelError::Internal(format!("table '{}' has no primary key column", self.name))
        })?;
        let key = self.create_object();
        self.set_value(key, pk, value)?;
        Ok(key)
    }

    pub fn remove_object(&mut self, obj: ObjKey) -> Result<()> {
        self.rows
            .remove(&obj)
            .map(|_| ())
            .ok_or_else(|| KeelError::Internal(format!("no object with key {obj}")))
    }

    pub fn set_value(&mut self, obj: ObjKey, col: ColKey, value: Value) -> Result<()> {
        let column = self
            .column(col)
            .ok_or_else(|| KeelError::Internal(format!("no column with key {col}")))?;
        if value.is_null() && !column.nullable && column.collection.is_none() {
            return Err(KeelError::IllegalOperation {
                message: format!(
                    "Cannot set '{}.{}' to null: the column is required.",
                    self.name, column.name
                ),
            });
        }
        let cells = self
            .rows
            .get_mut(&obj)
            .ok_or_else(|| KeelError::Internal(format!("no object with key {obj}")))?;
        cells.insert(col, value);
        Ok(())
    }

    /// Read a cell; unset cells read as the column default.
    #[must_use]
    pub fn value(&self, obj: ObjKey, col: ColKey) -> Option<Value> {
        let column = self.column(col)?;
        let cells = self.rows.get(&obj)?;
        Some(cells.get(&col).cloned().unwrap_or_else(|| {
            Value::default_for(column.ty, column.nullable, column.collection)
        }))
    }

    #[must_use]
    pub fn object_keys(&self) -> Vec<ObjKey> {
        self.rows.keys().copied().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        let key = TableKey::new(1).unwrap();
        Table::new(key, "class_Dog".to_owned(), TableType::TopLevel)
    }

    #[test]
    fn rename_column_keeps_key_and_values() {
        let mut t = table();
        let col = t.add_column(ColumnType::String, "first_name", false, None).unwrap();
        let obj = t.create_object();
        t.set_value(obj, col, Value::String("rex".to_owned())).unwrap();

        t.rename_column(col, "name").unwrap();
        assert_eq!(t.column_key_for_name("name"), Some(col));
        assert_eq!(t.value(obj, col), Some(Value::String("rex".to_owned())));
    }

    #[test]
    fn remove_column_drops_values() {
        let mut t = table();
        let col = t.add_column(ColumnType::Int, "age", false, None).unwrap();
        let obj = t.create_object();
        t.set_value(obj, col, Value::Int(7)).unwrap();
        t.remove_column(col).unwrap();

        let col2 = t.add_column(ColumnType::Int, "age", false, None).unwrap();
        assert_ne!(col, col2);
        assert_eq!(t.value(obj, col2), Some(Value::Int(0)));
    }

    #[test]
    fn widening_nullability_preserves_values() {
        let mut t = table();
        let col = t.add_column(ColumnType::Int, "age", false, None).unwrap();
        let obj = t.create_object();
        t.set_value(obj, col, Value::Int(9)).unwrap();

        let same = t.set_nullability(col, true, false).unwrap();
        assert_eq!(same, col);
        assert_eq!(t.value(obj, col), Some(Value::Int(9)));
        t.set_value(obj, col, Value::Null).unwrap();
    }

    #[test]
    fn narrowing_nullability_handles_nulls() {
        let mut t = table();
        let col = t.add_column(ColumnType::Int, "age", true, None).unwrap();
        let obj = t.create_object();
        t.set_value(obj, col, Value::Null).unwrap();

        let err = t.set_nullability(col, false, true).unwrap_err();
        assert!(matches!(err, KeelError::IllegalOperation { .. }));

        t.set_nullability(col, false, false).unwrap();
        assert_eq!(t.value(obj, col), Some(Value::Int(0)));
    }

    #[test]
    fn duplicate_column_names_are_rejected() {
        let mut t = table();
        t.add_column(ColumnType::Int, "age", false, None).unwrap();
        assert!(t.add_column(ColumnType::Int, "age", false, None).is_err());
    }

    #[test]
    fn removing_the_primary_key_column_clears_the_binding() {
        let mut t = table();
        let col = t.add_column(ColumnType::String, "id", false, None).unwrap();
        t.set_primary_key_column(Some(col)).unwrap();
        t.remove_column(col).unwrap();
        assert_eq!(t.primary_key_column(), None);
    }
}
