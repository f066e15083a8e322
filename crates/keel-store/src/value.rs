//! Column types and cell values.

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU64;

use keel_types::CollectionType;

/// The storage-level type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ColumnType {
    Int,
    Bool,
    Float,
    Double,
    String,
    Timestamp,
    Binary,
    ObjectId,
    Decimal,
    Uuid,
    Mixed,
    /// A reference to an object in another table. Created through
    /// [`crate::Table::add_link_column`], never directly.
    Link,
}

/// Opaque handle to one object (row) within a table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct ObjKey(NonZeroU64);

impl ObjKey {
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ObjKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One cell value.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Bool(bool),
    Float(f32),
    Double(f64),
    String(String),
    /// Nanoseconds since the Unix epoch.
    Timestamp(i64),
    Binary(Vec<u8>),
    ObjectId([u8; 12]),
    /// Raw IEEE 754-2008 decimal128 bits.
    Decimal([u8; 16]),
    Uuid([u8; 16]),
    Link(ObjKey),
    List(Vec<Value>),
    Dictionary(BTreeMap<String, Value>),
}

impl Value {
    /// The zero value stored in a required scalar cell that was never set.
    #[must_use]
    pub fn zero_for(ty: ColumnType) -> Self {
        match ty {
            ColumnType::Int => Self::Int(0),
            ColumnType::Bool => Self::Bool(false),
            ColumnType::Float => Self::Float(0.0),
            ColumnType::Double => Self::Double(0.0),
            ColumnType::String => Self::String(String::new()),
            ColumnType::Timestamp => Self::Timestamp(0),
            ColumnType::Binary => Self::Binary(Vec::new()),
            ColumnType::ObjectId => Self::ObjectId([0; 12]),
            ColumnType::Decimal => Self::Decimal([0; 16]),
            ColumnType::Uuid => Self::Uuid([0; 16]),
            // Mixed and links have no zero; an unset cell reads as null.
            ColumnType::Mixed | ColumnType::Link => Self::Null,
        }
    }

    /// The value an unset cell reads as, given the column shape.
    #[must_use]
    pub fn default_for(ty: ColumnType, nullable: bool, collection: Option<CollectionType>) -> Self {
        match collection {
            Some(CollectionType::List | CollectionType::Set) => Self::List(Vec::new()),
            Some(CollectionType::Dictionary) => Self::Dictionary(BTreeMap::new()),
            None if nullable => Self::Null,
            None => Self::zero_for(ty),
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_link(&self) -> Option<ObjKey> {
        match self {
            Self::Link(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_column_shape() {
        assert_eq!(Value::default_for(ColumnType::Int, false, None), Value::Int(0));
        assert_eq!(Value::default_for(ColumnType::Int, true, None), Value::Null);
        assert_eq!(
            Value::default_for(ColumnType::Int, false, Some(CollectionType::List)),
            Value::List(Vec::new())
        );
        assert_eq!(
            Value::default_for(ColumnType::String, false, Some(CollectionType::Dictionary)),
            Value::Dictionary(BTreeMap::new())
        );
    }

    #[test]
    fn unset_mixed_reads_as_null() {
        assert_eq!(Value::default_for(ColumnType::Mixed, false, None), Value::Null);
    }
}
