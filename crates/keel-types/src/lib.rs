//! Schema data model for the keel object store.
//!
//! This crate defines the in-memory description of an object database
//! schema and the classifier that diffs two of them:
//!
//! - [`PropertyType`]: a base kind composed with nullability/collection flags.
//! - [`Property`] / [`ObjectSchema`] / [`Schema`]: one column, one class, and
//!   the ordered collection of classes.
//! - [`SchemaChange`]: one atomic delta between two schemas.
//! - [`Schema::compare`]: the deterministic change classifier.
//!
//! Nothing here touches storage; the opaque [`TableKey`] / [`ColKey`] handles
//! are filled in by the object store once tables exist.

pub mod change;
pub mod object_schema;
pub mod property;
pub mod schema;

pub use change::{needs_migration, SchemaChange};
pub use object_schema::{ObjectSchema, TableType};
pub use property::{BaseType, CollectionType, IndexKind, Property, PropertyFlags, PropertyType};
pub use schema::{Schema, SchemaMode};

use std::fmt;
use std::num::NonZeroU64;

/// Opaque handle to a live storage table.
///
/// Assigned by the storage engine when the table is created and stable for
/// the lifetime of that table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct TableKey(NonZeroU64);

impl TableKey {
    /// Create a table key from a raw non-zero value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Get the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a live storage column.
///
/// Assigned by the storage engine when the column is added and stable until
/// the column is removed. A column removed and re-added (for example by a
/// type change) receives a fresh key; previously captured keys are stale.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct ColKey(NonZeroU64);

impl ColKey {
    /// Create a column key from a raw non-zero value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Get the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ColKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
