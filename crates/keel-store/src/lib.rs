//! Storage engine consumed by the keel object store.
//!
//! This crate provides the `Group`/`Table` model the schema-evolution core
//! drives: tables with typed columns, link columns, search indexes, primary
//! keys, and table types. Storage is in memory, with a serde_json snapshot
//! format so a group can be persisted to and reloaded from a file. The
//! snapshot stands in for the real on-disk format the same way an in-memory
//! backend stands in for a B-tree layer during bring-up; everything above
//! this crate is written against the `Group` API only.

pub mod db;
pub mod group;
pub mod table;
pub mod value;

pub use db::Db;
pub use group::Group;
pub use table::{Column, Table};
pub use value::{ColumnType, ObjKey, Value};
