//! Bijection between object-type names and physical table names.

use keel_store::Group;
use keel_types::TableKey;

/// Prefix carried by every user-visible object table.
pub const OBJECT_TABLE_PREFIX: &str = "class_";

/// The physical table name for an object type.
#[must_use]
pub fn table_name_for_object_type(object_type: &str) -> String {
    format!("{OBJECT_TABLE_PREFIX}{object_type}")
}

/// The object type encoded in a physical table name, if any.
#[must_use]
pub fn object_type_for_table_name(table_name: &str) -> Option<&str> {
    table_name.strip_prefix(OBJECT_TABLE_PREFIX)
}

/// Whether a decoded object type names an internal table that must stay
/// invisible to schema discovery.
#[must_use]
pub(crate) fn is_internal_object_type(object_type: &str) -> bool {
    object_type.is_empty() || object_type.starts_with("__")
}

/// Key of the table backing `object_type`, if it exists.
#[must_use]
pub fn table_key_for_object_type(group: &Group, object_type: &str) -> Option<TableKey> {
    group.key_for_name(&table_name_for_object_type(object_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_round_trips() {
        assert_eq!(table_name_for_object_type("Dog"), "class_Dog");
        assert_eq!(object_type_for_table_name("class_Dog"), Some("Dog"));
        assert_eq!(object_type_for_table_name("metadata"), None);
    }

    #[test]
    fn internal_types_are_detected() {
        assert!(is_internal_object_type(""));
        assert!(is_internal_object_type("__history"));
        assert!(!is_internal_object_type("Dog"));
    }
}
