//! [`ObjectSchema`]: the named shape of one kind of object.

use std::fmt;

use crate::property::Property;
use crate::TableKey;

/// How a class is realised as a physical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TableType {
    /// An ordinary queryable class.
    TopLevel,
    /// A write-only class whose objects are consumed by the server.
    TopLevelAsymmetric,
    /// A class whose objects live inside exactly one parent object.
    Embedded,
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TopLevel => "TopLevel",
            Self::TopLevelAsymmetric => "TopLevelAsymmetric",
            Self::Embedded => "Embedded",
        })
    }
}

/// The schema of one class: its name, table type, and properties.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    pub name: String,
    pub table_type: TableType,
    /// Properties realised as storage columns, in declaration order.
    pub persisted_properties: Vec<Property>,
    /// Computed properties (inverse links); never stored.
    pub computed_properties: Vec<Property>,
    /// Name of the primary-key property, if any.
    pub primary_key: Option<String>,
    /// Live storage handle, filled in after binding.
    pub table_key: Option<TableKey>,
}

impl ObjectSchema {
    /// Build an object schema, partitioning `properties` into persisted and
    /// computed and deriving `primary_key` from any property flagged primary.
    #[must_use]
    pub fn new(name: impl Into<String>, table_type: TableType, properties: Vec<Property>) -> Self {
        let (computed, persisted): (Vec<_>, Vec<_>) =
            properties.into_iter().partition(Property::is_computed);
        let primary_key = persisted
            .iter()
            .find(|prop| prop.is_primary)
            .map(|prop| prop.name.clone());
        Self {
            name: name.into(),
            table_type,
            persisted_properties: persisted,
            computed_properties: computed,
            primary_key,
            table_key: None,
        }
    }

    /// Look up a property by name, persisted properties first.
    #[must_use]
    pub fn property_for_name(&self, name: &str) -> Option<&Property> {
        self.persisted_properties
            .iter()
            .chain(&self.computed_properties)
            .find(|prop| prop.name == name)
    }

    /// Mutable lookup over persisted properties only.
    pub fn persisted_property_for_name_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.persisted_properties
            .iter_mut()
            .find(|prop| prop.name == name)
    }

    /// The primary-key property, if one is declared and present.
    #[must_use]
    pub fn primary_key_property(&self) -> Option<&Property> {
        self.primary_key
            .as_deref()
            .and_then(|pk| self.persisted_properties.iter().find(|prop| prop.name == pk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::BaseType;

    #[test]
    fn new_partitions_computed_properties() {
        let schema = ObjectSchema::new(
            "Person",
            TableType::TopLevel,
            vec![
                Property::new("name", BaseType::String),
                Property::linking_objects("dogs", "Dog"),
            ],
        );
        assert_eq!(schema.persisted_properties.len(), 1);
        assert_eq!(schema.computed_properties.len(), 1);
        assert!(schema.property_for_name("dogs").is_some());
        assert!(schema.primary_key.is_none());
    }

    #[test]
    fn new_derives_primary_key_from_flag() {
        let schema = ObjectSchema::new(
            "Person",
            TableType::TopLevel,
            vec![
                Property::new("id", BaseType::Int).primary(),
                Property::new("name", BaseType::String),
            ],
        );
        assert_eq!(schema.primary_key.as_deref(), Some("id"));
        let pk = schema.primary_key_property().map(|p| p.name.as_str());
        assert_eq!(pk, Some("id"));
    }

    #[test]
    fn table_type_display_matches_message_catalogue() {
        assert_eq!(TableType::TopLevel.to_string(), "TopLevel");
        assert_eq!(TableType::Embedded.to_string(), "Embedded");
        assert_eq!(TableType::TopLevelAsymmetric.to_string(), "TopLevelAsymmetric");
    }
}
