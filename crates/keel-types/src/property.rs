//! Property types and the [`Property`] descriptor.

use std::fmt;

use crate::ColKey;

/// Base scalar kind of a property, before flags are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Int,
    Bool,
    Float,
    Double,
    String,
    Date,
    Data,
    ObjectId,
    Decimal,
    Uuid,
    Mixed,
    /// A forward link to another object type. Requires a named target.
    Object,
    /// A computed inverse link. Never materialised as a storage column.
    LinkingObjects,
}

impl BaseType {
    /// The lowercase name used in user-facing messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Date => "date",
            Self::Data => "data",
            Self::ObjectId => "object id",
            Self::Decimal => "decimal128",
            Self::Uuid => "uuid",
            Self::Mixed => "mixed",
            Self::Object => "object",
            Self::LinkingObjects => "linking objects",
        }
    }
}

bitflags::bitflags! {
    /// Flag bits composed onto a [`BaseType`].
    ///
    /// At most one of the collection bits may be set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u8 {
        const NULLABLE   = 0b0001;
        const ARRAY      = 0b0010;
        const SET        = 0b0100;
        const DICTIONARY = 0b1000;
    }
}

impl PropertyFlags {
    /// The collection bits only.
    pub const COLLECTION: Self = Self::ARRAY.union(Self::SET).union(Self::DICTIONARY);
}

/// The collection shape of a property or column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CollectionType {
    List,
    Set,
    Dictionary,
}

/// Which kind of search index a property carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum IndexKind {
    /// Ordinary value index.
    General,
    /// Full-text index over string content.
    Fulltext,
}

/// A property type: base kind plus nullability/collection flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyType {
    base: BaseType,
    flags: PropertyFlags,
}

impl PropertyType {
    /// A plain required scalar of the given base kind.
    #[must_use]
    pub const fn new(base: BaseType) -> Self {
        Self {
            base,
            flags: PropertyFlags::empty(),
        }
    }

    /// A type with explicit flags.
    #[must_use]
    pub const fn with_flags(base: BaseType, flags: PropertyFlags) -> Self {
        Self { base, flags }
    }

    /// The base kind with flags stripped.
    #[must_use]
    pub const fn base(self) -> BaseType {
        self.base
    }

    /// The flag bits.
    #[must_use]
    pub const fn flags(self) -> PropertyFlags {
        self.flags
    }

    #[must_use]
    pub const fn is_nullable(self) -> bool {
        self.flags.contains(PropertyFlags::NULLABLE)
    }

    #[must_use]
    pub const fn is_array(self) -> bool {
        self.flags.contains(PropertyFlags::ARRAY)
    }

    #[must_use]
    pub const fn is_set(self) -> bool {
        self.flags.contains(PropertyFlags::SET)
    }

    #[must_use]
    pub const fn is_dictionary(self) -> bool {
        self.flags.contains(PropertyFlags::DICTIONARY)
    }

    #[must_use]
    pub const fn is_collection(self) -> bool {
        self.flags.intersects(PropertyFlags::COLLECTION)
    }

    /// The collection shape, if any.
    #[must_use]
    pub const fn collection(self) -> Option<CollectionType> {
        if self.is_array() {
            Some(CollectionType::List)
        } else if self.is_set() {
            Some(CollectionType::Set)
        } else if self.is_dictionary() {
            Some(CollectionType::Dictionary)
        } else {
            None
        }
    }

    /// The same type with the nullable bit set.
    #[must_use]
    pub const fn make_nullable(self) -> Self {
        Self {
            base: self.base,
            flags: self.flags.union(PropertyFlags::NULLABLE),
        }
    }

    /// The same type with the nullable bit cleared.
    #[must_use]
    pub const fn make_required(self) -> Self {
        Self {
            base: self.base,
            flags: self.flags.difference(PropertyFlags::NULLABLE),
        }
    }

    /// Whether two types describe the same column shape, ignoring
    /// nullability. Nullability differences are classified separately.
    #[must_use]
    pub fn same_shape(self, other: Self) -> bool {
        self.base == other.base
            && self.flags & PropertyFlags::COLLECTION == other.flags & PropertyFlags::COLLECTION
    }
}

impl From<BaseType> for PropertyType {
    fn from(base: BaseType) -> Self {
        Self::new(base)
    }
}

/// One field within an object schema, equivalent to a column.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub ty: PropertyType,
    /// Target object type. Required when `ty` is `Object` or
    /// `LinkingObjects`, absent otherwise.
    pub object_type: Option<String>,
    pub is_primary: bool,
    pub is_indexed: bool,
    pub is_fulltext_indexed: bool,
    /// Live storage handle, filled in after the property is bound to a
    /// table. Stale after the column is removed and re-added.
    pub column_key: Option<ColKey>,
}

impl Property {
    /// A plain required property.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: impl Into<PropertyType>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            object_type: None,
            is_primary: false,
            is_indexed: false,
            is_fulltext_indexed: false,
            column_key: None,
        }
    }

    /// A forward link property to `target`.
    #[must_use]
    pub fn object(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut prop = Self::new(name, PropertyType::new(BaseType::Object).make_nullable());
        prop.object_type = Some(target.into());
        prop
    }

    /// A computed inverse-link property to `target`.
    #[must_use]
    pub fn linking_objects(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut prop = Self::new(
            name,
            PropertyType::with_flags(BaseType::LinkingObjects, PropertyFlags::ARRAY),
        );
        prop.object_type = Some(target.into());
        prop
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.ty = self.ty.make_nullable();
        self
    }

    #[must_use]
    pub fn collected(mut self, collection: CollectionType) -> Self {
        let flag = match collection {
            CollectionType::List => PropertyFlags::ARRAY,
            CollectionType::Set => PropertyFlags::SET,
            CollectionType::Dictionary => PropertyFlags::DICTIONARY,
        };
        let mut flags = self.ty.flags() | flag;
        // Collections of links are never nullable; the scalar-link default
        // does not carry over.
        if self.ty.base() == BaseType::Object {
            flags -= PropertyFlags::NULLABLE;
        }
        self.ty = PropertyType::with_flags(self.ty.base(), flags);
        self
    }

    #[must_use]
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.is_indexed = true;
        self
    }

    #[must_use]
    pub fn fulltext_indexed(mut self) -> Self {
        self.is_fulltext_indexed = true;
        self
    }

    /// Whether this property is computed rather than persisted.
    #[must_use]
    pub const fn is_computed(&self) -> bool {
        matches!(self.ty.base(), BaseType::LinkingObjects)
    }

    /// The index kind this property declares, if any.
    #[must_use]
    pub const fn requested_index(&self) -> Option<IndexKind> {
        if self.is_fulltext_indexed {
            Some(IndexKind::Fulltext)
        } else if self.is_indexed {
            Some(IndexKind::General)
        } else {
            None
        }
    }

    /// The human-readable type name used in error messages.
    #[must_use]
    pub fn type_string(&self) -> String {
        let base = match self.ty.base() {
            BaseType::Object => {
                format!("<{}>", self.object_type.as_deref().unwrap_or_default())
            }
            BaseType::LinkingObjects => {
                format!(
                    "linking objects<{}>",
                    self.object_type.as_deref().unwrap_or_default()
                )
            }
            other => other.name().to_owned(),
        };
        match self.ty.collection() {
            Some(CollectionType::List) => format!("array<{base}>"),
            Some(CollectionType::Set) => format!("set<{base}>"),
            Some(CollectionType::Dictionary) => format!("dictionary<string, {base}>"),
            None => base,
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.type_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_strings_use_lowercase_base_names() {
        assert_eq!(Property::new("age", BaseType::Int).type_string(), "int");
        assert_eq!(Property::new("name", BaseType::String).type_string(), "string");
        assert_eq!(Property::new("id", BaseType::ObjectId).type_string(), "object id");
        assert_eq!(Property::new("price", BaseType::Decimal).type_string(), "decimal128");
    }

    #[test]
    fn type_strings_wrap_collections() {
        let tags = Property::new("tags", BaseType::String).collected(CollectionType::List);
        assert_eq!(tags.type_string(), "array<string>");

        let scores = Property::new("scores", BaseType::Int).collected(CollectionType::Dictionary);
        assert_eq!(scores.type_string(), "dictionary<string, int>");

        let owners = Property::object("owner", "Person").collected(CollectionType::Set);
        assert_eq!(owners.type_string(), "set<<Person>>");
    }

    #[test]
    fn linking_objects_are_computed() {
        let inverse = Property::linking_objects("owners", "Person");
        assert!(inverse.is_computed());
        assert_eq!(inverse.type_string(), "array<linking objects<Person>>");
    }

    #[test]
    fn nullability_round_trips_through_flags() {
        let ty = PropertyType::new(BaseType::Int);
        assert!(!ty.is_nullable());
        let nullable = ty.make_nullable();
        assert!(nullable.is_nullable());
        assert_eq!(nullable.make_required(), ty);
        assert!(nullable.same_shape(ty));
    }

    #[test]
    fn collection_flags_are_distinguished() {
        let list = PropertyType::with_flags(BaseType::Int, PropertyFlags::ARRAY);
        let set = PropertyType::with_flags(BaseType::Int, PropertyFlags::SET);
        assert_eq!(list.collection(), Some(CollectionType::List));
        assert_eq!(set.collection(), Some(CollectionType::Set));
        assert!(!list.same_shape(set));
    }

    #[test]
    fn requested_index_prefers_fulltext() {
        let prop = Property::new("bio", BaseType::String)
            .indexed()
            .fulltext_indexed();
        assert_eq!(prop.requested_index(), Some(IndexKind::Fulltext));
        assert_eq!(
            Property::new("age", BaseType::Int).indexed().requested_index(),
            Some(IndexKind::General)
        );
        assert_eq!(Property::new("age", BaseType::Int).requested_index(), None);
    }
}
