//! [`Schema`]: an ordered collection of object schemas, plus the schema
//! modes under which deltas are applied.

use keel_error::{format_error_list, KeelError, Result};

use crate::object_schema::{ObjectSchema, TableType};
use crate::property::{BaseType, IndexKind, Property};

/// The policy under which schema deltas are verified and applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaMode {
    /// Apply non-migration deltas if the version is unchanged; otherwise
    /// require a version increase and run the migration callback.
    Automatic,
    /// No writes at all; verify that the file is compatible.
    Immutable,
    /// No writes; slightly looser compatibility checks than `Immutable`.
    ReadOnly,
    /// Delete the file contents and recreate if incompatible.
    SoftResetFile,
    /// Unconditionally recreate the file contents.
    HardResetFile,
    /// Accept additions and index changes silently; the authoritative
    /// schema is discovered from disk.
    AdditiveDiscovered,
    /// Accept additions and index changes silently; the schema is
    /// explicitly declared by the caller.
    AdditiveExplicit,
    /// The caller owns the full migration; the engine only runs the
    /// callback and re-verifies.
    Manual,
}

impl SchemaMode {
    /// Name used in log output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Automatic => "Automatic",
            Self::Immutable => "Immutable",
            Self::ReadOnly => "ReadOnly",
            Self::SoftResetFile => "SoftResetFile",
            Self::HardResetFile => "HardResetFile",
            Self::AdditiveDiscovered => "AdditiveDiscovered",
            Self::AdditiveExplicit => "AdditiveExplicit",
            Self::Manual => "Manual",
        }
    }

    /// Whether this is one of the two additive policies.
    #[must_use]
    pub const fn is_additive(self) -> bool {
        matches!(self, Self::AdditiveDiscovered | Self::AdditiveExplicit)
    }
}

/// An ordered collection of [`ObjectSchema`], keyed by class name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    objects: Vec<ObjectSchema>,
}

impl Schema {
    /// Build a schema from object schemas, sorting them by name.
    ///
    /// Duplicate names are preserved here and reported by [`Schema::validate`].
    #[must_use]
    pub fn new(mut objects: Vec<ObjectSchema>) -> Self {
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Self { objects }
    }

    /// The empty schema.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Look up a class by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ObjectSchema> {
        self.objects
            .binary_search_by(|obj| obj.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.objects[idx])
    }

    /// Mutable lookup by name.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut ObjectSchema> {
        self.objects
            .binary_search_by(|obj| obj.name.as_str().cmp(name))
            .ok()
            .map(move |idx| &mut self.objects[idx])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ObjectSchema> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ObjectSchema> {
        self.objects.iter_mut()
    }

    /// Check the schema for internal consistency.
    ///
    /// All problems are collected and reported in a single
    /// [`KeelError::SchemaValidationFailed`] so the caller can fix
    /// everything at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        for pair in self.objects.windows(2) {
            if pair[0].name == pair[1].name {
                problems.push(format!("Type '{}' appears more than once in the schema.", pair[0].name));
            }
        }

        for object in &self.objects {
            self.validate_object(object, &mut problems);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(KeelError::SchemaValidationFailed {
                message: format_error_list(
                    "Schema validation failed due to the following errors:",
                    &problems,
                ),
            })
        }
    }

    fn validate_object(&self, object: &ObjectSchema, problems: &mut Vec<String>) {
        let all_props = object
            .persisted_properties
            .iter()
            .chain(&object.computed_properties);
        let mut seen: Vec<&str> = Vec::new();
        let mut primary_count = 0_usize;
        for prop in all_props {
            if seen.contains(&prop.name.as_str()) {
                problems.push(format!(
                    "Property '{}.{}' appears more than once in the schema.",
                    object.name, prop.name
                ));
            }
            seen.push(&prop.name);
            if prop.is_primary {
                primary_count += 1;
            }
            self.validate_property(object, prop, problems);
        }

        if primary_count > 1 {
            problems.push(format!(
                "Class '{}' declares more than one primary key property.",
                object.name
            ));
        }

        if let Some(pk) = &object.primary_key {
            if object
                .persisted_properties
                .iter()
                .all(|prop| &prop.name != pk)
            {
                problems.push(format!(
                    "Specified primary key '{}.{}' does not exist.",
                    object.name, pk
                ));
            }
            if object.table_type == TableType::Embedded {
                problems.push(format!(
                    "Embedded object type '{}' cannot have a primary key.",
                    object.name
                ));
            }
            if let Some(pk_prop) = object.primary_key_property() {
                let base_ok = matches!(
                    pk_prop.ty.base(),
                    BaseType::Int | BaseType::String | BaseType::ObjectId | BaseType::Uuid
                );
                if !base_ok || pk_prop.ty.is_collection() {
                    problems.push(format!(
                        "Property '{}.{}' of type '{}' cannot be made the primary key.",
                        object.name,
                        pk_prop.name,
                        pk_prop.type_string()
                    ));
                }
            }
        }
    }

    fn validate_property(&self, object: &ObjectSchema, prop: &Property, problems: &mut Vec<String>) {
        if prop.ty.base() == BaseType::Object && prop.ty.is_collection() && prop.ty.is_nullable() {
            problems.push(format!(
                "Property '{}.{}' of type '{}' cannot be nullable.",
                object.name,
                prop.name,
                prop.type_string()
            ));
        }

        match prop.ty.base() {
            BaseType::Object | BaseType::LinkingObjects => match prop.object_type.as_deref() {
                None | Some("") => problems.push(format!(
                    "Property '{}.{}' of type '{}' must have a target object type.",
                    object.name,
                    prop.name,
                    prop.ty.base().name()
                )),
                Some(target) => {
                    if self.find(target).is_none() {
                        problems.push(format!(
                            "Target type '{}' doesn't exist for property '{}.{}'.",
                            target, object.name, prop.name
                        ));
                    }
                }
            },
            _ => {
                if prop.object_type.is_some() {
                    problems.push(format!(
                        "Property '{}.{}' of type '{}' cannot have a target object type.",
                        object.name,
                        prop.name,
                        prop.ty.base().name()
                    ));
                }
            }
        }

        if prop.requested_index() == Some(IndexKind::General) && !base_is_indexable(prop.ty.base())
            || prop.ty.is_collection() && prop.requested_index().is_some()
        {
            problems.push(format!(
                "Property '{}.{}' of type '{}' cannot be indexed.",
                object.name,
                prop.name,
                prop.type_string()
            ));
        }

        if prop.is_fulltext_indexed
            && (prop.ty.base() != BaseType::String || prop.ty.is_collection())
        {
            problems.push(format!(
                "Property '{}.{}' of type '{}' cannot be full-text indexed.",
                object.name,
                prop.name,
                prop.type_string()
            ));
        }
    }
}

const fn base_is_indexable(base: BaseType) -> bool {
    matches!(
        base,
        BaseType::Int
            | BaseType::Bool
            | BaseType::String
            | BaseType::Date
            | BaseType::ObjectId
            | BaseType::Uuid
            | BaseType::Mixed
    )
}

impl FromIterator<ObjectSchema> for Schema {
    fn from_iter<I: IntoIterator<Item = ObjectSchema>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Schema {
    type Item = ObjectSchema;
    type IntoIter = std::vec::IntoIter<ObjectSchema>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.into_iter()
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a ObjectSchema;
    type IntoIter = std::slice::Iter<'a, ObjectSchema>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}
