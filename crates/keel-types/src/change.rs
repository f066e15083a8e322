//! [`SchemaChange`]: one atomic delta between two schemas, and the
//! classifier that produces an ordered sequence of them.

use crate::object_schema::{ObjectSchema, TableType};
use crate::property::{IndexKind, Property};
use crate::schema::{Schema, SchemaMode};

/// One atomic difference between an on-disk schema and a target schema.
///
/// Payloads are deep copies of the schema objects they describe, so a change
/// list remains valid even after the schema it was computed from is
/// re-read or mutated by a migration callback.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaChange {
    /// A class exists in the target but not on disk.
    AddTable { object: ObjectSchema },
    /// A class exists on disk but not in the target.
    RemoveTable { object: ObjectSchema },
    /// A class changed its table type.
    ChangeTableType {
        object: String,
        old_table_type: TableType,
        new_table_type: TableType,
    },
    /// Populate the columns of a freshly added class. Always preceded by
    /// the `AddTable` for the same class, and by the `AddTable` of every
    /// other new class so link columns can resolve their target tables.
    AddInitialProperties { object: ObjectSchema },
    /// A property exists in the target but not on disk, for a class that
    /// already exists on disk.
    AddProperty { object: String, property: Property },
    /// A property exists on disk but not in the target.
    RemoveProperty { object: String, property: Property },
    /// A property changed its base type, collection shape, or link target.
    ChangePropertyType {
        object: String,
        old_property: Property,
        new_property: Property,
    },
    /// A required property became optional.
    MakePropertyNullable { object: String, property: Property },
    /// An optional property became required.
    MakePropertyRequired { object: String, property: Property },
    /// The primary key was added, removed, or rebound. `property` is the new
    /// primary-key property; `None` means the primary key is being removed.
    ChangePrimaryKey {
        object: String,
        old_primary_key: Option<String>,
        property: Option<Property>,
    },
    /// A search index must be created.
    AddIndex {
        object: String,
        property: Property,
        kind: IndexKind,
    },
    /// A search index must be removed.
    RemoveIndex { object: String, property: Property },
}

/// Whether any change in the sequence forces a migration.
///
/// Index changes and table additions are purely additive; everything that
/// reshapes existing data requires a migration.
#[must_use]
pub fn needs_migration(changes: &[SchemaChange]) -> bool {
    changes.iter().any(|change| {
        matches!(
            change,
            SchemaChange::AddProperty { .. }
                | SchemaChange::RemoveProperty { .. }
                | SchemaChange::ChangeTableType { .. }
                | SchemaChange::ChangePrimaryKey { .. }
                | SchemaChange::ChangePropertyType { .. }
                | SchemaChange::MakePropertyNullable { .. }
                | SchemaChange::MakePropertyRequired { .. }
        )
    })
}

impl Schema {
    /// Classify the differences between `self` (the current, on-disk schema)
    /// and `target`.
    ///
    /// The output is deterministic: classes are visited in name order and
    /// properties in the declaration order of the side that owns them.
    /// Every `AddTable` is emitted before any `AddInitialProperties`, so an
    /// applicator has created all new tables before it adds columns that
    /// link between them; per-class, `AddTable` strictly precedes
    /// `AddInitialProperties`, which strictly precedes any other change
    /// against that class.
    ///
    /// `RemoveTable` entries are only produced when `include_table_removals`
    /// is set and the mode is not additive; additive modes treat on-disk
    /// classes missing from the target as belonging to someone else.
    #[must_use]
    pub fn compare(
        &self,
        target: &Schema,
        mode: SchemaMode,
        include_table_removals: bool,
    ) -> Vec<SchemaChange> {
        let mut changes = Vec::new();

        zip_matching(self, target, |existing, target_object| {
            match (existing, target_object) {
                (Some(existing), Some(target_object)) => {
                    if existing.table_type != target_object.table_type {
                        changes.push(SchemaChange::ChangeTableType {
                            object: existing.name.clone(),
                            old_table_type: existing.table_type,
                            new_table_type: target_object.table_type,
                        });
                    }
                }
                (None, Some(target_object)) => {
                    changes.push(SchemaChange::AddTable {
                        object: target_object.clone(),
                    });
                }
                (Some(existing), None) => {
                    if include_table_removals && !mode.is_additive() {
                        changes.push(SchemaChange::RemoveTable {
                            object: existing.clone(),
                        });
                    }
                }
                (None, None) => unreachable!("zip_matching always yields at least one side"),
            }
        });

        zip_matching(self, target, |existing, target_object| {
            match (existing, target_object) {
                (Some(existing), Some(target_object)) => {
                    compare_object_schemas(existing, target_object, &mut changes);
                }
                (None, Some(target_object)) => {
                    changes.push(SchemaChange::AddInitialProperties {
                        object: target_object.clone(),
                    });
                }
                _ => {}
            }
        });

        changes
    }
}

/// Walk two name-sorted schemas in lockstep, invoking `f` with the matching
/// pair, or with one side `None` where a class exists on only one side.
fn zip_matching(
    existing: &Schema,
    target: &Schema,
    mut f: impl FnMut(Option<&ObjectSchema>, Option<&ObjectSchema>),
) {
    let mut left = existing.iter().peekable();
    let mut right = target.iter().peekable();
    loop {
        match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => match l.name.cmp(&r.name) {
                std::cmp::Ordering::Equal => {
                    f(left.next(), right.next());
                }
                std::cmp::Ordering::Less => f(left.next(), None),
                std::cmp::Ordering::Greater => f(None, right.next()),
            },
            (Some(_), None) => f(left.next(), None),
            (None, Some(_)) => f(None, right.next()),
            (None, None) => break,
        }
    }
}

fn compare_object_schemas(
    existing: &ObjectSchema,
    target: &ObjectSchema,
    changes: &mut Vec<SchemaChange>,
) {
    for current_prop in &existing.persisted_properties {
        let Some(target_prop) = target.property_for_name(&current_prop.name) else {
            changes.push(SchemaChange::RemoveProperty {
                object: existing.name.clone(),
                property: current_prop.clone(),
            });
            continue;
        };
        if target_prop.is_computed() {
            // Persisted on disk, computed in the target: the column goes away.
            changes.push(SchemaChange::RemoveProperty {
                object: existing.name.clone(),
                property: current_prop.clone(),
            });
            continue;
        }
        if !current_prop.ty.same_shape(target_prop.ty)
            || current_prop.object_type != target_prop.object_type
        {
            changes.push(SchemaChange::ChangePropertyType {
                object: existing.name.clone(),
                old_property: current_prop.clone(),
                new_property: target_prop.clone(),
            });
            continue;
        }
        if current_prop.ty.is_nullable() != target_prop.ty.is_nullable() {
            if current_prop.ty.is_nullable() {
                changes.push(SchemaChange::MakePropertyRequired {
                    object: existing.name.clone(),
                    property: current_prop.clone(),
                });
            } else {
                changes.push(SchemaChange::MakePropertyNullable {
                    object: existing.name.clone(),
                    property: current_prop.clone(),
                });
            }
        }
        let current_index = current_prop.requested_index();
        let target_index = target_prop.requested_index();
        if current_index != target_index {
            if current_index.is_some() {
                changes.push(SchemaChange::RemoveIndex {
                    object: existing.name.clone(),
                    property: current_prop.clone(),
                });
            }
            if let Some(kind) = target_index {
                changes.push(SchemaChange::AddIndex {
                    object: existing.name.clone(),
                    property: current_prop.clone(),
                    kind,
                });
            }
        }
    }

    if existing.primary_key != target.primary_key {
        changes.push(SchemaChange::ChangePrimaryKey {
            object: existing.name.clone(),
            old_primary_key: existing.primary_key.clone(),
            property: target.primary_key_property().cloned(),
        });
    }

    for target_prop in &target.persisted_properties {
        if existing.property_for_name(&target_prop.name).is_none() {
            changes.push(SchemaChange::AddProperty {
                object: existing.name.clone(),
                property: target_prop.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{BaseType, CollectionType};
    use crate::schema::SchemaMode;

    fn dog(props: Vec<Property>) -> ObjectSchema {
        ObjectSchema::new("Dog", TableType::TopLevel, props)
    }

    fn schema_of(objects: Vec<ObjectSchema>) -> Schema {
        Schema::new(objects)
    }

    #[test]
    fn identical_schemas_produce_no_changes() {
        let a = schema_of(vec![dog(vec![Property::new("name", BaseType::String)])]);
        assert!(a.compare(&a, SchemaMode::Automatic, false).is_empty());
    }

    #[test]
    fn new_table_emits_add_table_then_initial_properties() {
        let empty = Schema::empty();
        let target = schema_of(vec![dog(vec![Property::new("name", BaseType::String)])]);
        let changes = empty.compare(&target, SchemaMode::Automatic, false);
        assert_eq!(changes.len(), 2);
        assert!(matches!(&changes[0], SchemaChange::AddTable { object } if object.name == "Dog"));
        assert!(
            matches!(&changes[1], SchemaChange::AddInitialProperties { object } if object.name == "Dog")
        );
    }

    #[test]
    fn all_tables_are_added_before_any_initial_properties() {
        // Author links forward to Zine; both are new. Every AddTable must
        // come first so the link column can resolve its target table.
        let empty = Schema::empty();
        let target = schema_of(vec![
            ObjectSchema::new(
                "Author",
                TableType::TopLevel,
                vec![Property::object("favorite", "Zine")],
            ),
            ObjectSchema::new(
                "Zine",
                TableType::TopLevel,
                vec![Property::new("title", BaseType::String)],
            ),
        ]);
        let changes = empty.compare(&target, SchemaMode::Automatic, false);
        let last_add_table = changes
            .iter()
            .rposition(|c| matches!(c, SchemaChange::AddTable { .. }))
            .unwrap();
        let first_initial = changes
            .iter()
            .position(|c| matches!(c, SchemaChange::AddInitialProperties { .. }))
            .unwrap();
        assert!(last_add_table < first_initial);
    }

    #[test]
    fn new_table_never_co_occurs_with_add_property() {
        let existing = schema_of(vec![dog(vec![Property::new("name", BaseType::String)])]);
        let target = schema_of(vec![
            dog(vec![
                Property::new("name", BaseType::String),
                Property::new("age", BaseType::Int),
            ]),
            ObjectSchema::new(
                "Cat",
                TableType::TopLevel,
                vec![Property::new("name", BaseType::String)],
            ),
        ]);
        let changes = existing.compare(&target, SchemaMode::Automatic, false);
        let mut add_property_objects = Vec::new();
        let mut add_table_objects = Vec::new();
        for change in &changes {
            match change {
                SchemaChange::AddProperty { object, .. } => add_property_objects.push(object.clone()),
                SchemaChange::AddTable { object } => add_table_objects.push(object.name.clone()),
                _ => {}
            }
        }
        assert_eq!(add_table_objects, ["Cat"]);
        assert_eq!(add_property_objects, ["Dog"]);
    }

    #[test]
    fn type_change_is_classified_before_nullability() {
        let existing = schema_of(vec![dog(vec![Property::new("value", BaseType::Int)])]);
        let target = schema_of(vec![dog(vec![
            Property::new("value", BaseType::String).nullable()
        ])]);
        let changes = existing.compare(&target, SchemaMode::Automatic, false);
        assert_eq!(changes.len(), 1);
        assert!(matches!(&changes[0], SchemaChange::ChangePropertyType { .. }));
    }

    #[test]
    fn nullability_differences_classify_in_both_directions() {
        let required = schema_of(vec![dog(vec![Property::new("name", BaseType::String)])]);
        let nullable = schema_of(vec![dog(vec![
            Property::new("name", BaseType::String).nullable()
        ])]);

        let widen = required.compare(&nullable, SchemaMode::Automatic, false);
        assert!(matches!(&widen[0], SchemaChange::MakePropertyNullable { .. }));

        let narrow = nullable.compare(&required, SchemaMode::Automatic, false);
        assert!(matches!(&narrow[0], SchemaChange::MakePropertyRequired { .. }));
    }

    #[test]
    fn collection_shape_change_is_a_type_change() {
        let scalar = schema_of(vec![dog(vec![Property::new("tag", BaseType::String)])]);
        let list = schema_of(vec![dog(vec![
            Property::new("tag", BaseType::String).collected(CollectionType::List)
        ])]);
        let changes = scalar.compare(&list, SchemaMode::Automatic, false);
        assert!(matches!(&changes[0], SchemaChange::ChangePropertyType { .. }));
    }

    #[test]
    fn index_toggles_and_kind_changes() {
        let plain = schema_of(vec![dog(vec![Property::new("name", BaseType::String)])]);
        let indexed = schema_of(vec![dog(vec![
            Property::new("name", BaseType::String).indexed()
        ])]);
        let fulltext = schema_of(vec![dog(vec![
            Property::new("name", BaseType::String).fulltext_indexed()
        ])]);

        let add = plain.compare(&indexed, SchemaMode::Automatic, false);
        assert!(matches!(
            &add[0],
            SchemaChange::AddIndex { kind: IndexKind::General, .. }
        ));

        let remove = indexed.compare(&plain, SchemaMode::Automatic, false);
        assert!(matches!(&remove[0], SchemaChange::RemoveIndex { .. }));

        let switch = indexed.compare(&fulltext, SchemaMode::Automatic, false);
        assert_eq!(switch.len(), 2);
        assert!(matches!(&switch[0], SchemaChange::RemoveIndex { .. }));
        assert!(matches!(
            &switch[1],
            SchemaChange::AddIndex { kind: IndexKind::Fulltext, .. }
        ));
    }

    #[test]
    fn primary_key_changes_carry_old_and_new() {
        let unkeyed = schema_of(vec![dog(vec![Property::new("name", BaseType::String)])]);
        let keyed = schema_of(vec![dog(vec![
            Property::new("name", BaseType::String).primary()
        ])]);

        let add = unkeyed.compare(&keyed, SchemaMode::Automatic, false);
        assert!(matches!(
            &add[0],
            SchemaChange::ChangePrimaryKey { old_primary_key: None, property: Some(_), .. }
        ));

        let remove = keyed.compare(&unkeyed, SchemaMode::Automatic, false);
        assert!(matches!(
            &remove[0],
            SchemaChange::ChangePrimaryKey { old_primary_key: Some(_), property: None, .. }
        ));
    }

    #[test]
    fn persisted_to_computed_is_a_removal() {
        let persisted = schema_of(vec![dog(vec![Property::object("owner", "Dog")])]);
        let computed = schema_of(vec![dog(vec![Property::linking_objects("owner", "Dog")])]);
        let changes = persisted.compare(&computed, SchemaMode::Automatic, false);
        assert!(matches!(&changes[0], SchemaChange::RemoveProperty { .. }));
    }

    #[test]
    fn removed_tables_respect_mode_and_flag() {
        let existing = schema_of(vec![dog(vec![])]);
        let target = Schema::empty();

        assert!(existing
            .compare(&target, SchemaMode::Automatic, false)
            .is_empty());
        assert!(existing
            .compare(&target, SchemaMode::AdditiveDiscovered, true)
            .is_empty());

        let removed = existing.compare(&target, SchemaMode::Automatic, true);
        assert!(matches!(&removed[0], SchemaChange::RemoveTable { object } if object.name == "Dog"));
    }

    #[test]
    fn table_type_change_is_detected() {
        let top_level = schema_of(vec![dog(vec![])]);
        let embedded = schema_of(vec![ObjectSchema::new("Dog", TableType::Embedded, vec![])]);
        let changes = top_level.compare(&embedded, SchemaMode::Automatic, false);
        assert!(matches!(
            &changes[0],
            SchemaChange::ChangeTableType {
                old_table_type: TableType::TopLevel,
                new_table_type: TableType::Embedded,
                ..
            }
        ));
    }

    #[test]
    fn needs_migration_matches_the_seven_variants() {
        let existing = schema_of(vec![dog(vec![
            Property::new("name", BaseType::String),
            Property::new("age", BaseType::Int),
        ])]);

        let additive_target = schema_of(vec![
            dog(vec![
                Property::new("name", BaseType::String).indexed(),
                Property::new("age", BaseType::Int),
            ]),
            ObjectSchema::new("Cat", TableType::TopLevel, vec![]),
        ]);
        let additive = existing.compare(&additive_target, SchemaMode::Automatic, false);
        assert!(!additive.is_empty());
        assert!(!needs_migration(&additive));

        let migrating_target = schema_of(vec![dog(vec![Property::new("name", BaseType::String)])]);
        let migrating = existing.compare(&migrating_target, SchemaMode::Automatic, false);
        assert!(needs_migration(&migrating));
    }
}
