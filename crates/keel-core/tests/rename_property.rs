//! Precondition coverage for data-preserving property renames.

use keel_core::{apply_schema_changes, get_schema_version, rename_property, schema_from_group};
use keel_error::ErrorCode;
use keel_store::{Group, Value};
use keel_types::{BaseType, ObjectSchema, Property, Schema, SchemaMode, TableType};

fn seed(group: &mut Group, objects: Vec<ObjectSchema>, version: u64) -> Schema {
    let mut target = Schema::new(objects);
    let changes = schema_from_group(group).compare(&target, SchemaMode::Automatic, false);
    let stored = get_schema_version(group);
    apply_schema_changes(
        group,
        stored,
        &mut target,
        version,
        SchemaMode::Automatic,
        &changes,
        false,
        None,
        false,
    )
    .unwrap();
    target
}

fn dog_with(props: Vec<Property>) -> Vec<ObjectSchema> {
    vec![ObjectSchema::new("Dog", TableType::TopLevel, props)]
}

#[test]
fn rename_fails_for_missing_table() {
    let mut group = Group::new();
    let mut target = Schema::new(dog_with(vec![Property::new("name", BaseType::String)]));

    let err = rename_property(&mut group, &mut target, "Dog", "a", "b").unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::NoSuchTable);
    assert_eq!(
        err.to_string(),
        "Cannot rename properties for type 'Dog' because it does not exist."
    );
}

#[test]
fn rename_fails_for_type_missing_from_target_schema() {
    let mut group = Group::new();
    seed(
        &mut group,
        dog_with(vec![Property::new("name", BaseType::String)]),
        1,
    );
    let mut target = Schema::empty();

    let err = rename_property(&mut group, &mut target, "Dog", "name", "title").unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::NoSuchTable);
    assert_eq!(
        err.to_string(),
        "Cannot rename properties for type 'Dog' because it has been removed from the Realm."
    );
}

#[test]
fn rename_fails_when_source_property_still_declared() {
    let mut group = Group::new();
    let mut target = seed(
        &mut group,
        dog_with(vec![Property::new("name", BaseType::String)]),
        1,
    );

    let err = rename_property(&mut group, &mut target, "Dog", "name", "title").unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::IllegalOperation);
    assert_eq!(
        err.to_string(),
        "Cannot rename property 'Dog.name' to 'title' because the source property still exists."
    );
}

#[test]
fn rename_fails_when_source_column_missing_on_disk() {
    let mut group = Group::new();
    seed(
        &mut group,
        dog_with(vec![Property::new("name", BaseType::String)]),
        1,
    );
    let mut target = Schema::new(dog_with(vec![Property::new("title", BaseType::String)]));

    let err = rename_property(&mut group, &mut target, "Dog", "missing", "title").unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidProperty);
    assert_eq!(
        err.to_string(),
        "Cannot rename property 'Dog.missing' because it does not exist."
    );
}

#[test]
fn rename_to_absent_column_renames_in_place() {
    let mut group = Group::new();
    seed(
        &mut group,
        dog_with(vec![Property::new("name", BaseType::String)]),
        1,
    );
    let mut target = Schema::new(dog_with(vec![Property::new("title", BaseType::String)]));

    // "interim" exists in neither the target nor the table: multi-step rename.
    rename_property(&mut group, &mut target, "Dog", "name", "interim").unwrap();
    let table = group.table_for_name("class_Dog").unwrap();
    assert!(table.column_key_for_name("interim").is_some());
    assert!(table.column_key_for_name("name").is_none());
}

#[test]
fn rename_fails_on_type_mismatch() {
    let mut group = Group::new();
    seed(
        &mut group,
        dog_with(vec![
            Property::new("name", BaseType::String),
            Property::new("title", BaseType::Int),
        ]),
        1,
    );
    let mut target = Schema::new(dog_with(vec![Property::new("title", BaseType::Int)]));

    let err = rename_property(&mut group, &mut target, "Dog", "name", "title").unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::IllegalOperation);
    assert_eq!(
        err.to_string(),
        "Cannot rename property 'Dog.name' to 'title' because it would change from type 'string' to 'int'."
    );
}

#[test]
fn rename_fails_when_nullability_would_shrink() {
    let mut group = Group::new();
    seed(
        &mut group,
        dog_with(vec![
            Property::new("name", BaseType::String).nullable(),
            Property::new("title", BaseType::String),
        ]),
        1,
    );
    let mut target = Schema::new(dog_with(vec![Property::new("title", BaseType::String)]));

    let err = rename_property(&mut group, &mut target, "Dog", "name", "title").unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::IllegalOperation);
    assert_eq!(
        err.to_string(),
        "Cannot rename property 'Dog.name' to 'title' because it would change from optional to required."
    );
}

#[test]
fn rename_reuses_the_old_column_and_widens_when_needed() {
    let mut group = Group::new();
    seed(
        &mut group,
        dog_with(vec![
            Property::new("name", BaseType::String),
            Property::new("title", BaseType::String).nullable(),
        ]),
        1,
    );
    let old_col = {
        let table = group.table_for_name_mut("class_Dog").unwrap();
        let col = table.column_key_for_name("name").unwrap();
        let obj = table.create_object();
        table.set_value(obj, col, Value::String("rex".to_owned())).unwrap();
        col
    };

    let mut target = Schema::new(dog_with(vec![
        Property::new("title", BaseType::String).nullable()
    ]));
    rename_property(&mut group, &mut target, "Dog", "name", "title").unwrap();

    let table = group.table_for_name("class_Dog").unwrap();
    let col = table.column_key_for_name("title").unwrap();
    assert_eq!(col, old_col, "the old column is reused");
    let obj = table.object_keys()[0];
    assert_eq!(table.value(obj, col), Some(Value::String("rex".to_owned())));
    assert!(table.column(col).unwrap().nullable, "column was widened");

    let bound = target.find("Dog").unwrap();
    assert_eq!(bound.persisted_properties[0].column_key, Some(old_col));
}
