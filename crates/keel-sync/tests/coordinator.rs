//! Mode-aware open behaviour of the realm coordinator.

use std::path::Path;

use keel_core::get_schema_version;
use keel_error::{ErrorCode, KeelError};
use keel_store::Value;
use keel_sync::{RealmConfig, RealmCoordinator};
use keel_types::{BaseType, ObjectSchema, Property, Schema, SchemaMode, TableType};

fn dog_schema(ty: BaseType) -> Schema {
    Schema::new(vec![ObjectSchema::new(
        "Dog",
        TableType::TopLevel,
        vec![Property::new("name", ty)],
    )])
}

fn config_with(path: &Path, schema: Schema, version: u64, mode: SchemaMode) -> RealmConfig {
    let mut config = RealmConfig::new(path);
    config.schema = Some(schema);
    config.schema_version = version;
    config.schema_mode = mode;
    config
}

fn seed_dog_named_rex(path: &Path) {
    let coordinator = RealmCoordinator::get_coordinator(config_with(
        path,
        dog_schema(BaseType::String),
        1,
        SchemaMode::Automatic,
    ));
    let realm = coordinator.get_realm(true).unwrap();
    realm
        .write(|group| {
            let table = group
                .table_for_name_mut("class_Dog")
                .ok_or_else(|| KeelError::Internal("missing table".to_owned()))?;
            let col = table
                .column_key_for_name("name")
                .ok_or_else(|| KeelError::Internal("missing column".to_owned()))?;
            let obj = table.create_object();
            table.set_value(obj, col, Value::String("rex".to_owned()))
        })
        .unwrap();
}

#[test]
fn coordinators_are_shared_per_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pets.realm");
    let config = config_with(&path, dog_schema(BaseType::String), 1, SchemaMode::Automatic);

    let a = RealmCoordinator::get_coordinator(config.clone());
    let b = RealmCoordinator::get_coordinator(config);
    assert!(std::sync::Arc::ptr_eq(&a, &b));
}

#[test]
fn automatic_mode_rejects_version_decrease() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pets.realm");
    seed_dog_named_rex(&path);

    let coordinator = RealmCoordinator::get_coordinator(config_with(
        &path,
        dog_schema(BaseType::String),
        0,
        SchemaMode::Automatic,
    ));
    let err = coordinator.get_realm(true).unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidSchemaVersion);
    assert_eq!(
        err.to_string(),
        "Provided schema version 0 is less than last set version 1."
    );
}

#[test]
fn hard_reset_unconditionally_recreates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pets.realm");
    seed_dog_named_rex(&path);

    let coordinator = RealmCoordinator::get_coordinator(config_with(
        &path,
        dog_schema(BaseType::Int),
        1,
        SchemaMode::HardResetFile,
    ));
    let realm = coordinator.get_realm(true).unwrap();
    realm.read(|group| {
        assert_eq!(get_schema_version(group), 1);
        let table = group.table_for_name("class_Dog").unwrap();
        assert!(table.is_empty(), "previous data is gone");
    });
}

#[test]
fn soft_reset_keeps_compatible_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pets.realm");
    seed_dog_named_rex(&path);

    let coordinator = RealmCoordinator::get_coordinator(config_with(
        &path,
        dog_schema(BaseType::String),
        1,
        SchemaMode::SoftResetFile,
    ));
    let realm = coordinator.get_realm(true).unwrap();
    realm.read(|group| {
        let table = group.table_for_name("class_Dog").unwrap();
        assert_eq!(table.len(), 1, "compatible file is kept");
    });
}

#[test]
fn soft_reset_recreates_incompatible_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pets.realm");
    seed_dog_named_rex(&path);

    // Same version but a different column type: a migration would be
    // required, so the file is reset instead.
    let coordinator = RealmCoordinator::get_coordinator(config_with(
        &path,
        dog_schema(BaseType::Int),
        1,
        SchemaMode::SoftResetFile,
    ));
    let realm = coordinator.get_realm(true).unwrap();
    realm.read(|group| {
        let table = group.table_for_name("class_Dog").unwrap();
        assert!(table.is_empty(), "incompatible file was recreated");
        let col = table.column_key_for_name("name").unwrap();
        assert_eq!(table.column(col).unwrap().ty, keel_store::ColumnType::Int);
    });
}

#[test]
fn immutable_mode_verifies_and_rejects_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pets.realm");
    seed_dog_named_rex(&path);

    let coordinator = RealmCoordinator::get_coordinator(config_with(
        &path,
        dog_schema(BaseType::String),
        1,
        SchemaMode::Immutable,
    ));
    let realm = coordinator.get_realm(true).unwrap();
    let err = realm.write(|_| Ok(())).unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::ReadOnly);

    drop(realm);
    drop(coordinator);

    let coordinator = RealmCoordinator::get_coordinator(config_with(
        &path,
        dog_schema(BaseType::String)
            .into_iter()
            .map(|mut object| {
                object.persisted_properties[0].ty =
                    object.persisted_properties[0].ty.make_nullable();
                object
            })
            .collect(),
        1,
        SchemaMode::Immutable,
    ));
    let err = coordinator.get_realm(true).unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidSchemaChange);
    assert!(err
        .to_string()
        .starts_with("The following changes cannot be made in read-only schema mode:"));
}

#[test]
fn read_only_mode_accepts_an_unversioned_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.realm");

    let coordinator = RealmCoordinator::get_coordinator(config_with(
        &path,
        Schema::empty(),
        1,
        SchemaMode::ReadOnly,
    ));
    let realm = coordinator.get_realm(true).unwrap();
    realm.read(|group| {
        assert_eq!(get_schema_version(group), 1);
        assert!(group.table_for_name("class_Dog").is_none());
    });
}
