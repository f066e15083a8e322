//! Whole-stack lifecycle: open, migrate across versions, reopen from disk.

use std::sync::Arc;

use keel::store::Value;
use keel::{
    rename_property, BaseType, Group, KeelError, ObjectSchema, Property, RealmConfig,
    RealmCoordinator, Schema, TableType,
};

fn schema_v1() -> Schema {
    Schema::new(vec![ObjectSchema::new(
        "Dog",
        TableType::TopLevel,
        vec![Property::new("first_name", BaseType::String)],
    )])
}

fn schema_v2() -> Schema {
    Schema::new(vec![
        ObjectSchema::new(
            "Dog",
            TableType::TopLevel,
            vec![
                Property::new("name", BaseType::String),
                Property::object("owner", "Person"),
            ],
        ),
        ObjectSchema::new(
            "Person",
            TableType::TopLevel,
            vec![Property::new("name", BaseType::String).indexed()],
        ),
    ])
}

#[test]
fn versioned_reopen_with_migration_preserves_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pets.realm");

    // First launch at v1; write one dog.
    {
        let mut config = RealmConfig::new(&path);
        config.schema = Some(schema_v1());
        config.schema_version = 1;
        let coordinator = RealmCoordinator::get_coordinator(config);
        let realm = coordinator.get_realm(true).unwrap();
        realm
            .write(|group: &mut Group| {
                let table = group
                    .table_for_name_mut("class_Dog")
                    .ok_or_else(|| KeelError::Internal("missing table".to_owned()))?;
                let col = table
                    .column_key_for_name("first_name")
                    .ok_or_else(|| KeelError::Internal("missing column".to_owned()))?;
                let obj = table.create_object();
                table.set_value(obj, col, Value::String("rex".to_owned()))
            })
            .unwrap();
    }

    // Second launch at v2 with a renaming migration.
    {
        let mut config = RealmConfig::new(&path);
        config.schema = Some(schema_v2());
        config.schema_version = 2;
        config.migration_function = Some(Arc::new(|group, schema| {
            rename_property(group, schema, "Dog", "first_name", "name")
        }));
        let coordinator = RealmCoordinator::get_coordinator(config);
        let realm = coordinator.get_realm(true).unwrap();

        assert!(realm.schema().find("Person").is_some());
        realm.read(|group| {
            let table = group.table_for_name("class_Dog").unwrap();
            let col = table.column_key_for_name("name").unwrap();
            let obj = table.object_keys()[0];
            assert_eq!(table.value(obj, col), Some(Value::String("rex".to_owned())));
            assert!(group.has_table("class_Person"));
        });
    }

    // Third launch with the same schema: nothing to do, keys rebind.
    {
        let mut config = RealmConfig::new(&path);
        config.schema = Some(schema_v2());
        config.schema_version = 2;
        let coordinator = RealmCoordinator::get_coordinator(config);
        let realm = coordinator.get_realm(false).unwrap();
        let dog = realm.schema().find("Dog").unwrap();
        assert!(dog.table_key.is_some());
        assert!(dog
            .persisted_properties
            .iter()
            .all(|p| p.column_key.is_some()));
    }
}
