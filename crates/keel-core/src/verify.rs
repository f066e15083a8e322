//! Mode-specific legality verifiers over a change sequence.
//!
//! Every verifier walks the full sequence and collects one explanation per
//! disallowed delta, so a single error reports every problem at once.

use keel_error::{format_error_list, KeelError, Result};
use keel_types::SchemaChange;

use crate::metadata::NOT_VERSIONED;

/// Appended to errors a developer can fix by wiping a development realm.
pub const DEVELOPMENT_MODE_HINT: &str = "If your app is running in development mode, you can \
                                         delete the realm and restart the app to update your schema.";

/// Human-readable explanation of one schema delta.
///
/// `RemoveTable` and `AddInitialProperties` never produce an explanation:
/// removals are never acted on implicitly, and initial properties are an
/// artifact of the preceding `AddTable`.
pub(crate) fn describe_change(change: &SchemaChange) -> Option<String> {
    match change {
        SchemaChange::AddTable { object } => Some(format!("Class '{}' has been added.", object.name)),
        SchemaChange::RemoveTable { .. } | SchemaChange::AddInitialProperties { .. } => None,
        SchemaChange::ChangeTableType {
            object,
            old_table_type,
            new_table_type,
        } => Some(format!(
            "Class '{object}' has been changed from {old_table_type} to {new_table_type}."
        )),
        SchemaChange::AddProperty { object, property } => Some(format!(
            "Property '{object}.{}' has been added.",
            property.name
        )),
        SchemaChange::RemoveProperty { object, property } => Some(format!(
            "Property '{object}.{}' has been removed.",
            property.name
        )),
        SchemaChange::ChangePropertyType {
            object,
            old_property,
            new_property,
        } => Some(format!(
            "Property '{object}.{}' has been changed from '{}' to '{}'.",
            new_property.name,
            old_property.type_string(),
            new_property.type_string()
        )),
        SchemaChange::MakePropertyNullable { object, property } => Some(format!(
            "Property '{object}.{}' has been made optional.",
            property.name
        )),
        SchemaChange::MakePropertyRequired { object, property } => Some(format!(
            "Property '{object}.{}' has been made required.",
            property.name
        )),
        SchemaChange::ChangePrimaryKey {
            object,
            old_primary_key,
            property,
        } => match (property, old_primary_key) {
            (Some(new_pk), Some(old_pk)) => Some(format!(
                "Primary Key for class '{object}' has changed from '{old_pk}' to '{}'.",
                new_pk.name
            )),
            (Some(_), None) => Some(format!("Primary Key for class '{object}' has been added.")),
            (None, _) => Some(format!("Primary Key for class '{object}' has been removed.")),
        },
        SchemaChange::AddIndex { object, property, .. } => Some(format!(
            "Property '{object}.{}' has been made indexed.",
            property.name
        )),
        SchemaChange::RemoveIndex { object, property } => Some(format!(
            "Property '{object}.{}' has been made unindexed.",
            property.name
        )),
    }
}

pub(crate) fn schema_mismatch_error(problems: Vec<String>) -> KeelError {
    KeelError::SchemaMismatch {
        message: format_error_list("Migration is required due to the following errors:", &problems),
    }
}

fn invalid_readonly_error(problems: Vec<String>) -> KeelError {
    KeelError::InvalidSchemaChange {
        message: format_error_list(
            "The following changes cannot be made in read-only schema mode:",
            &problems,
        ),
    }
}

fn invalid_additive_error(problems: Vec<String>) -> KeelError {
    let mut message = format_error_list(
        "The following changes cannot be made in additive-only schema mode:",
        &problems,
    );
    message.push('\n');
    message.push_str(DEVELOPMENT_MODE_HINT);
    KeelError::InvalidSchemaChange { message }
}

fn invalid_external_error(problems: Vec<String>) -> KeelError {
    let mut message = format_error_list(
        "Unsupported schema changes were made by another client or process:",
        &problems,
    );
    message.push('\n');
    message.push_str(DEVELOPMENT_MODE_HINT);
    KeelError::InvalidSchemaChange { message }
}

/// Require the change sequence to be empty of anything observable.
pub fn verify_no_changes_required(changes: &[SchemaChange]) -> Result<()> {
    let problems: Vec<_> = changes.iter().filter_map(describe_change).collect();
    if problems.is_empty() {
        Ok(())
    } else {
        Err(schema_mismatch_error(problems))
    }
}

/// Allow only changes that can be applied without a migration: new tables
/// and index toggles.
pub fn verify_no_migration_required(changes: &[SchemaChange]) -> Result<()> {
    let problems: Vec<_> = changes
        .iter()
        .filter(|change| {
            !matches!(
                change,
                SchemaChange::AddTable { .. }
                    | SchemaChange::AddInitialProperties { .. }
                    | SchemaChange::AddIndex { .. }
                    | SchemaChange::RemoveIndex { .. }
            )
        })
        .filter_map(describe_change)
        .collect();
    if problems.is_empty() {
        Ok(())
    } else {
        Err(schema_mismatch_error(problems))
    }
}

/// Allow schema growth plus index toggles, as required by additive modes.
///
/// Returns whether applying the sequence would change the file at all:
/// true when any non-index change is present, or when index changes are
/// present and `update_indexes` is set.
pub fn verify_valid_additive_changes(changes: &[SchemaChange], update_indexes: bool) -> Result<bool> {
    let mut index_changes = false;
    let mut other_changes = false;
    let mut problems = Vec::new();

    for change in changes {
        match change {
            SchemaChange::AddTable { .. }
            | SchemaChange::AddInitialProperties { .. }
            | SchemaChange::AddProperty { .. } => other_changes = true,
            SchemaChange::RemoveProperty { .. } => {}
            SchemaChange::AddIndex { .. } | SchemaChange::RemoveIndex { .. } => index_changes = true,
            other => problems.extend(describe_change(other)),
        }
    }

    if problems.is_empty() {
        Ok(other_changes || (index_changes && update_indexes))
    } else {
        Err(invalid_additive_error(problems))
    }
}

/// Verify changes observed on disk that were made by another process.
/// Additions are fine; removing a table or any destructive change is not.
pub fn verify_valid_external_changes(changes: &[SchemaChange]) -> Result<()> {
    let mut problems = Vec::new();
    for change in changes {
        match change {
            SchemaChange::AddTable { .. }
            | SchemaChange::AddInitialProperties { .. }
            | SchemaChange::AddProperty { .. }
            | SchemaChange::AddIndex { .. }
            | SchemaChange::RemoveIndex { .. } => {}
            SchemaChange::RemoveTable { object } => {
                problems.push(format!("Class '{}' has been removed.", object.name));
            }
            other => problems.extend(describe_change(other)),
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(invalid_external_error(problems))
    }
}

/// Verify that a file can back an immutable or read-only realm.
pub fn verify_compatible_for_immutable_and_readonly(changes: &[SchemaChange]) -> Result<()> {
    let problems: Vec<_> = changes
        .iter()
        .filter(|change| {
            !matches!(
                change,
                SchemaChange::AddTable { .. }
                    | SchemaChange::AddInitialProperties { .. }
                    | SchemaChange::ChangeTableType { .. }
                    | SchemaChange::RemoveProperty { .. }
                    | SchemaChange::AddIndex { .. }
                    | SchemaChange::RemoveIndex { .. }
            )
        })
        .filter_map(describe_change)
        .collect();
    if problems.is_empty() {
        Ok(())
    } else {
        Err(invalid_readonly_error(problems))
    }
}

/// Guard the target schema version against the version already in the file.
///
/// Uninitialised files accept any version. Otherwise a decrease is always
/// rejected, and any inequality is rejected when `must_exactly_equal` is
/// set (read-only realms).
pub fn verify_schema_version(stored: u64, target: u64, must_exactly_equal: bool) -> Result<()> {
    if stored == NOT_VERSIONED {
        return Ok(());
    }
    if must_exactly_equal && stored != target {
        return Err(KeelError::invalid_schema_version(stored, target, true));
    }
    if target < stored {
        return Err(KeelError::invalid_schema_version(stored, target, false));
    }
    Ok(())
}
