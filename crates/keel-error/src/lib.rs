//! Error taxonomy for the keel object store.
//!
//! Every failure surfaced to a caller is a [`KeelError`]. Variants map onto
//! wire-stable [`ErrorCode`] values so bindings can switch on the code while
//! displaying the message. Schema-compatibility errors carry the complete
//! list of offending deltas in their message, one bullet per line, preceded
//! by a mode-specific headline; callers are expected to show the whole list
//! at once rather than fixing problems one at a time.

use thiserror::Error;

/// Convenience alias used throughout the keel crates.
pub type Result<T> = std::result::Result<T, KeelError>;

/// Primary error type for keel object-store operations.
#[derive(Error, Debug)]
pub enum KeelError {
    // === Schema errors ===
    /// The target schema version is incompatible with the version already
    /// stored in the file.
    #[error("{message}")]
    InvalidSchemaVersion {
        message: String,
        old_version: u64,
        new_version: u64,
    },

    /// The target schema itself is malformed (duplicate classes, missing
    /// primary-key properties, bad link targets, ...).
    #[error("{message}")]
    SchemaValidationFailed { message: String },

    /// The on-disk schema differs from the target in ways that require a
    /// migration which was not requested.
    #[error("{message}")]
    SchemaMismatch { message: String },

    /// The on-disk schema differs from the target in ways the active schema
    /// mode does not permit.
    #[error("{message}")]
    InvalidSchemaChange { message: String },

    // === Object store errors ===
    /// A table expected to exist for an object type is missing.
    #[error("{message}")]
    NoSuchTable { message: String },

    /// A property lookup failed or referenced a property in an invalid way.
    #[error("{message}")]
    InvalidProperty { message: String },

    /// The requested operation is not legal in the current state.
    #[error("{message}")]
    IllegalOperation { message: String },

    // === Sync errors ===
    /// A server-initiated schema migration is pending but the sync
    /// configuration cannot satisfy it.
    #[error("{message}")]
    SyncSchemaMigrationError { message: String },

    // === Infrastructure ===
    /// File I/O error while reading, writing, or removing a realm file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The group snapshot on disk could not be decoded.
    #[error("file is not a valid realm snapshot: {detail}")]
    InvalidSnapshot { detail: String },

    /// Attempt to write through an immutable or read-only realm.
    #[error("attempt to write a read-only realm")]
    ReadOnly,

    /// Internal invariant violation (a programming error, never caught).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Wire-stable error codes.
///
/// The numeric values are part of the external contract and must never be
/// reordered or reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// No error.
    Ok = 0,
    /// Target schema version rejected.
    InvalidSchemaVersion = 1,
    /// Target schema is malformed.
    SchemaValidationFailed = 2,
    /// Schema deltas require a migration that was not requested.
    SchemaMismatch = 3,
    /// Schema deltas disallowed by the active schema mode.
    InvalidSchemaChange = 4,
    /// No table exists for the object type.
    NoSuchTable = 5,
    /// Property missing or referenced invalidly.
    InvalidProperty = 6,
    /// Operation illegal in the current state.
    IllegalOperation = 7,
    /// Pending sync schema migration cannot be satisfied.
    SyncSchemaMigrationError = 8,
    /// File I/O failure.
    FileAccessError = 9,
    /// Realm snapshot could not be decoded.
    InvalidSnapshot = 10,
    /// Write attempted on a read-only realm.
    ReadOnly = 11,
    /// Internal invariant violation.
    Internal = 12,
}

impl KeelError {
    /// Map this error to its wire-stable code.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidSchemaVersion { .. } => ErrorCode::InvalidSchemaVersion,
            Self::SchemaValidationFailed { .. } => ErrorCode::SchemaValidationFailed,
            Self::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            Self::InvalidSchemaChange { .. } => ErrorCode::InvalidSchemaChange,
            Self::NoSuchTable { .. } => ErrorCode::NoSuchTable,
            Self::InvalidProperty { .. } => ErrorCode::InvalidProperty,
            Self::IllegalOperation { .. } => ErrorCode::IllegalOperation,
            Self::SyncSchemaMigrationError { .. } => ErrorCode::SyncSchemaMigrationError,
            Self::Io(_) => ErrorCode::FileAccessError,
            Self::InvalidSnapshot { .. } => ErrorCode::InvalidSnapshot,
            Self::ReadOnly => ErrorCode::ReadOnly,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Build an [`KeelError::InvalidSchemaVersion`] for a version that moved
    /// backwards, or for a mode that demands an exact match.
    #[must_use]
    pub fn invalid_schema_version(old_version: u64, new_version: u64, must_exactly_equal: bool) -> Self {
        let message = if must_exactly_equal {
            format!("Provided schema version {new_version} does not equal last set version {old_version}.")
        } else {
            format!("Provided schema version {new_version} is less than last set version {old_version}.")
        };
        Self::InvalidSchemaVersion {
            message,
            old_version,
            new_version,
        }
    }
}

/// Join a headline with one bullet per problem, the presentation shared by
/// every bulk schema error.
#[must_use]
pub fn format_error_list(headline: &str, problems: &[String]) -> String {
    let mut message = String::from(headline);
    for problem in problems {
        message.push_str("\n- ");
        message.push_str(problem);
    }
    message
}
