use thiserror::Error;

/// Storage-specific error types for the Lockbay coordination server.
///
/// These cover database failures, queue admission conflicts, and the
/// optimistic-concurrency rejections the locker repository raises.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Command payload could not be serialized or deserialized
    #[error("Payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity not found in database
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// Queue admission rejected: an equivalent or overlapping command is
    /// still live for the same kiosk
    #[error("Duplicate command: a live command {existing_id} already covers this request")]
    DuplicateCommand { existing_id: String },

    /// A lifecycle update found the command in the wrong status
    #[error("Command {command_id} is {status}, not eligible for this transition")]
    CommandNotClaimable { command_id: String, status: String },

    /// Optimistic-concurrency guard failed: the locker row moved under us
    #[error("Locker {kiosk_id}/{locker_id} changed since version {expected}")]
    VersionConflict {
        kiosk_id: String,
        locker_id: i64,
        expected: i64,
    },

    /// A stored row failed domain validation on read (bad state text,
    /// unparsable payload, out-of-range address)
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Shorthand for a [`StorageError::NotFound`] with the usual fields.
    pub fn not_found(
        entity_type: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        StorageError::NotFound {
            entity_type: entity_type.into(),
            field: field.into(),
            value: value.into(),
        }
    }
}
