//! Error types for the notes data layer
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized so the UI shell can render them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Migration from version {from} to {to} failed: {cause}")]
    Migration {
        from: u32,
        to: u32,
        #[source]
        cause: Box<AppError>,
    },

    #[error("Unsupported schema version {found} (latest supported is {supported})")]
    UnsupportedSchemaVersion { found: i64, supported: u32 },
}

impl AppError {
    pub(crate) fn note_not_found(id: i64) -> Self {
        AppError::NotFound { entity: "Note", id }
    }

    pub(crate) fn tag_not_found(id: i64) -> Self {
        AppError::NotFound { entity: "Tag", id }
    }

    /// Map driver-level constraint failures onto `ConstraintViolation`,
    /// leaving every other driver error as `Database`.
    pub(crate) fn from_write(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation()
                || db_err.is_check_violation()
                || db_err.is_foreign_key_violation()
                || matches!(db_err.kind(), sqlx::error::ErrorKind::NotNullViolation)
            {
                return AppError::ConstraintViolation(db_err.message().to_string());
            }
        }
        AppError::Database(err)
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
