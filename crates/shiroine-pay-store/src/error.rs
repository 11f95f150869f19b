//! Error types for shiroine payment storage.

use shiroine_pay_core::CoreError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// A stored row violates a domain invariant.
    #[error("corrupt row: {0}")]
    Corrupt(#[from] CoreError),

    /// Record not found.
    #[error("not found")]
    NotFound,

    /// A row with the same reference already exists.
    #[error("duplicate reference: {reference}")]
    DuplicateReference {
        /// The reference that collided.
        reference: String,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            other => Self::Database(other.to_string()),
        }
    }
}
