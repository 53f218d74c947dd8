use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("A contact named {0:?} already exists")]
    DuplicateContactName(String),

    #[error("Another contact already uses this verification key")]
    DuplicateVerificationKey,

    #[error("Contact name must be between 1 and 255 characters")]
    InvalidContactName,

    #[error("Record not found: {0}")]
    NotFound(String),
}
