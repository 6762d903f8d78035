//! Error types shared across the service

/// Failures raised by a storage backend
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

/// Failures surfaced to callers of the scoring service
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    /// Request rejected before any inference or persistence
    #[error("{0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ServiceError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ServiceError::Validation(_))
    }
}
