use uuid::Uuid;

/// Narrow error type for the storage gateway. `aigent-runtime` converts
/// these into the corresponding `AppError` variant via `From`.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} violates a uniqueness constraint: {detail}")]
    Conflict { entity: &'static str, detail: String },

    #[error("malformed vector literal: {0}")]
    InvalidVector(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }
}
