/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No tracked item with id: {0}")]
    NotFound(String),

    #[error("Concurrent update conflict for item: {0}")]
    Conflict(String),

    #[error("Corrupt item row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache I/O error: {0}")]
    CacheIo(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    CacheFormat(#[from] serde_json::Error),
}
