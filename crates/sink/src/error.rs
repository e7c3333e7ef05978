use thiserror::Error;

/// Errors from the PostgreSQL sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
