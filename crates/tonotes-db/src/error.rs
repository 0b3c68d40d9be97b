//! Database error types

use thiserror::Error;

/// Database operation errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A unique index rejected the write; carries the offending field name.
    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl From<deadpool_redis::PoolError> for DbError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        DbError::Redis(e.to_string())
    }
}

impl From<redis::RedisError> for DbError {
    fn from(e: redis::RedisError) -> Self {
        DbError::Redis(e.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<mongodb::error::Error> for DbError {
    fn from(e: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        if let ErrorKind::Write(WriteFailure::WriteError(ref write)) = *e.kind {
            if write.code == DUPLICATE_KEY_CODE {
                return DbError::Duplicate(duplicate_field(&write.message).to_string());
            }
        }
        DbError::Query(e.to_string())
    }
}

/// MongoDB server code for a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Pull the indexed field name out of an E11000 message, e.g.
/// `E11000 duplicate key error collection: tonotes.users index: username_1 dup key: ...`
fn duplicate_field(message: &str) -> &str {
    message
        .split("index: ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .map(|index| index.trim_end_matches("_1"))
        .unwrap_or("unknown")
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
