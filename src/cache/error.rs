use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    #[error("Cache command failed: {0}")]
    CommandError(#[from] redis::RedisError),

    #[error("Cache serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid TTL: {0}")]
    TtlError(String),
}

impl<E: std::error::Error + 'static> From<bb8::RunError<E>> for CacheError {
    fn from(err: bb8::RunError<E>) -> Self {
        CacheError::ConnectionError(err.to_string())
    }
}
