use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced by the disk cache.
///
/// Reads absorb most of these into misses; they surface to callers from writes, explicit
/// maintenance (`gc`, `clear`) and directory setup.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("compression error: {0}")]
    Compression(#[source] std::io::Error),

    #[error("corrupt cache entry {path}: {reason}")]
    Corrupt { path: PathBuf, reason: &'static str },

    #[error("cache payload of {size} bytes exceeds the {limit} byte limit")]
    Oversize { size: u64, limit: u64 },

    #[error("background cache task failed: {message}")]
    Background { message: String },
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Background {
            message: err.to_string(),
        }
    }
}
