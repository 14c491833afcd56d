use thiserror::Error;

use crate::utils::normalize::InvalidUnit;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A stored `time_type` is not a known unit. Points at a corrupted database.
    #[error(transparent)]
    InvalidUnit(#[from] InvalidUnit),

    #[error("usage store is already closed")]
    StoreClosed,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("usage store lock poisoned")]
    LockPoisoned,
}
