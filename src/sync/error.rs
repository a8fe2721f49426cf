//! Sync error types

use thiserror::Error;

use crate::store::StoreError;

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// A batch item carries no integer `localId` and cannot be answered
    #[error("Item {index} has no integer localId")]
    MissingLocalId { index: usize },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
