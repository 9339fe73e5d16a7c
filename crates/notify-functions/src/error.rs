//! Error type shared by the notification functions.

use doc_sync::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("No email address for user: {0}")]
    MissingEmail(String),

    #[error("Invalid record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, NotifyError>;
