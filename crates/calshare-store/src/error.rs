//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the authorization store.
///
/// Any store error is fatal to the operation in progress: callers must not
/// report a side effect as completed when the write that records it failed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A persisted row violates the state invariants (e.g. a partial
    /// token set). This indicates external tampering or corruption.
    #[error("corrupt record for chat {chat_id}: {reason}")]
    Corrupt { chat_id: i64, reason: String },
}

impl StoreError {
    /// Creates a corrupt-record error.
    pub fn corrupt(chat_id: i64, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            chat_id,
            reason: reason.into(),
        }
    }
}
