use thiserror::Error;

use crate::core::filter::FilterError;
use crate::core::paging::PageError;

/// Errors surfaced by queue, producer, consumer and management operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Malformed filter text handed to a management call.
    #[error("filter syntax error: {0}")]
    FilterSyntax(#[from] FilterError),

    /// The queue was shut down; terminal for that queue.
    #[error("queue {0} is closed")]
    QueueClosed(String),

    /// Reading or writing a page segment failed.
    #[error("page I/O error: {0}")]
    PageIo(#[from] PageError),

    /// Address is full and its policy is `FAIL`.
    #[error("address {0} is full")]
    AddressFull(String),

    #[error("queue {0} already exists")]
    QueueExists(String),

    #[error("queue {0} does not exist")]
    QueueNotFound(String),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    /// True for errors that mean the queue will never accept work again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueError::QueueClosed(_) | QueueError::QueueNotFound(_))
    }
}
