//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use crate::domain::entities::{BroadcastId, BroadcastStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    /// Malformed or incomplete broadcast request. Not retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid transition: cannot {action} a broadcast in status '{from}'")]
    InvalidTransition {
        from: BroadcastStatus,
        action: &'static str,
    },

    #[error("Broadcast not found: {0}")]
    NotFound(BroadcastId),

    /// A dispatch for this broadcast is in flight; the caller may retry later.
    #[error("Broadcast {0} is busy: dispatch in flight")]
    Busy(BroadcastId),

    /// The scheduled slot was already consumed by another run.
    #[error("Broadcast {0} is no longer due")]
    NotDue(BroadcastId),

    /// The background task running a dispatch was lost (runtime shutdown).
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Chat directory error: {0}")]
    Directory(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

/// Per-chat send failure reported by the message transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transient send failure: {0}")]
    Transient(String),

    /// e.g. the chat is no longer accessible. Never retried.
    #[error("permanent send failure: {0}")]
    Permanent(String),

    /// FloodWait-style throttling: retry after `retry_after_secs`.
    #[error("rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("send timed out after {0} ms")]
    Timeout(u64),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Permanent(_))
    }
}
