//! Error taxonomy for the tailing engine.
//!
//! Every failure the core can hit is classified by what the poll loop should
//! do about it:
//!
//! | Variant | Scheduler reaction |
//! |---------|--------------------|
//! | [`TailError::InvalidQuery`] | report, abort the cycle, keep running |
//! | [`TailError::Transient`] | retry the page with backoff, then retry the cycle next tick |
//! | [`TailError::Fatal`] | stop the run |
//! | [`TailError::Stale`] | log and drop the document |
//! | [`TailError::Sink`] / [`TailError::Checkpoint`] | stop the run |

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TailError {
    /// The free-text query could not be translated, locally or by the backend.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Network failure, timeout, or an overloaded backend.
    #[error("transient backend error: {0}")]
    Transient(String),

    /// Authentication, permission, or index errors that retrying cannot fix.
    #[error("fatal backend error: {0}")]
    Fatal(String),

    /// A document sorted behind the cursor.
    #[error("stale document {id} at {timestamp} is behind cursor {cursor}")]
    Stale {
        id: String,
        timestamp: DateTime<Utc>,
        cursor: DateTime<Utc>,
    },

    /// Writing to the output sink failed.
    #[error("output sink error: {0}")]
    Sink(#[source] std::io::Error),

    /// Reading or writing the cursor checkpoint failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

impl TailError {
    /// Whether the page fetch that produced this error may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, TailError::Transient(_))
    }

    /// Whether this error ends the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TailError::Fatal(_) | TailError::Sink(_) | TailError::Checkpoint(_)
        )
    }
}

pub type TailResult<T> = std::result::Result<T, TailError>;
