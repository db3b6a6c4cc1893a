//! Error type shared by all adapters.

use thiserror::Error;

use crate::operation::Operation;

/// Errors produced by adapters.
///
/// Clonable on purpose: one resolution of an async handle fans out to every
/// blocking waiter and completion callback, so underlying causes (sqlx, io)
/// are captured as strings rather than carried by value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The backend cannot be reached or is not usable right now.
    #[error("adapter unavailable: {reason}")]
    Unavailable { reason: String },

    /// The adapter does not implement this operation at all.
    #[error("operation {0} is not supported by this adapter")]
    Unsupported(Operation),

    /// The requested entity does not exist on this backend.
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("i/o error: {0}")]
    Io(String),

    /// `ingest_new_data` was handed a payload that does not match the
    /// operation it was ingested under.
    #[error("payload does not match operation {operation}")]
    PayloadMismatch { operation: Operation },

    /// The unit of work was cancelled before it started.
    #[error("operation was cancelled")]
    Cancelled,
}

impl AdapterError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        AdapterError::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AdapterError::NotFound { what: what.into() }
    }
}

impl From<core_task::Cancelled> for AdapterError {
    fn from(_: core_task::Cancelled) -> Self {
        AdapterError::Cancelled
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
