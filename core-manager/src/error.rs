//! Errors surfaced by the adapter manager.

use core_adapter::{AdapterError, Operation};
use thiserror::Error;

/// Failure of a single read operation, delivered through its handle.
///
/// Cache-side failures never appear here; the manager downgrades them to
/// misses. What remains is the manager's own state, the "nobody can serve
/// this" case, and genuine ground-truth fetch errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError<T> {
    #[error("adapter manager is shutting down")]
    ShuttingDown,

    /// No adapter pair has been configured via `reset` yet.
    #[error("no adapter is configured")]
    NotConfigured,

    /// Neither the cache nor the ground-truth adapter can serve the
    /// operation. Carries whatever partial data the cache miss recovered, for
    /// the caller's discretion.
    #[error("no adapter can service {operation}")]
    ServiceUnavailable {
        operation: Operation,
        partial: Option<T>,
    },

    /// The ground-truth fetch itself failed.
    #[error(transparent)]
    Adapter(AdapterError),
}

impl<T> From<AdapterError> for FetchError<T> {
    fn from(e: AdapterError) -> Self {
        FetchError::Adapter(e)
    }
}

impl<T> From<core_task::Cancelled> for FetchError<T> {
    fn from(_: core_task::Cancelled) -> Self {
        FetchError::Adapter(AdapterError::Cancelled)
    }
}

/// Failure of a lifecycle operation (`reset`, adapter construction).
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("adapter manager is shutting down")]
    ShuttingDown,

    #[error("no server is selected in the host configuration")]
    NoServerSelected,

    #[error("no adapter factory registered for kind {0:?}")]
    UnknownAdapterKind(String),

    #[error("server {server:?} is missing required parameter {key:?}")]
    MissingParameter { server: String, key: &'static str },

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("configuration error: {0}")]
    Config(String),
}
