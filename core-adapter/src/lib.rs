//! Adapter contracts and the shared data model.
//!
//! This crate defines everything the adapter manager and the concrete
//! adapters agree on:
//!
//! - the domain entities mirrored from the remote source ([`models`])
//! - the durable cache entry model and parameter fingerprints ([`cache`])
//! - the fixed table of read operations ([`operation`])
//! - the [`Adapter`] and [`CachingAdapter`] capability contracts and the
//!   factories the manager uses to construct adapters from host
//!   configuration ([`adapter`])

pub mod adapter;
pub mod cache;
pub mod error;
pub mod models;
pub mod operation;

pub use adapter::{
    Adapter, AdapterFactory, CachingAdapter, CachingAdapterFactory, ConfigParameter, IngestPayload,
};
pub use cache::{CacheEntry, CacheRead, FetchParams};
pub use error::{AdapterError, Result};
pub use operation::Operation;
