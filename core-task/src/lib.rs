//! Async result handles and the shared background execution pool.
//!
//! This crate provides the concurrency primitives the adapter manager builds
//! on:
//!
//! - [`AsyncHandle`] wraps either an already-available value or a background
//!   unit of work. Callers can block for the value (`result`), await it
//!   (`wait`), or register a completion callback.
//! - [`TaskPool`] is a fixed-size pool running all background units of work.
//!   It refuses new work once shut down and drains in-flight work on
//!   teardown.
//!
//! Construction of a spawned handle submits the unit of work immediately and
//! never blocks. A handle transitions at most once from pending to resolved,
//! and resolution is either success-with-value or failure-with-error.

pub mod handle;
pub mod pool;

pub use handle::{AsyncHandle, Cancelled};
pub use pool::{PoolConfig, TaskPool};
