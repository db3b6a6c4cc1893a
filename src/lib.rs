//! Workspace facade crate.
//!
//! Re-exports the individual workspace crates so host applications can depend
//! on `chorale` alone instead of wiring each layer individually:
//!
//! - [`task`] — async result handles and the shared background pool
//! - [`adapter`] — domain models, cache entry model, and the adapter contracts
//! - [`sqlite`] — the SQLite-backed caching adapter
//! - [`manager`] — the adapter manager, host configuration, and logging setup

pub use adapter_sqlite as sqlite;
pub use core_adapter as adapter;
pub use core_manager as manager;
pub use core_task as task;
