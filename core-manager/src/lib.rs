//! Adapter manager: the host-facing entry point of the workspace.
//!
//! Owns the background pool and the configured adapter pair, and mediates
//! every read through the cache-then-ground-truth protocol. See
//! [`AdapterManager`] for the protocol details.

pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod options;

pub use config::{HostConfig, ServerConfig};
pub use error::{FetchError, ManagerError};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use manager::{AdapterManager, FetchHandle};
pub use options::FetchOptions;
