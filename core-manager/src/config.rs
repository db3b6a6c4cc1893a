//! Host configuration: known servers, the selected server, and cache
//! settings.
//!
//! The manager never reads configuration files itself; the host deserializes
//! this structure from wherever it keeps settings and hands it to
//! [`reset`](crate::AdapterManager::reset).

use std::collections::HashMap;
use std::path::PathBuf;

use core_adapter::cache::hex_encode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One configured remote server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Display name, also part of the server's storage identity.
    pub name: String,
    /// Adapter kind, matched against [`AdapterFactory::kind`].
    ///
    /// [`AdapterFactory::kind`]: core_adapter::AdapterFactory::kind
    pub kind: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Adapter-specific parameters beyond the well-known ones.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            address: None,
            username: None,
            password: None,
            extra: HashMap::new(),
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Look up a named adapter parameter. Well-known keys map to the typed
    /// fields; everything else comes from `extra`.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        match key {
            "address" => self.address.as_deref(),
            "username" => self.username.as_deref(),
            "password" => self.password.as_deref(),
            _ => self.extra.get(key).map(String::as_str),
        }
    }

    /// Short stable hash of the server's identity, used to key its on-disk
    /// storage so switching servers never mixes caches.
    pub fn identity_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [
            Some(self.name.as_str()),
            Some(self.kind.as_str()),
            self.address.as_deref(),
            self.username.as_deref(),
        ] {
            let value = field.unwrap_or_default();
            hasher.update(value.len().to_le_bytes());
            hasher.update(value.as_bytes());
        }
        let mut hash = hex_encode(&hasher.finalize());
        hash.truncate(16);
        hash
    }
}

/// Everything the manager needs from the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    /// Index into `servers`, or none when no server is selected yet.
    #[serde(default)]
    pub current_server: Option<usize>,
    /// Root directory for all per-server caches.
    pub cache_location: PathBuf,
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
    /// Soft size target for eviction; unlimited when unset.
    #[serde(default)]
    pub max_cache_size_mb: Option<u64>,
}

fn default_cache_enabled() -> bool {
    true
}

impl HostConfig {
    pub fn new(cache_location: impl Into<PathBuf>) -> Self {
        Self {
            servers: Vec::new(),
            current_server: None,
            cache_location: cache_location.into(),
            cache_enabled: true,
            max_cache_size_mb: None,
        }
    }

    pub fn server(mut self, server: ServerConfig) -> Self {
        self.servers.push(server);
        self
    }

    pub fn select(mut self, index: usize) -> Self {
        self.current_server = Some(index);
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn current_server(&self) -> Option<&ServerConfig> {
        self.servers.get(self.current_server?)
    }
}
