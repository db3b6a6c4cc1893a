//! Durable cache entry model and parameter fingerprints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::operation::Operation;

/// Ordered input parameters of a read operation.
///
/// Together with the operation name this forms the natural key of a cache
/// entry. The fingerprint is order-sensitive: `["a", "b"]` and `["b", "a"]`
/// are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FetchParams(Vec<String>);

impl FetchParams {
    /// Parameters of a nullary operation such as `get_playlists`.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn one(param: impl Into<String>) -> Self {
        Self(vec![param.into()])
    }

    pub fn from_iter<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(params.into_iter().map(Into::into).collect())
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }

    /// Stable hex fingerprint of the parameter list.
    ///
    /// Length-prefixes every value before hashing so concatenation ambiguity
    /// cannot collide two different parameter lists.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for value in &self.0 {
            hasher.update(value.len().to_le_bytes());
            hasher.update(value.as_bytes());
        }
        hex_encode(&hasher.finalize())
    }
}

/// Metadata record for one cached artifact.
///
/// One row exists per `(cache_key, params_hash)` pair. The row is soft
/// invalidated (not deleted) by forced refreshes and overwritten with a new
/// ingestion time when fresh data arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Which fetch operation produced this data.
    pub cache_key: Operation,
    /// Fingerprint of the operation's input parameters.
    pub params_hash: String,
    /// False while the entry exists but must not satisfy reads.
    pub valid: bool,
    /// Time of the most recent successful ingestion.
    pub last_ingestion_time: DateTime<Utc>,
    /// Blob store reference for binary artifacts (cover art, audio).
    pub content_id: Option<String>,
    /// Content hash of the referenced blob.
    pub content_hash: Option<String>,
    /// Exempts the entry from size-based eviction.
    pub cache_permanently: Option<bool>,
}

/// Outcome of a caching adapter read.
///
/// Replaces an exception-style miss signal: the manager inspects this
/// explicitly and falls through to the ground-truth adapter on a miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheRead<T> {
    /// A valid entry satisfied the read.
    Hit(T),
    /// No valid entry; may carry stale or partial data the caller can show
    /// while a refresh is in flight.
    Miss(Option<T>),
}

impl<T> CacheRead<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheRead::Hit(_))
    }

    pub fn into_partial(self) -> Option<T> {
        match self {
            CacheRead::Hit(value) => Some(value),
            CacheRead::Miss(partial) => partial,
        }
    }
}

/// Lowercase hex encoding, used for fingerprints and content hashes.
pub fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        // Writing to a String cannot fail.
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        let a = FetchParams::one("playlist-1").fingerprint();
        let b = FetchParams::one("playlist-1").fingerprint();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_is_order_sensitive() {
        let ab = FetchParams::from_iter(["a", "b"]).fingerprint();
        let ba = FetchParams::from_iter(["b", "a"]).fingerprint();
        assert_ne!(ab, ba);
    }

    #[test]
    fn fingerprint_has_no_concatenation_collisions() {
        let split = FetchParams::from_iter(["ab", "c"]).fingerprint();
        let joined = FetchParams::from_iter(["a", "bc"]).fingerprint();
        assert_ne!(split, joined);
    }

    #[test]
    fn cache_read_partial_extraction() {
        assert_eq!(CacheRead::Hit(1).into_partial(), Some(1));
        assert_eq!(CacheRead::Miss(Some(2)).into_partial(), Some(2));
        assert_eq!(CacheRead::<i32>::Miss(None).into_partial(), None);
    }
}
