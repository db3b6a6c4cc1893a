//! Content-addressed blob store for binary artifacts.
//!
//! Blobs live under a flat directory, named by the lowercase hex SHA-256 of
//! their contents. Writing the same bytes twice is a no-op, so concurrent
//! ingestion of the same artifact cannot corrupt anything.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use core_adapter::cache::hex_encode;
use core_adapter::{AdapterError, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))?;
        Ok(Self { root })
    }

    fn blob_path(&self, content_hash: &str) -> PathBuf {
        self.root.join(content_hash)
    }

    /// Store `data` and return its content hash.
    ///
    /// A blob appears under its final name only once fully written: the
    /// bytes are staged next to it and renamed into place.
    pub async fn write(&self, data: &[u8]) -> Result<String> {
        let content_hash = hex_encode(&Sha256::digest(data));
        let path = self.blob_path(&content_hash);
        if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))?
        {
            return Ok(content_hash);
        }

        let staging = self.root.join(format!(
            "{content_hash}.{}.part",
            WRITE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&staging, data)
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))?;
        debug!(content_hash = %content_hash, size = data.len(), "stored blob");
        Ok(content_hash)
    }

    pub async fn read(&self, content_hash: &str) -> Result<Vec<u8>> {
        tokio::fs::read(self.blob_path(content_hash))
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))
    }

    #[cfg(test)]
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BlobStore::open(dir.path().join("blobs")).await.expect("open");

        let hash = store.write(b"cover art bytes").await.expect("write");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            store.read(&hash).await.expect("read"),
            b"cover art bytes".to_vec()
        );
    }

    #[tokio::test]
    async fn no_staging_residue_remains_after_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BlobStore::open(dir.path().join("blobs")).await.expect("open");

        store.write(b"one").await.expect("write");
        store.write(b"two").await.expect("write");

        let names: Vec<String> = std::fs::read_dir(store.root())
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(
            names.iter().all(|n| !n.ends_with(".part")),
            "staging files must not survive a write: {names:?}"
        );
    }

    #[tokio::test]
    async fn identical_content_shares_one_blob() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BlobStore::open(dir.path().join("blobs")).await.expect("open");

        let a = store.write(b"same").await.expect("write");
        let b = store.write(b"same").await.expect("write");
        assert_eq!(a, b);

        let entries = std::fs::read_dir(store.root()).expect("read_dir").count();
        assert_eq!(entries, 1);
    }
}
