//! Capability contracts implemented by both adapter kinds.
//!
//! A ground-truth adapter speaks to the authoritative remote source; a
//! caching adapter answers from durable local storage. Both expose the same
//! fetch surface plus availability and per-operation capability probes; the
//! caching adapter additionally exposes tagged cache reads, ingestion, and
//! soft invalidation.
//!
//! Fetch methods have default bodies returning
//! [`AdapterError::Unsupported`], so an adapter implements exactly the
//! operations it declares via [`Adapter::can`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::{CacheRead, FetchParams};
use crate::error::{AdapterError, Result};
use crate::models::{
    Album, AlbumDetails, Artist, CoverArt, Directory, Genre, Playlist, PlaylistDetails, Song,
};
use crate::operation::Operation;

/// One configuration key an adapter needs at construction time.
///
/// Lets the host build adapters generically from its server configuration
/// without knowing adapter internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigParameter {
    pub key: &'static str,
    pub required: bool,
    /// Credentials and other values that must never be logged.
    pub secret: bool,
}

impl ConfigParameter {
    pub const fn required(key: &'static str) -> Self {
        Self {
            key,
            required: true,
            secret: false,
        }
    }

    pub const fn optional(key: &'static str) -> Self {
        Self {
            key,
            required: false,
            secret: false,
        }
    }

    pub const fn secret(key: &'static str) -> Self {
        Self {
            key,
            required: true,
            secret: true,
        }
    }
}

/// The capability contract every adapter implements.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Whether the adapter is currently reachable and usable at all.
    fn can_service_requests(&self) -> bool;

    /// Whether this specific operation is supported, independent of general
    /// reachability.
    fn can(&self, operation: Operation) -> bool;

    /// Scoped teardown. Releases connections and file handles; idempotent.
    async fn shutdown(&self);

    async fn get_playlists(&self) -> Result<Vec<Playlist>> {
        Err(AdapterError::Unsupported(Operation::GetPlaylists))
    }

    async fn get_playlist_details(&self, _playlist_id: &str) -> Result<PlaylistDetails> {
        Err(AdapterError::Unsupported(Operation::GetPlaylistDetails))
    }

    async fn get_artists(&self) -> Result<Vec<Artist>> {
        Err(AdapterError::Unsupported(Operation::GetArtists))
    }

    async fn get_artist(&self, _artist_id: &str) -> Result<Artist> {
        Err(AdapterError::Unsupported(Operation::GetArtist))
    }

    async fn get_albums(&self) -> Result<Vec<Album>> {
        Err(AdapterError::Unsupported(Operation::GetAlbums))
    }

    async fn get_album(&self, _album_id: &str) -> Result<AlbumDetails> {
        Err(AdapterError::Unsupported(Operation::GetAlbum))
    }

    async fn get_song(&self, _song_id: &str) -> Result<Song> {
        Err(AdapterError::Unsupported(Operation::GetSong))
    }

    async fn get_genres(&self) -> Result<Vec<Genre>> {
        Err(AdapterError::Unsupported(Operation::GetGenres))
    }

    async fn get_directory(&self, _directory_id: &str) -> Result<Directory> {
        Err(AdapterError::Unsupported(Operation::GetDirectory))
    }

    async fn get_cover_art(&self, _cover_art_id: &str) -> Result<CoverArt> {
        Err(AdapterError::Unsupported(Operation::GetCoverArt))
    }
}

/// Typed result of a ground-truth fetch, handed to the caching adapter for
/// ingestion. The variant must match the operation it is ingested under.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestPayload {
    Playlists(Vec<Playlist>),
    PlaylistDetails(PlaylistDetails),
    Artists(Vec<Artist>),
    Artist(Artist),
    Albums(Vec<Album>),
    Album(AlbumDetails),
    Song(Song),
    Genres(Vec<Genre>),
    Directory(Directory),
    CoverArt(CoverArt),
}

/// The additional contract of an adapter backed by durable local storage.
///
/// Cached reads return a tagged [`CacheRead`] instead of failing on a miss;
/// an `Err` from these methods means an internal storage failure, which the
/// manager logs and treats like a miss.
#[async_trait]
pub trait CachingAdapter: Adapter {
    async fn cached_playlists(&self) -> Result<CacheRead<Vec<Playlist>>>;

    async fn cached_playlist_details(&self, playlist_id: &str)
        -> Result<CacheRead<PlaylistDetails>>;

    async fn cached_artists(&self) -> Result<CacheRead<Vec<Artist>>>;

    async fn cached_artist(&self, artist_id: &str) -> Result<CacheRead<Artist>>;

    async fn cached_albums(&self) -> Result<CacheRead<Vec<Album>>>;

    async fn cached_album(&self, album_id: &str) -> Result<CacheRead<AlbumDetails>>;

    async fn cached_song(&self, song_id: &str) -> Result<CacheRead<Song>>;

    async fn cached_genres(&self) -> Result<CacheRead<Vec<Genre>>>;

    async fn cached_directory(&self, directory_id: &str) -> Result<CacheRead<Directory>>;

    async fn cached_cover_art(&self, cover_art_id: &str) -> Result<CacheRead<CoverArt>>;

    /// Durably record the result of a ground-truth fetch.
    ///
    /// Safe to call concurrently for different keys; concurrent ingestion of
    /// the same key is last-write-wins.
    async fn ingest_new_data(
        &self,
        operation: Operation,
        params: &FetchParams,
        payload: IngestPayload,
    ) -> Result<()>;

    /// Soft-invalidate the entry for `(operation, params)` without deleting
    /// the underlying data, so it can still serve as partial data.
    async fn invalidate(&self, operation: Operation, params: &FetchParams) -> Result<()>;
}

/// Constructs ground-truth adapters from named configuration parameters.
///
/// Registered with the manager; `reset` picks the factory whose kind matches
/// the selected server and feeds it exactly the parameters it declares.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    /// Stable identifier matched against the host's server configuration.
    fn kind(&self) -> &'static str;

    /// Configuration keys this adapter needs.
    fn config_parameters(&self) -> Vec<ConfigParameter>;

    /// Whether results from this adapter may be mirrored into a cache.
    fn can_be_cached(&self) -> bool {
        true
    }

    async fn build(
        &self,
        params: &HashMap<String, String>,
        data_dir: &Path,
    ) -> Result<Arc<dyn Adapter>>;
}

/// Constructs the caching adapter for a storage root.
#[async_trait]
pub trait CachingAdapterFactory: Send + Sync {
    fn config_parameters(&self) -> Vec<ConfigParameter>;

    async fn build(
        &self,
        params: &HashMap<String, String>,
        data_dir: &Path,
    ) -> Result<Arc<dyn CachingAdapter>>;
}
