//! Caching adapter backed by SQLite plus a content-addressed blob store.
//!
//! The adapter mirrors ground-truth data into normalized tables and records
//! per-key freshness in `cache_entries`. Cached reads are tagged: a valid
//! entry yields a hit, anything else yields a miss that may still carry
//! whatever stale or partial data the mirror holds. Binary artifacts (cover
//! art) live in the blob store and are referenced by content hash.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use core_adapter::models::{
    Album, AlbumDetails, Artist, CoverArt, Directory, DirectoryChild, Genre, Playlist,
    PlaylistDetails, Song,
};
use core_adapter::{
    Adapter, AdapterError, CacheRead, CachingAdapter, CachingAdapterFactory, ConfigParameter,
    FetchParams, IngestPayload, Operation, Result,
};
use tracing::{debug, info};

pub mod blobs;
pub mod db;
pub mod store;

use blobs::BlobStore;
use store::Store;

/// Caching adapter over a local SQLite mirror.
pub struct SqliteCachingAdapter {
    store: Store,
    blobs: BlobStore,
    closed: AtomicBool,
}

impl SqliteCachingAdapter {
    /// Open (or create) the cache under `data_dir`.
    ///
    /// Layout: `data_dir/cache.db` for metadata, `data_dir/blobs/` for
    /// binary artifacts.
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| AdapterError::Io(e.to_string()))?;

        let pool = db::create_pool(db::DatabaseConfig::new(data_dir.join("cache.db"))).await?;
        let blobs = BlobStore::open(data_dir.join("blobs")).await?;
        info!(data_dir = %data_dir.display(), "cache opened");

        Ok(Self {
            store: Store::new(pool),
            blobs,
            closed: AtomicBool::new(false),
        })
    }

    async fn entry_is_valid(&self, operation: Operation, params: &FetchParams) -> Result<bool> {
        Ok(self
            .store
            .lookup_entry(operation, params)
            .await?
            .is_some_and(|e| e.valid))
    }

    /// Tag mirrored data by entry freshness. `None` data is always a bare
    /// miss; data without a valid entry is a miss with partial data.
    fn tag<T>(valid: bool, data: Option<T>) -> CacheRead<T> {
        match (valid, data) {
            (true, Some(value)) => CacheRead::Hit(value),
            (_, data) => CacheRead::Miss(data),
        }
    }
}

#[async_trait]
impl CachingAdapter for SqliteCachingAdapter {
    async fn cached_playlists(&self) -> Result<CacheRead<Vec<Playlist>>> {
        let valid = self
            .entry_is_valid(Operation::GetPlaylists, &FetchParams::none())
            .await?;
        let playlists = self.store.playlists().await?;
        let data = (!playlists.is_empty() || valid).then_some(playlists);
        Ok(Self::tag(valid, data))
    }

    async fn cached_playlist_details(
        &self,
        playlist_id: &str,
    ) -> Result<CacheRead<PlaylistDetails>> {
        let valid = self
            .entry_is_valid(Operation::GetPlaylistDetails, &FetchParams::one(playlist_id))
            .await?;
        let Some(playlist) = self.store.playlist(playlist_id).await? else {
            return Ok(CacheRead::Miss(None));
        };
        let songs = self.store.playlist_songs(playlist_id).await?;
        Ok(Self::tag(valid, Some(PlaylistDetails { playlist, songs })))
    }

    async fn cached_artists(&self) -> Result<CacheRead<Vec<Artist>>> {
        let valid = self
            .entry_is_valid(Operation::GetArtists, &FetchParams::none())
            .await?;
        let artists = self.store.artists().await?;
        let data = (!artists.is_empty() || valid).then_some(artists);
        Ok(Self::tag(valid, data))
    }

    async fn cached_artist(&self, artist_id: &str) -> Result<CacheRead<Artist>> {
        let valid = self
            .entry_is_valid(Operation::GetArtist, &FetchParams::one(artist_id))
            .await?;
        Ok(Self::tag(valid, self.store.artist(artist_id).await?))
    }

    async fn cached_albums(&self) -> Result<CacheRead<Vec<Album>>> {
        let valid = self
            .entry_is_valid(Operation::GetAlbums, &FetchParams::none())
            .await?;
        let albums = self.store.albums().await?;
        let data = (!albums.is_empty() || valid).then_some(albums);
        Ok(Self::tag(valid, data))
    }

    async fn cached_album(&self, album_id: &str) -> Result<CacheRead<AlbumDetails>> {
        let valid = self
            .entry_is_valid(Operation::GetAlbum, &FetchParams::one(album_id))
            .await?;
        let Some(album) = self.store.album(album_id).await? else {
            return Ok(CacheRead::Miss(None));
        };
        let songs = self.store.album_songs(album_id).await?;
        Ok(Self::tag(valid, Some(AlbumDetails { album, songs })))
    }

    async fn cached_song(&self, song_id: &str) -> Result<CacheRead<Song>> {
        let valid = self
            .entry_is_valid(Operation::GetSong, &FetchParams::one(song_id))
            .await?;
        Ok(Self::tag(valid, self.store.song(song_id).await?))
    }

    async fn cached_genres(&self) -> Result<CacheRead<Vec<Genre>>> {
        let valid = self
            .entry_is_valid(Operation::GetGenres, &FetchParams::none())
            .await?;
        let genres = self.store.genres().await?;
        let data = (!genres.is_empty() || valid).then_some(genres);
        Ok(Self::tag(valid, data))
    }

    async fn cached_directory(&self, directory_id: &str) -> Result<CacheRead<Directory>> {
        let valid = self
            .entry_is_valid(Operation::GetDirectory, &FetchParams::one(directory_id))
            .await?;
        Ok(Self::tag(valid, self.store.directory(directory_id).await?))
    }

    async fn cached_cover_art(&self, cover_art_id: &str) -> Result<CacheRead<CoverArt>> {
        let entry = self
            .store
            .lookup_entry(Operation::GetCoverArt, &FetchParams::one(cover_art_id))
            .await?;
        let Some(entry) = entry else {
            return Ok(CacheRead::Miss(None));
        };
        let Some(content_hash) = entry.content_hash.as_deref() else {
            // Placeholder entry from metadata ingestion, blob never fetched.
            return Ok(CacheRead::Miss(None));
        };
        let data = match self.blobs.read(content_hash).await {
            Ok(data) => data,
            Err(e) => {
                debug!(cover_art_id, error = %e, "cover art blob unreadable");
                return Ok(CacheRead::Miss(None));
            }
        };
        let art = CoverArt {
            id: cover_art_id.to_string(),
            data,
        };
        Ok(Self::tag(entry.valid, Some(art)))
    }

    async fn ingest_new_data(
        &self,
        operation: Operation,
        params: &FetchParams,
        payload: IngestPayload,
    ) -> Result<()> {
        debug!(operation = %operation, "ingesting");
        let mut tx = self.store.begin().await?;

        let mut content = None;
        match (operation, payload) {
            (Operation::GetPlaylists, IngestPayload::Playlists(playlists)) => {
                for playlist in &playlists {
                    self.store.upsert_playlist(&mut tx, playlist).await?;
                }
            }
            (Operation::GetPlaylistDetails, IngestPayload::PlaylistDetails(details)) => {
                self.store.upsert_playlist(&mut tx, &details.playlist).await?;
                for song in &details.songs {
                    self.store.upsert_song(&mut tx, song).await?;
                }
                self.store
                    .replace_playlist_songs(&mut tx, &details.playlist.id, &details.songs)
                    .await?;
            }
            (Operation::GetArtists, IngestPayload::Artists(artists)) => {
                for artist in &artists {
                    self.store.upsert_artist(&mut tx, artist).await?;
                }
            }
            (Operation::GetArtist, IngestPayload::Artist(artist)) => {
                self.store.upsert_artist(&mut tx, &artist).await?;
            }
            (Operation::GetAlbums, IngestPayload::Albums(albums)) => {
                for album in &albums {
                    self.store.upsert_album(&mut tx, album).await?;
                }
            }
            (Operation::GetAlbum, IngestPayload::Album(details)) => {
                self.store.upsert_album(&mut tx, &details.album).await?;
                for song in &details.songs {
                    self.store.upsert_song(&mut tx, song).await?;
                }
            }
            (Operation::GetSong, IngestPayload::Song(song)) => {
                self.store.upsert_song(&mut tx, &song).await?;
            }
            (Operation::GetGenres, IngestPayload::Genres(genres)) => {
                for genre in &genres {
                    self.store.upsert_genre(&mut tx, genre).await?;
                }
            }
            (Operation::GetDirectory, IngestPayload::Directory(directory)) => {
                self.store
                    .upsert_directory(
                        &mut tx,
                        &directory.id,
                        directory.name.as_deref(),
                        directory.parent_id.as_deref(),
                    )
                    .await?;
                for child in &directory.children {
                    match child {
                        DirectoryChild::Directory { id, name } => {
                            self.store
                                .upsert_directory(&mut tx, id, name.as_deref(), Some(&directory.id))
                                .await?;
                        }
                        DirectoryChild::Song(song) => {
                            let mut song = song.clone();
                            song.parent_id.get_or_insert_with(|| directory.id.clone());
                            self.store.upsert_song(&mut tx, &song).await?;
                        }
                    }
                }
            }
            (Operation::GetCoverArt, IngestPayload::CoverArt(art)) => {
                let content_hash = self.blobs.write(&art.data).await?;
                content = Some((art.id, content_hash));
            }
            (operation, _) => {
                return Err(AdapterError::PayloadMismatch { operation });
            }
        }

        let content_ref = content
            .as_ref()
            .map(|(id, hash)| (id.as_str(), hash.as_str()));
        self.store
            .mark_ingested(&mut tx, operation, params, content_ref)
            .await?;
        tx.commit().await.map_err(store::db_err)?;
        Ok(())
    }

    async fn invalidate(&self, operation: Operation, params: &FetchParams) -> Result<()> {
        debug!(operation = %operation, "invalidating cache entry");
        self.store.invalidate_entry(operation, params).await
    }
}

/// The plain fetch surface answers from the mirror alone: a miss is a
/// [`AdapterError::NotFound`]. This lets a fully primed cache stand in as a
/// ground-truth source when the real one is offline.
#[async_trait]
impl Adapter for SqliteCachingAdapter {
    fn can_service_requests(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn can(&self, _operation: Operation) -> bool {
        true
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("closing cache");
            self.store.close().await;
        }
    }

    async fn get_playlists(&self) -> Result<Vec<Playlist>> {
        require_hit(self.cached_playlists().await?, "playlists")
    }

    async fn get_playlist_details(&self, playlist_id: &str) -> Result<PlaylistDetails> {
        require_hit(self.cached_playlist_details(playlist_id).await?, playlist_id)
    }

    async fn get_artists(&self) -> Result<Vec<Artist>> {
        require_hit(self.cached_artists().await?, "artists")
    }

    async fn get_artist(&self, artist_id: &str) -> Result<Artist> {
        require_hit(self.cached_artist(artist_id).await?, artist_id)
    }

    async fn get_albums(&self) -> Result<Vec<Album>> {
        require_hit(self.cached_albums().await?, "albums")
    }

    async fn get_album(&self, album_id: &str) -> Result<AlbumDetails> {
        require_hit(self.cached_album(album_id).await?, album_id)
    }

    async fn get_song(&self, song_id: &str) -> Result<Song> {
        require_hit(self.cached_song(song_id).await?, song_id)
    }

    async fn get_genres(&self) -> Result<Vec<Genre>> {
        require_hit(self.cached_genres().await?, "genres")
    }

    async fn get_directory(&self, directory_id: &str) -> Result<Directory> {
        require_hit(self.cached_directory(directory_id).await?, directory_id)
    }

    async fn get_cover_art(&self, cover_art_id: &str) -> Result<CoverArt> {
        require_hit(self.cached_cover_art(cover_art_id).await?, cover_art_id)
    }
}

fn require_hit<T>(read: CacheRead<T>, what: &str) -> Result<T> {
    match read {
        CacheRead::Hit(value) => Ok(value),
        CacheRead::Miss(_) => Err(AdapterError::not_found(what)),
    }
}

/// Factory for the default caching adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteAdapterFactory;

#[async_trait]
impl CachingAdapterFactory for SqliteAdapterFactory {
    fn config_parameters(&self) -> Vec<ConfigParameter> {
        Vec::new()
    }

    async fn build(
        &self,
        _params: &HashMap<String, String>,
        data_dir: &Path,
    ) -> Result<Arc<dyn CachingAdapter>> {
        Ok(Arc::new(SqliteCachingAdapter::open(data_dir).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    async fn open_adapter() -> (tempfile::TempDir, SqliteCachingAdapter) {
        let dir = tempfile::tempdir().expect("tempdir");
        let adapter = SqliteCachingAdapter::open(dir.path()).await.expect("open");
        (dir, adapter)
    }

    fn song(id: &str, title: &str) -> Song {
        Song {
            id: id.to_string(),
            title: title.to_string(),
            duration_secs: Some(180),
            parent_id: None,
            album_id: None,
            artist_id: None,
            genre: None,
            track: None,
            disc_number: None,
            year: None,
            user_rating: None,
            starred: None,
            cover_art: None,
        }
    }

    fn playlist(id: &str, name: &str) -> Playlist {
        Playlist {
            id: id.to_string(),
            name: name.to_string(),
            comment: None,
            owner: Some("demo".to_string()),
            song_count: Some(2),
            duration_secs: Some(360),
            created: Utc.timestamp_opt(1_700_000_000, 0).single(),
            changed: None,
            public: Some(true),
            cover_art: Some(format!("pl-art-{id}")),
        }
    }

    #[tokio::test]
    async fn ingested_playlists_read_back_as_hit() {
        let (_dir, adapter) = open_adapter().await;

        adapter
            .ingest_new_data(
                Operation::GetPlaylists,
                &FetchParams::none(),
                IngestPayload::Playlists(vec![playlist("p1", "Morning"), playlist("p2", "Evening")]),
            )
            .await
            .expect("ingest");

        match adapter.cached_playlists().await.expect("read") {
            CacheRead::Hit(playlists) => {
                assert_eq!(playlists.len(), 2);
                // name-ordered
                assert_eq!(playlists[0].name, "Evening");
                assert_eq!(playlists[1].cover_art.as_deref(), Some("pl-art-p1"));
            }
            miss => panic!("expected hit, got {miss:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_key_is_a_bare_miss() {
        let (_dir, adapter) = open_adapter().await;

        assert_eq!(
            adapter.cached_playlists().await.expect("read"),
            CacheRead::Miss(None)
        );
        assert_eq!(
            adapter.cached_song("nope").await.expect("read"),
            CacheRead::Miss(None)
        );
    }

    #[tokio::test]
    async fn invalidation_keeps_data_as_partial() {
        let (_dir, adapter) = open_adapter().await;

        adapter
            .ingest_new_data(
                Operation::GetPlaylists,
                &FetchParams::none(),
                IngestPayload::Playlists(vec![playlist("p1", "Morning")]),
            )
            .await
            .expect("ingest");
        adapter
            .invalidate(Operation::GetPlaylists, &FetchParams::none())
            .await
            .expect("invalidate");

        match adapter.cached_playlists().await.expect("read") {
            CacheRead::Miss(Some(playlists)) => assert_eq!(playlists.len(), 1),
            other => panic!("expected miss with partial data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn playlist_details_preserve_order_and_duplicates() {
        let (_dir, adapter) = open_adapter().await;

        let songs = vec![song("s2", "Second"), song("s1", "First"), song("s2", "Second")];
        adapter
            .ingest_new_data(
                Operation::GetPlaylistDetails,
                &FetchParams::one("p1"),
                IngestPayload::PlaylistDetails(PlaylistDetails {
                    playlist: playlist("p1", "Morning"),
                    songs,
                }),
            )
            .await
            .expect("ingest");

        match adapter.cached_playlist_details("p1").await.expect("read") {
            CacheRead::Hit(details) => {
                let ids: Vec<&str> = details.songs.iter().map(|s| s.id.as_str()).collect();
                assert_eq!(ids, vec!["s2", "s1", "s2"]);
            }
            miss => panic!("expected hit, got {miss:?}"),
        }
    }

    #[tokio::test]
    async fn reingestion_replaces_playlist_songs() {
        let (_dir, adapter) = open_adapter().await;

        for songs in [
            vec![song("s1", "First"), song("s2", "Second")],
            vec![song("s2", "Second")],
        ] {
            adapter
                .ingest_new_data(
                    Operation::GetPlaylistDetails,
                    &FetchParams::one("p1"),
                    IngestPayload::PlaylistDetails(PlaylistDetails {
                        playlist: playlist("p1", "Morning"),
                        songs,
                    }),
                )
                .await
                .expect("ingest");
        }

        match adapter.cached_playlist_details("p1").await.expect("read") {
            CacheRead::Hit(details) => {
                assert_eq!(details.songs.len(), 1);
                assert_eq!(details.songs[0].id, "s2");
            }
            miss => panic!("expected hit, got {miss:?}"),
        }
    }

    #[tokio::test]
    async fn cover_art_round_trips_through_blob_store() {
        let (_dir, adapter) = open_adapter().await;

        adapter
            .ingest_new_data(
                Operation::GetCoverArt,
                &FetchParams::one("art-1"),
                IngestPayload::CoverArt(CoverArt {
                    id: "art-1".to_string(),
                    data: vec![0x89, 0x50, 0x4e, 0x47],
                }),
            )
            .await
            .expect("ingest");

        match adapter.cached_cover_art("art-1").await.expect("read") {
            CacheRead::Hit(art) => {
                assert_eq!(art.id, "art-1");
                assert_eq!(art.data, vec![0x89, 0x50, 0x4e, 0x47]);
            }
            miss => panic!("expected hit, got {miss:?}"),
        }
    }

    #[tokio::test]
    async fn linked_cover_art_is_a_miss_until_downloaded() {
        let (_dir, adapter) = open_adapter().await;

        adapter
            .ingest_new_data(
                Operation::GetPlaylists,
                &FetchParams::none(),
                IngestPayload::Playlists(vec![playlist("p1", "Morning")]),
            )
            .await
            .expect("ingest");

        // The playlist references pl-art-p1 but no blob exists yet.
        assert_eq!(
            adapter.cached_cover_art("pl-art-p1").await.expect("read"),
            CacheRead::Miss(None)
        );
    }

    #[tokio::test]
    async fn mismatched_payload_is_rejected() {
        let (_dir, adapter) = open_adapter().await;

        let result = adapter
            .ingest_new_data(
                Operation::GetGenres,
                &FetchParams::none(),
                IngestPayload::Playlists(Vec::new()),
            )
            .await;
        assert_eq!(
            result,
            Err(AdapterError::PayloadMismatch {
                operation: Operation::GetGenres
            })
        );
    }

    #[tokio::test]
    async fn album_details_order_songs_by_disc_and_track() {
        let (_dir, adapter) = open_adapter().await;

        let mut s1 = song("s1", "Closer");
        s1.album_id = Some("al1".to_string());
        s1.disc_number = Some(1);
        s1.track = Some(2);
        let mut s2 = song("s2", "Opener");
        s2.album_id = Some("al1".to_string());
        s2.disc_number = Some(1);
        s2.track = Some(1);

        adapter
            .ingest_new_data(
                Operation::GetAlbum,
                &FetchParams::one("al1"),
                IngestPayload::Album(AlbumDetails {
                    album: Album {
                        id: "al1".to_string(),
                        name: Some("Record".to_string()),
                        artist_id: None,
                        genre: None,
                        created: None,
                        duration_secs: None,
                        play_count: None,
                        song_count: Some(2),
                        starred: None,
                        year: Some(2001),
                        cover_art: None,
                    },
                    songs: vec![s1, s2],
                }),
            )
            .await
            .expect("ingest");

        match adapter.cached_album("al1").await.expect("read") {
            CacheRead::Hit(details) => {
                assert_eq!(details.songs[0].title, "Opener");
                assert_eq!(details.songs[1].title, "Closer");
            }
            miss => panic!("expected hit, got {miss:?}"),
        }
    }

    #[tokio::test]
    async fn directory_ingestion_links_children() {
        let (_dir, adapter) = open_adapter().await;

        adapter
            .ingest_new_data(
                Operation::GetDirectory,
                &FetchParams::one("root"),
                IngestPayload::Directory(Directory {
                    id: "root".to_string(),
                    name: Some("Music".to_string()),
                    parent_id: None,
                    children: vec![
                        DirectoryChild::Directory {
                            id: "d1".to_string(),
                            name: Some("Albums".to_string()),
                        },
                        DirectoryChild::Song(song("s1", "Loose Track")),
                    ],
                }),
            )
            .await
            .expect("ingest");

        match adapter.cached_directory("root").await.expect("read") {
            CacheRead::Hit(dir) => {
                assert_eq!(dir.children.len(), 2);
                assert!(matches!(
                    &dir.children[0],
                    DirectoryChild::Directory { id, .. } if id == "d1"
                ));
                assert!(matches!(
                    &dir.children[1],
                    DirectoryChild::Song(s) if s.parent_id.as_deref() == Some("root")
                ));
            }
            miss => panic!("expected hit, got {miss:?}"),
        }
    }

    #[tokio::test]
    async fn plain_fetch_surface_reports_not_found_on_miss() {
        let (_dir, adapter) = open_adapter().await;

        assert_eq!(
            adapter.get_song("nope").await,
            Err(AdapterError::not_found("nope"))
        );
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (_dir, adapter) = open_adapter().await;

        assert!(adapter.can_service_requests());
        adapter.shutdown().await;
        adapter.shutdown().await;
        assert!(!adapter.can_service_requests());
    }
}
