//! Queries and row mapping for the metadata mirror.
//!
//! All writes go through a transaction handed out by [`Store::begin`]; the
//! ingestion routine is the only writer. Timestamps are stored as epoch
//! seconds and surfaced as `chrono::DateTime<Utc>`.

use chrono::{DateTime, Utc};
use core_adapter::models::{Album, Artist, Directory, DirectoryChild, Genre, Playlist, Song};
use core_adapter::{AdapterError, CacheEntry, FetchParams, Operation, Result};
use sqlx::sqlite::SqliteConnection;
use sqlx::{FromRow, Pool, Sqlite, Transaction};

pub(crate) fn db_err(e: sqlx::Error) -> AdapterError {
    AdapterError::Database(e.to_string())
}

fn to_epoch(time: Option<DateTime<Utc>>) -> Option<i64> {
    time.map(|t| t.timestamp())
}

fn from_epoch(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

const SONG_SELECT: &str = "SELECT s.id, s.title, s.duration_secs, s.parent_id, s.album_id, \
     s.artist_id, s.genre, s.track, s.disc_number, s.year, s.user_rating, s.starred, \
     ce.content_id AS cover_art \
     FROM songs s LEFT JOIN cache_entries ce ON s.cover_art_cache_id = ce.id";

const PLAYLIST_SELECT: &str = "SELECT p.id, p.name, p.comment, p.owner, p.song_count, \
     p.duration_secs, p.created, p.changed, p.public, ce.content_id AS cover_art \
     FROM playlists p LEFT JOIN cache_entries ce ON p.cover_art_cache_id = ce.id";

const ARTIST_SELECT: &str = "SELECT a.id, a.name, a.album_count, a.starred, a.biography, \
     ce.content_id AS cover_art \
     FROM artists a LEFT JOIN cache_entries ce ON a.cover_art_cache_id = ce.id";

const ALBUM_SELECT: &str = "SELECT a.id, a.name, a.artist_id, a.genre, a.created, \
     a.duration_secs, a.play_count, a.song_count, a.starred, a.year, \
     ce.content_id AS cover_art \
     FROM albums a LEFT JOIN cache_entries ce ON a.cover_art_cache_id = ce.id";

// =============================================================================
// Row types
// =============================================================================

#[derive(FromRow)]
struct EntryRow {
    #[allow(dead_code)]
    id: i64,
    cache_key: String,
    params_hash: String,
    valid: bool,
    last_ingestion_time: i64,
    content_id: Option<String>,
    content_hash: Option<String>,
    cache_permanently: Option<bool>,
}

impl EntryRow {
    fn into_entry(self) -> Result<CacheEntry> {
        let cache_key = Operation::from_name(&self.cache_key).ok_or_else(|| {
            AdapterError::Database(format!("unknown cache key: {}", self.cache_key))
        })?;
        let last_ingestion_time = DateTime::from_timestamp(self.last_ingestion_time, 0)
            .ok_or_else(|| AdapterError::Database("invalid ingestion timestamp".into()))?;
        Ok(CacheEntry {
            cache_key,
            params_hash: self.params_hash,
            valid: self.valid,
            last_ingestion_time,
            content_id: self.content_id,
            content_hash: self.content_hash,
            cache_permanently: self.cache_permanently,
        })
    }
}

#[derive(FromRow)]
struct PlaylistRow {
    id: String,
    name: String,
    comment: Option<String>,
    owner: Option<String>,
    song_count: Option<i64>,
    duration_secs: Option<i64>,
    created: Option<i64>,
    changed: Option<i64>,
    public: Option<bool>,
    cover_art: Option<String>,
}

impl From<PlaylistRow> for Playlist {
    fn from(row: PlaylistRow) -> Self {
        Playlist {
            id: row.id,
            name: row.name,
            comment: row.comment,
            owner: row.owner,
            song_count: row.song_count,
            duration_secs: row.duration_secs,
            created: from_epoch(row.created),
            changed: from_epoch(row.changed),
            public: row.public,
            cover_art: row.cover_art,
        }
    }
}

#[derive(FromRow)]
struct SongRow {
    id: String,
    title: String,
    duration_secs: Option<i64>,
    parent_id: Option<String>,
    album_id: Option<String>,
    artist_id: Option<String>,
    genre: Option<String>,
    track: Option<i64>,
    disc_number: Option<i64>,
    year: Option<i64>,
    user_rating: Option<i64>,
    starred: Option<i64>,
    cover_art: Option<String>,
}

impl From<SongRow> for Song {
    fn from(row: SongRow) -> Self {
        Song {
            id: row.id,
            title: row.title,
            duration_secs: row.duration_secs,
            parent_id: row.parent_id,
            album_id: row.album_id,
            artist_id: row.artist_id,
            genre: row.genre,
            track: row.track,
            disc_number: row.disc_number,
            year: row.year,
            user_rating: row.user_rating,
            starred: from_epoch(row.starred),
            cover_art: row.cover_art,
        }
    }
}

#[derive(FromRow)]
struct ArtistRow {
    id: String,
    name: Option<String>,
    album_count: Option<i64>,
    starred: Option<i64>,
    biography: Option<String>,
    cover_art: Option<String>,
}

impl From<ArtistRow> for Artist {
    fn from(row: ArtistRow) -> Self {
        Artist {
            id: row.id,
            name: row.name,
            album_count: row.album_count,
            starred: from_epoch(row.starred),
            biography: row.biography,
            cover_art: row.cover_art,
        }
    }
}

#[derive(FromRow)]
struct AlbumRow {
    id: String,
    name: Option<String>,
    artist_id: Option<String>,
    genre: Option<String>,
    created: Option<i64>,
    duration_secs: Option<i64>,
    play_count: Option<i64>,
    song_count: Option<i64>,
    starred: Option<i64>,
    year: Option<i64>,
    cover_art: Option<String>,
}

impl From<AlbumRow> for Album {
    fn from(row: AlbumRow) -> Self {
        Album {
            id: row.id,
            name: row.name,
            artist_id: row.artist_id,
            genre: row.genre,
            created: from_epoch(row.created),
            duration_secs: row.duration_secs,
            play_count: row.play_count,
            song_count: row.song_count,
            starred: from_epoch(row.starred),
            year: row.year,
            cover_art: row.cover_art,
        }
    }
}

#[derive(FromRow)]
struct GenreRow {
    name: String,
    song_count: Option<i64>,
    album_count: Option<i64>,
}

impl From<GenreRow> for Genre {
    fn from(row: GenreRow) -> Self {
        Genre {
            name: row.name,
            song_count: row.song_count,
            album_count: row.album_count,
        }
    }
}

#[derive(FromRow)]
struct DirectoryRow {
    id: String,
    name: Option<String>,
    parent_id: Option<String>,
}

// =============================================================================
// Store
// =============================================================================

/// Query layer over the cache database.
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>> {
        self.pool.begin().await.map_err(db_err)
    }

    // =========================================================================
    // Cache entries
    // =========================================================================

    pub async fn lookup_entry(
        &self,
        operation: Operation,
        params: &FetchParams,
    ) -> Result<Option<CacheEntry>> {
        let row: Option<EntryRow> =
            sqlx::query_as("SELECT * FROM cache_entries WHERE cache_key = ? AND params_hash = ?")
                .bind(operation.name())
                .bind(params.fingerprint())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(EntryRow::into_entry).transpose()
    }

    /// Upsert the entry for `(operation, params)` as valid with a fresh
    /// ingestion time. `content` carries the blob reference for binary
    /// artifacts.
    pub async fn mark_ingested(
        &self,
        tx: &mut SqliteConnection,
        operation: Operation,
        params: &FetchParams,
        content: Option<(&str, &str)>,
    ) -> Result<()> {
        let (content_id, content_hash) = match content {
            Some((id, hash)) => (Some(id), Some(hash)),
            None => (None, None),
        };
        sqlx::query(
            r#"
            INSERT INTO cache_entries (cache_key, params_hash, valid, last_ingestion_time, content_id, content_hash)
            VALUES (?, ?, 1, ?, ?, ?)
            ON CONFLICT (cache_key, params_hash) DO UPDATE SET
                valid = 1,
                last_ingestion_time = excluded.last_ingestion_time,
                content_id = COALESCE(excluded.content_id, cache_entries.content_id),
                content_hash = COALESCE(excluded.content_hash, cache_entries.content_hash)
            "#,
        )
        .bind(operation.name())
        .bind(params.fingerprint())
        .bind(now_epoch())
        .bind(content_id)
        .bind(content_hash)
        .execute(tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Flip the entry invalid without touching the mirrored data.
    pub async fn invalidate_entry(
        &self,
        operation: Operation,
        params: &FetchParams,
    ) -> Result<()> {
        sqlx::query("UPDATE cache_entries SET valid = 0 WHERE cache_key = ? AND params_hash = ?")
            .bind(operation.name())
            .bind(params.fingerprint())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Get or create the cache entry a cover-art reference points at.
    ///
    /// Created invalid: the entry records the remote artifact id but no blob
    /// has been downloaded for it yet.
    pub async fn link_cover_art(
        &self,
        tx: &mut SqliteConnection,
        cover_art: Option<&str>,
    ) -> Result<Option<i64>> {
        let Some(art_id) = cover_art else {
            return Ok(None);
        };
        let params_hash = FetchParams::one(art_id).fingerprint();
        sqlx::query(
            r#"
            INSERT INTO cache_entries (cache_key, params_hash, valid, last_ingestion_time, content_id)
            VALUES (?, ?, 0, ?, ?)
            ON CONFLICT (cache_key, params_hash) DO NOTHING
            "#,
        )
        .bind(Operation::GetCoverArt.name())
        .bind(&params_hash)
        .bind(now_epoch())
        .bind(art_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let (id,): (i64,) =
            sqlx::query_as("SELECT id FROM cache_entries WHERE cache_key = ? AND params_hash = ?")
                .bind(Operation::GetCoverArt.name())
                .bind(&params_hash)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
        Ok(Some(id))
    }

    // =========================================================================
    // Writes (ingestion only)
    // =========================================================================

    pub async fn upsert_playlist(
        &self,
        tx: &mut SqliteConnection,
        playlist: &Playlist,
    ) -> Result<()> {
        let cover_art_cache_id = self
            .link_cover_art(&mut *tx, playlist.cover_art.as_deref())
            .await?;
        sqlx::query(
            r#"
            INSERT INTO playlists (id, name, comment, owner, song_count, duration_secs,
                                   created, changed, public, cover_art_cache_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                comment = excluded.comment,
                owner = excluded.owner,
                song_count = excluded.song_count,
                duration_secs = excluded.duration_secs,
                created = excluded.created,
                changed = excluded.changed,
                public = excluded.public,
                cover_art_cache_id = excluded.cover_art_cache_id
            "#,
        )
        .bind(&playlist.id)
        .bind(&playlist.name)
        .bind(&playlist.comment)
        .bind(&playlist.owner)
        .bind(playlist.song_count)
        .bind(playlist.duration_secs)
        .bind(to_epoch(playlist.created))
        .bind(to_epoch(playlist.changed))
        .bind(playlist.public)
        .bind(cover_art_cache_id)
        .execute(tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Replace the ordered song list of a playlist wholesale.
    pub async fn replace_playlist_songs(
        &self,
        tx: &mut SqliteConnection,
        playlist_id: &str,
        songs: &[Song],
    ) -> Result<()> {
        sqlx::query("DELETE FROM playlist_songs WHERE playlist_id = ?")
            .bind(playlist_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        for (position, song) in songs.iter().enumerate() {
            sqlx::query(
                "INSERT INTO playlist_songs (playlist_id, position, song_id) VALUES (?, ?, ?)",
            )
            .bind(playlist_id)
            .bind(position as i64)
            .bind(&song.id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }

    pub async fn upsert_song(&self, tx: &mut SqliteConnection, song: &Song) -> Result<()> {
        let cover_art_cache_id = self
            .link_cover_art(&mut *tx, song.cover_art.as_deref())
            .await?;
        sqlx::query(
            r#"
            INSERT INTO songs (id, title, duration_secs, parent_id, album_id, artist_id, genre,
                               track, disc_number, year, user_rating, starred, cover_art_cache_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                duration_secs = excluded.duration_secs,
                parent_id = COALESCE(excluded.parent_id, songs.parent_id),
                album_id = excluded.album_id,
                artist_id = excluded.artist_id,
                genre = excluded.genre,
                track = excluded.track,
                disc_number = excluded.disc_number,
                year = excluded.year,
                user_rating = excluded.user_rating,
                starred = excluded.starred,
                cover_art_cache_id = excluded.cover_art_cache_id
            "#,
        )
        .bind(&song.id)
        .bind(&song.title)
        .bind(song.duration_secs)
        .bind(&song.parent_id)
        .bind(&song.album_id)
        .bind(&song.artist_id)
        .bind(&song.genre)
        .bind(song.track)
        .bind(song.disc_number)
        .bind(song.year)
        .bind(song.user_rating)
        .bind(to_epoch(song.starred))
        .bind(cover_art_cache_id)
        .execute(tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn upsert_artist(&self, tx: &mut SqliteConnection, artist: &Artist) -> Result<()> {
        let cover_art_cache_id = self
            .link_cover_art(&mut *tx, artist.cover_art.as_deref())
            .await?;
        sqlx::query(
            r#"
            INSERT INTO artists (id, name, album_count, starred, biography, cover_art_cache_id)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                album_count = excluded.album_count,
                starred = excluded.starred,
                biography = COALESCE(excluded.biography, artists.biography),
                cover_art_cache_id = excluded.cover_art_cache_id
            "#,
        )
        .bind(&artist.id)
        .bind(&artist.name)
        .bind(artist.album_count)
        .bind(to_epoch(artist.starred))
        .bind(&artist.biography)
        .bind(cover_art_cache_id)
        .execute(tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn upsert_album(&self, tx: &mut SqliteConnection, album: &Album) -> Result<()> {
        let cover_art_cache_id = self
            .link_cover_art(&mut *tx, album.cover_art.as_deref())
            .await?;
        sqlx::query(
            r#"
            INSERT INTO albums (id, name, artist_id, genre, created, duration_secs, play_count,
                                song_count, starred, year, cover_art_cache_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                artist_id = excluded.artist_id,
                genre = excluded.genre,
                created = excluded.created,
                duration_secs = excluded.duration_secs,
                play_count = excluded.play_count,
                song_count = excluded.song_count,
                starred = excluded.starred,
                year = excluded.year,
                cover_art_cache_id = excluded.cover_art_cache_id
            "#,
        )
        .bind(&album.id)
        .bind(&album.name)
        .bind(&album.artist_id)
        .bind(&album.genre)
        .bind(to_epoch(album.created))
        .bind(album.duration_secs)
        .bind(album.play_count)
        .bind(album.song_count)
        .bind(to_epoch(album.starred))
        .bind(album.year)
        .bind(cover_art_cache_id)
        .execute(tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn upsert_genre(&self, tx: &mut SqliteConnection, genre: &Genre) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO genres (name, song_count, album_count)
            VALUES (?, ?, ?)
            ON CONFLICT (name) DO UPDATE SET
                song_count = excluded.song_count,
                album_count = excluded.album_count
            "#,
        )
        .bind(&genre.name)
        .bind(genre.song_count)
        .bind(genre.album_count)
        .execute(tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn upsert_directory(
        &self,
        tx: &mut SqliteConnection,
        id: &str,
        name: Option<&str>,
        parent_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO directories (id, name, parent_id)
            VALUES (?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = COALESCE(excluded.name, directories.name),
                parent_id = COALESCE(excluded.parent_id, directories.parent_id)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(parent_id)
        .execute(tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn playlists(&self) -> Result<Vec<Playlist>> {
        let rows: Vec<PlaylistRow> = sqlx::query_as(&format!("{PLAYLIST_SELECT} ORDER BY p.name"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(Playlist::from).collect())
    }

    pub async fn playlist(&self, id: &str) -> Result<Option<Playlist>> {
        let row: Option<PlaylistRow> = sqlx::query_as(&format!("{PLAYLIST_SELECT} WHERE p.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Playlist::from))
    }

    pub async fn playlist_songs(&self, playlist_id: &str) -> Result<Vec<Song>> {
        let rows: Vec<SongRow> = sqlx::query_as(&format!(
            "{SONG_SELECT} JOIN playlist_songs ps ON ps.song_id = s.id \
             WHERE ps.playlist_id = ? ORDER BY ps.position"
        ))
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Song::from).collect())
    }

    pub async fn artists(&self) -> Result<Vec<Artist>> {
        let rows: Vec<ArtistRow> = sqlx::query_as(&format!("{ARTIST_SELECT} ORDER BY a.name"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(Artist::from).collect())
    }

    pub async fn artist(&self, id: &str) -> Result<Option<Artist>> {
        let row: Option<ArtistRow> = sqlx::query_as(&format!("{ARTIST_SELECT} WHERE a.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Artist::from))
    }

    pub async fn albums(&self) -> Result<Vec<Album>> {
        let rows: Vec<AlbumRow> = sqlx::query_as(&format!("{ALBUM_SELECT} ORDER BY a.name"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(Album::from).collect())
    }

    pub async fn album(&self, id: &str) -> Result<Option<Album>> {
        let row: Option<AlbumRow> = sqlx::query_as(&format!("{ALBUM_SELECT} WHERE a.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Album::from))
    }

    pub async fn album_songs(&self, album_id: &str) -> Result<Vec<Song>> {
        let rows: Vec<SongRow> = sqlx::query_as(&format!(
            "{SONG_SELECT} WHERE s.album_id = ? ORDER BY s.disc_number, s.track, s.title"
        ))
        .bind(album_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Song::from).collect())
    }

    pub async fn song(&self, id: &str) -> Result<Option<Song>> {
        let row: Option<SongRow> = sqlx::query_as(&format!("{SONG_SELECT} WHERE s.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Song::from))
    }

    pub async fn genres(&self) -> Result<Vec<Genre>> {
        let rows: Vec<GenreRow> = sqlx::query_as("SELECT * FROM genres ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(Genre::from).collect())
    }

    /// Load a directory with its ordered children (sub-directories first,
    /// then songs).
    pub async fn directory(&self, id: &str) -> Result<Option<Directory>> {
        let row: Option<DirectoryRow> = sqlx::query_as("SELECT * FROM directories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let child_dirs: Vec<DirectoryRow> =
            sqlx::query_as("SELECT * FROM directories WHERE parent_id = ? ORDER BY name")
                .bind(id)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        let child_songs: Vec<SongRow> = sqlx::query_as(&format!(
            "{SONG_SELECT} WHERE s.parent_id = ? ORDER BY s.title"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut children: Vec<DirectoryChild> = child_dirs
            .into_iter()
            .map(|d| DirectoryChild::Directory {
                id: d.id,
                name: d.name,
            })
            .collect();
        children.extend(
            child_songs
                .into_iter()
                .map(|s| DirectoryChild::Song(Song::from(s))),
        );

        Ok(Some(Directory {
            id: row.id,
            name: row.name,
            parent_id: row.parent_id,
            children,
        }))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
