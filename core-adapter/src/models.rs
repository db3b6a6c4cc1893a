//! Domain entities mirrored from the remote source.
//!
//! These are explicit value structs keyed by stable string identifiers (the
//! remote assigns the ids). Relationships are plain id references resolved
//! through the storage layer on demand, never embedded object graphs.
//!
//! Entities never carry raw filesystem paths. An image or audio reference
//! surfaces as the remote artifact id (`cover_art`); the caching adapter maps
//! that id to a cache entry and a content-hashed blob internally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub name: String,
    pub song_count: Option<i64>,
    pub album_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: Option<String>,
    pub album_count: Option<i64>,
    pub starred: Option<DateTime<Utc>>,
    pub biography: Option<String>,
    /// Remote artwork id, fetchable via `get_cover_art`.
    pub cover_art: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: Option<String>,
    pub artist_id: Option<String>,
    pub genre: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub play_count: Option<i64>,
    pub song_count: Option<i64>,
    pub starred: Option<DateTime<Utc>>,
    pub year: Option<i64>,
    pub cover_art: Option<String>,
}

/// An album together with its songs, in disc/track order as the remote
/// reported them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumDetails {
    pub album: Album,
    pub songs: Vec<Song>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub duration_secs: Option<i64>,
    /// Containing directory in the remote browse hierarchy.
    pub parent_id: Option<String>,
    pub album_id: Option<String>,
    pub artist_id: Option<String>,
    pub genre: Option<String>,
    pub track: Option<i64>,
    pub disc_number: Option<i64>,
    pub year: Option<i64>,
    pub user_rating: Option<i64>,
    pub starred: Option<DateTime<Utc>>,
    pub cover_art: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub comment: Option<String>,
    pub owner: Option<String>,
    pub song_count: Option<i64>,
    pub duration_secs: Option<i64>,
    pub created: Option<DateTime<Utc>>,
    pub changed: Option<DateTime<Utc>>,
    pub public: Option<bool>,
    pub cover_art: Option<String>,
}

/// A playlist together with its song list.
///
/// The song list is an ordered sequence: position matters and the same song
/// may appear more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistDetails {
    pub playlist: Playlist,
    pub songs: Vec<Song>,
}

/// One level of the remote browse hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub id: String,
    pub name: Option<String>,
    pub parent_id: Option<String>,
    pub children: Vec<DirectoryChild>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectoryChild {
    Directory { id: String, name: Option<String> },
    Song(Song),
}

/// A binary artwork artifact fetched from the remote or the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverArt {
    /// Remote artwork id this blob belongs to.
    pub id: String,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_details_preserves_order_and_duplicates() {
        let song = |id: &str| Song {
            id: id.to_string(),
            title: format!("song {id}"),
            duration_secs: None,
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
        };

        let details = PlaylistDetails {
            playlist: Playlist {
                id: "p1".into(),
                name: "mix".into(),
                comment: None,
                owner: None,
                song_count: Some(3),
                duration_secs: None,
                created: None,
                changed: None,
                public: None,
                cover_art: None,
            },
            songs: vec![song("s2"), song("s1"), song("s2")],
        };

        let encoded = serde_json::to_string(&details).expect("serializes");
        let decoded: PlaylistDetails = serde_json::from_str(&encoded).expect("deserializes");
        let ids: Vec<&str> = decoded.songs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s1", "s2"]);
    }
}
