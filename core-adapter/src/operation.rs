//! Static table of read operations.
//!
//! Every read the manager can route is one of these variants. Capability
//! checks, cache keys, and log messages all key off this enum, so adding an
//! operation means adding a variant here plus the matching fetch methods on
//! the contracts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A read operation supported by the adapter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    GetPlaylists,
    GetPlaylistDetails,
    GetArtists,
    GetArtist,
    GetAlbums,
    GetAlbum,
    GetSong,
    GetGenres,
    GetDirectory,
    GetCoverArt,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::GetPlaylists,
        Operation::GetPlaylistDetails,
        Operation::GetArtists,
        Operation::GetArtist,
        Operation::GetAlbums,
        Operation::GetAlbum,
        Operation::GetSong,
        Operation::GetGenres,
        Operation::GetDirectory,
        Operation::GetCoverArt,
    ];

    /// Stable snake_case name, used as the durable cache key.
    pub fn name(self) -> &'static str {
        match self {
            Operation::GetPlaylists => "get_playlists",
            Operation::GetPlaylistDetails => "get_playlist_details",
            Operation::GetArtists => "get_artists",
            Operation::GetArtist => "get_artist",
            Operation::GetAlbums => "get_albums",
            Operation::GetAlbum => "get_album",
            Operation::GetSong => "get_song",
            Operation::GetGenres => "get_genres",
            Operation::GetDirectory => "get_directory",
            Operation::GetCoverArt => "get_cover_art",
        }
    }

    /// Parse a durable cache key back into an operation.
    pub fn from_name(name: &str) -> Option<Self> {
        Operation::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.name()), Some(op));
        }
        assert_eq!(Operation::from_name("get_nonsense"), None);
    }

    #[test]
    fn display_matches_cache_key() {
        assert_eq!(Operation::GetPlaylists.to_string(), "get_playlists");
        assert_eq!(Operation::GetCoverArt.to_string(), "get_cover_art");
    }
}
